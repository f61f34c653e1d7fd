use anyhow::Result;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use quill_db::Database;
use quill_db::models::MemberRow;

use crate::error::ApiError;

const SECRET_LEN: usize = 40;

/// Split a bearer string into its `id|secret` halves. Anything other than
/// exactly two parts is reported as malformed, distinct from tokens that
/// parse but fail resolution.
pub fn parse_token(raw: &str) -> Result<(&str, &str), ApiError> {
    let mut parts = raw.split('|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(secret), None) => Ok((id, secret)),
        _ => Err(ApiError::TokenMalformed),
    }
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Mint a fresh token for the member, revoking every prior one in the same
/// unit — at most one token is live per member. Returns the opaque
/// `id|secret` string; only the secret's hash is stored.
pub fn issue_token(db: &Database, member_id: i64) -> Result<String> {
    let secret: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    let id = db.replace_tokens(member_id, &hash_secret(&secret))?;
    Ok(format!("{id}|{secret}"))
}

/// Resolve a bearer string to its owning member. Unknown ids, non-numeric
/// ids, stale secrets and revoked tokens are all the same invalid outcome
/// to the caller. Tokens never expire; only logout or re-issue kills them.
pub fn resolve_token(db: &Database, raw: &str) -> Result<MemberRow, ApiError> {
    let (id, secret) = parse_token(raw)?;
    let id: i64 = id.parse().map_err(|_| ApiError::TokenInvalid)?;

    let row = db
        .get_token(id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::TokenInvalid)?;

    if row.token != hash_secret(secret) {
        return Err(ApiError::TokenInvalid);
    }

    db.get_member_by_id(row.member_id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::TokenInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_db::Database;

    fn db_with_member() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let member = db.create_member("Alice", "alice@example.com", "hash").unwrap();
        (db, member.id)
    }

    #[test]
    fn issued_token_resolves_to_its_member() {
        let (db, member_id) = db_with_member();
        let token = issue_token(&db, member_id).unwrap();

        let resolved = resolve_token(&db, &token).unwrap();
        assert_eq!(resolved.id, member_id);
    }

    #[test]
    fn reissue_invalidates_the_prior_token() {
        let (db, member_id) = db_with_member();
        let first = issue_token(&db, member_id).unwrap();
        let second = issue_token(&db, member_id).unwrap();

        assert!(matches!(
            resolve_token(&db, &first),
            Err(ApiError::TokenInvalid)
        ));
        assert_eq!(resolve_token(&db, &second).unwrap().id, member_id);
    }

    #[test]
    fn revocation_invalidates_outstanding_tokens() {
        let (db, member_id) = db_with_member();
        let token = issue_token(&db, member_id).unwrap();

        db.delete_tokens_for_member(member_id).unwrap();
        assert!(matches!(
            resolve_token(&db, &token),
            Err(ApiError::TokenInvalid)
        ));
    }

    #[test]
    fn malformed_strings_are_distinct_from_invalid_ones() {
        let (db, _) = db_with_member();

        for raw in ["", "nopipe", "a|b|c", "||"] {
            assert!(
                matches!(resolve_token(&db, raw), Err(ApiError::TokenMalformed)),
                "expected malformed for {raw:?}"
            );
        }

        // Well-formed but unresolvable: unknown id, non-numeric id.
        for raw in ["999999|wrongsecret", "abc|def", "|"] {
            assert!(
                matches!(resolve_token(&db, raw), Err(ApiError::TokenInvalid)),
                "expected invalid for {raw:?}"
            );
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (db, member_id) = db_with_member();
        let token = issue_token(&db, member_id).unwrap();
        let id = token.split('|').next().unwrap();

        let forged = format!("{id}|AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        assert!(matches!(
            resolve_token(&db, &forged),
            Err(ApiError::TokenInvalid)
        ));
    }
}
