use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use quill_db::Database;
use quill_db::models::MemberRow;
use quill_types::api::{
    AuthResponse, LoginRequest, MemberProfile, RegisterRequest, TokenResponse,
};

use crate::error::{ApiError, FieldErrors};
use crate::middleware::CurrentMember;
use crate::token;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = FieldErrors::default();

    let name = req.name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        errors.add("name", "name is required");
    } else if name.len() > 255 {
        errors.add("name", "name must not exceed 255 characters");
    }

    let email = req.email.as_deref().map(str::trim).unwrap_or("");
    if email.is_empty() {
        errors.add("email", "email is required");
    } else if !email.contains('@') {
        errors.add("email", "email must be a valid address");
    }

    let password = req.password.as_deref().unwrap_or("");
    if password.len() < 8 {
        errors.add("password", "password must be at least 8 characters");
    }

    errors.into_result()?;

    if state
        .db
        .get_member_by_email(email)
        .map_err(ApiError::from)?
        .is_some()
    {
        return Err(ApiError::EmailExists);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let member = match state.db.create_member(name, email, &password_hash) {
        Ok(member) => member,
        // UNIQUE backstop for two registrations racing on the same email.
        Err(e) if quill_db::is_unique_violation(&e) => return Err(ApiError::EmailExists),
        Err(e) => return Err(e.into()),
    };

    let token = token::issue_token(&state.db, member.id)?;
    info!("Member {} registered", member.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            member: member_profile(member),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = FieldErrors::default();
    let email = req.email.as_deref().map(str::trim).unwrap_or("");
    if email.is_empty() {
        errors.add("email", "email is required");
    }
    let password = req.password.as_deref().unwrap_or("");
    if password.is_empty() {
        errors.add("password", "password is required");
    }
    errors.into_result()?;

    // Unknown email and wrong password fail identically.
    let member = state
        .db
        .get_member_by_email(email)
        .map_err(ApiError::from)?
        .ok_or(ApiError::InvalidCredentials)?;

    let parsed_hash = PasswordHash::new(&member.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash is corrupt: {}", e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let token = token::issue_token(&state.db, member.id)?;

    Ok(Json(AuthResponse {
        token,
        member: member_profile(member),
    }))
}

/// Rotate the caller's token: the presented one is already resolved by the
/// auth middleware, issuing replaces it.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
) -> Result<impl IntoResponse, ApiError> {
    let token = token::issue_token(&state.db, member.id)?;
    Ok(Json(TokenResponse { token }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .delete_tokens_for_member(member.id)
        .map_err(ApiError::from)?;
    info!("Member {} logged out", member.id);

    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

/// Public member fields only — the password hash never leaves the store.
fn member_profile(member: MemberRow) -> MemberProfile {
    MemberProfile {
        id: member.id,
        name: member.name,
        email: member.email,
        phone: member.phone,
        birthday: member.birthday,
        note: member.note,
        is_active: member.is_active,
        created_at: crate::parse_timestamp(&member.created_at),
        updated_at: crate::parse_timestamp(&member.updated_at),
    }
}
