use crate::Database;
use crate::models::{FolderRow, MemberRow, NoteRow, TokenRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

impl Database {
    // -- Members --

    pub fn create_member(&self, name: &str, email: &str, password_hash: &str) -> Result<MemberRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO members (name, email, password) VALUES (?1, ?2, ?3)",
                (name, email, password_hash),
            )?;
            let id = conn.last_insert_rowid();
            query_member_by_id(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Member {} vanished after insert", id))
        })
    }

    pub fn get_member_by_email(&self, email: &str) -> Result<Option<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MEMBER_COLS} FROM members WHERE email = ?1"))?;
            let row = stmt.query_row([email], member_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_member_by_id(&self, id: i64) -> Result<Option<MemberRow>> {
        self.with_conn(|conn| query_member_by_id(conn, id))
    }

    // -- Access tokens --

    /// Delete every token the member holds and insert a single fresh one.
    /// Runs as one unit under the connection lock so a caller never observes
    /// two live tokens. Returns the new token id.
    pub fn replace_tokens(&self, member_id: i64, secret_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM access_tokens WHERE member_id = ?1", [member_id])?;
            conn.execute(
                "INSERT INTO access_tokens (member_id, token) VALUES (?1, ?2)",
                (member_id, secret_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_token(&self, id: i64) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, member_id, token, created_at FROM access_tokens WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(TokenRow {
                        id: row.get(0)?,
                        member_id: row.get(1)?,
                        token: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_tokens_for_member(&self, member_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM access_tokens WHERE member_id = ?1", [member_id])?;
            Ok(n)
        })
    }

    // -- Folders --

    pub fn list_folders(&self, member_id: i64) -> Result<Vec<FolderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FOLDER_COLS} FROM note_folders
                 WHERE member_id = ?1
                 ORDER BY sort_order, id",
            ))?;
            let rows = stmt
                .query_map([member_id], folder_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_folder(&self, member_id: i64, id: i64) -> Result<Option<FolderRow>> {
        self.with_conn(|conn| query_folder(conn, member_id, id, false))
    }

    /// Folder lookup for note assignment and note listing, which only ever
    /// see active folders.
    pub fn get_active_folder(&self, member_id: i64, id: i64) -> Result<Option<FolderRow>> {
        self.with_conn(|conn| query_folder(conn, member_id, id, true))
    }

    /// Insert a folder at the end of its sibling group: sort_order is
    /// max(existing siblings, 0) + 1, scoped to (member, parent).
    pub fn create_folder(
        &self,
        member_id: i64,
        parent_id: Option<i64>,
        name: &str,
        description: Option<&str>,
    ) -> Result<FolderRow> {
        self.with_conn_mut(|conn| {
            let sort_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM note_folders
                 WHERE member_id = ?1 AND parent_id IS ?2",
                (member_id, parent_id),
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO note_folders (member_id, parent_id, name, description, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (member_id, parent_id, name, description, sort_order),
            )?;
            let id = conn.last_insert_rowid();
            query_folder(conn, member_id, id, false)?
                .ok_or_else(|| anyhow::anyhow!("Folder {} vanished after insert", id))
        })
    }

    pub fn update_folder(&self, id: i64, name: &str, parent_id: Option<i64>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE note_folders
                 SET name = ?1, parent_id = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                (name, parent_id, id),
            )?;
            Ok(())
        })
    }

    pub fn delete_folder(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM note_folders WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn count_child_folders(&self, id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM note_folders WHERE parent_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    pub fn count_folder_notes(&self, id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM notes WHERE folder_id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    // -- Notes --

    pub fn list_notes_in_folder(&self, member_id: i64, folder_id: i64) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLS} FROM notes
                 WHERE member_id = ?1 AND folder_id = ?2 AND is_active = 1
                 ORDER BY updated_at DESC, id DESC",
            ))?;
            let rows = stmt
                .query_map((member_id, folder_id), note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_unfiled_notes(&self, member_id: i64) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLS} FROM notes
                 WHERE member_id = ?1 AND folder_id IS NULL AND is_active = 1
                 ORDER BY updated_at DESC, id DESC",
            ))?;
            let rows = stmt
                .query_map([member_id], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_note(&self, member_id: i64, id: i64) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLS} FROM notes WHERE member_id = ?1 AND id = ?2",
            ))?;
            let row = stmt.query_row((member_id, id), note_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn create_note(
        &self,
        member_id: i64,
        folder_id: Option<i64>,
        title: &str,
        content: &str,
    ) -> Result<NoteRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notes (member_id, folder_id, title, content)
                 VALUES (?1, ?2, ?3, ?4)",
                (member_id, folder_id, title, content),
            )?;
            let id = conn.last_insert_rowid();
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLS} FROM notes WHERE id = ?1",
            ))?;
            let row = stmt.query_row([id], note_from_row)?;
            Ok(row)
        })
    }

    pub fn update_note(
        &self,
        id: i64,
        title: &str,
        content: &str,
        folder_id: Option<i64>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notes
                 SET title = ?1, content = ?2, folder_id = ?3, updated_at = datetime('now')
                 WHERE id = ?4",
                (title, content, folder_id, id),
            )?;
            Ok(())
        })
    }

    pub fn delete_note(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

const MEMBER_COLS: &str =
    "id, name, email, password, phone, birthday, note, is_active, created_at, updated_at";
const FOLDER_COLS: &str =
    "id, member_id, parent_id, name, description, sort_order, is_active, created_at, updated_at";
const NOTE_COLS: &str =
    "id, member_id, folder_id, title, content, is_active, created_at, updated_at";

fn query_member_by_id(conn: &Connection, id: i64) -> Result<Option<MemberRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {MEMBER_COLS} FROM members WHERE id = ?1"))?;
    let row = stmt.query_row([id], member_from_row).optional()?;
    Ok(row)
}

fn query_folder(
    conn: &Connection,
    member_id: i64,
    id: i64,
    active_only: bool,
) -> Result<Option<FolderRow>> {
    let extra = if active_only { " AND is_active = 1" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLDER_COLS} FROM note_folders WHERE member_id = ?1 AND id = ?2{extra}",
    ))?;
    let row = stmt.query_row((member_id, id), folder_from_row).optional()?;
    Ok(row)
}

fn member_from_row(row: &Row) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        phone: row.get(4)?,
        birthday: row.get(5)?,
        note: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn folder_from_row(row: &Row) -> rusqlite::Result<FolderRow> {
    Ok(FolderRow {
        id: row.get(0)?,
        member_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        sort_order: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn note_from_row(row: &Row) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        member_id: row.get(1)?,
        folder_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, is_unique_violation};

    fn db_with_member() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let member = db.create_member("Alice", "alice@example.com", "hash").unwrap();
        (db, member.id)
    }

    #[test]
    fn duplicate_email_rejected_case_insensitively() {
        let (db, _) = db_with_member();
        let err = db
            .create_member("Imposter", "ALICE@Example.com", "hash")
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn email_lookup_ignores_case() {
        let (db, id) = db_with_member();
        let found = db.get_member_by_email("Alice@EXAMPLE.com").unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[test]
    fn root_folders_get_sequential_sort_orders() {
        let (db, member) = db_with_member();
        let a = db.create_folder(member, None, "A", None).unwrap();
        let b = db.create_folder(member, None, "B", None).unwrap();
        let c = db.create_folder(member, None, "C", None).unwrap();
        assert_eq!((a.sort_order, b.sort_order, c.sort_order), (1, 2, 3));

        // sibling numbering restarts under a parent
        let child = db.create_folder(member, Some(a.id), "A1", None).unwrap();
        assert_eq!(child.sort_order, 1);
    }

    #[test]
    fn replace_tokens_keeps_a_single_row() {
        let (db, member) = db_with_member();
        let first = db.replace_tokens(member, "hash-one").unwrap();
        let second = db.replace_tokens(member, "hash-two").unwrap();

        assert!(db.get_token(first).unwrap().is_none());
        let row = db.get_token(second).unwrap().unwrap();
        assert_eq!(row.member_id, member);
        assert_eq!(row.token, "hash-two");
    }

    #[test]
    fn folder_counts_track_children_and_notes() {
        let (db, member) = db_with_member();
        let root = db.create_folder(member, None, "Work", None).unwrap();
        let sub = db.create_folder(member, Some(root.id), "Projects", None).unwrap();
        db.create_note(member, Some(sub.id), "Plan", "body").unwrap();

        assert_eq!(db.count_child_folders(root.id).unwrap(), 1);
        assert_eq!(db.count_folder_notes(root.id).unwrap(), 0);
        assert_eq!(db.count_child_folders(sub.id).unwrap(), 0);
        assert_eq!(db.count_folder_notes(sub.id).unwrap(), 1);
    }

    #[test]
    fn note_roundtrip_and_unfiled_listing() {
        let (db, member) = db_with_member();
        let folder = db.create_folder(member, None, "Work", None).unwrap();
        let filed = db.create_note(member, Some(folder.id), "Filed", "a").unwrap();
        let loose = db.create_note(member, None, "Loose", "b").unwrap();

        let in_folder = db.list_notes_in_folder(member, folder.id).unwrap();
        assert_eq!(in_folder.len(), 1);
        assert_eq!(in_folder[0].id, filed.id);

        let unfiled = db.list_unfiled_notes(member).unwrap();
        assert_eq!(unfiled.len(), 1);
        assert_eq!(unfiled[0].id, loose.id);

        db.update_note(loose.id, "Loose", "edited", Some(folder.id)).unwrap();
        let moved = db.get_note(member, loose.id).unwrap().unwrap();
        assert_eq!(moved.content, "edited");
        assert_eq!(moved.folder_id, Some(folder.id));

        db.delete_note(filed.id).unwrap();
        assert!(db.get_note(member, filed.id).unwrap().is_none());
    }

    #[test]
    fn ownership_scopes_note_lookup() {
        let (db, alice) = db_with_member();
        let bob = db.create_member("Bob", "bob@example.com", "hash").unwrap();
        let note = db.create_note(alice, None, "Private", "x").unwrap();

        assert!(db.get_note(bob.id, note.id).unwrap().is_none());
    }
}
