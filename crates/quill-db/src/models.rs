/// Database row types — these map directly to SQLite rows.
/// Distinct from quill-types API models to keep the DB layer independent.

#[derive(Debug)]
pub struct MemberRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub birthday: Option<String>,
    pub note: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct TokenRow {
    pub id: i64,
    pub member_id: i64,
    pub token: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FolderRow {
    pub id: i64,
    pub member_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct NoteRow {
    pub id: i64,
    pub member_id: i64,
    pub folder_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}
