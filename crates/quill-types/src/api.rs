use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Auth --

/// Request fields are all optional so missing input surfaces as a
/// field-level validation message instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemberProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub birthday: Option<String>,
    pub note: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub member: MemberProfile,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

// -- Folders --

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFolderRequest {
    pub name: Option<String>,
    pub parent_id: Option<i64>,
}

/// One node of the member's folder tree. `path` is the root-to-self name
/// chain; it is computed per response, never stored.
#[derive(Debug, Serialize)]
pub struct FolderNode {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub sort_order: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FolderNode>,
}

#[derive(Debug, Serialize)]
pub struct FolderResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub path: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Notes --

#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub id: i64,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub folder: Option<FolderSummary>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notes grouped per folder for the unfiltered listing. The unfiled group
/// carries `folder: None` and always sorts last.
#[derive(Debug, Serialize)]
pub struct NoteGroup {
    pub folder: Option<FolderSummary>,
    pub notes: Vec<NoteResponse>,
}
