use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Field-level validation messages, keyed by input field name.
#[derive(Debug, Default)]
pub struct FieldErrors(pub BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// Domain failures, mapped to a status code and a machine-readable tag at
/// the response boundary. Cross-member access is always NotFound, never a
/// distinct forbidden kind.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("content or file is required")]
    ContentOrFileRequired,
    #[error("email already registered")]
    EmailExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no token provided")]
    TokenMissing,
    #[error("token format is invalid")]
    TokenMalformed,
    #[error("token is invalid or has been revoked")]
    TokenInvalid,
    #[error("folder not found")]
    FolderNotFound,
    #[error("parent folder not found")]
    ParentFolderNotFound,
    #[error("note not found")]
    NoteNotFound,
    #[error("folder still has sub-folders")]
    FolderHasChildren,
    #[error("folder still has notes")]
    FolderHasNotes,
    #[error("folder cannot be moved beneath itself")]
    InvalidParent,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, tag) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            ApiError::ContentOrFileRequired => {
                (StatusCode::BAD_REQUEST, "content_or_file_required")
            }
            ApiError::EmailExists => (StatusCode::CONFLICT, "email_exists"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::TokenMissing => (StatusCode::UNAUTHORIZED, "token_missing"),
            ApiError::TokenMalformed => (StatusCode::UNAUTHORIZED, "invalid_token_format"),
            ApiError::TokenInvalid => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::FolderNotFound => (StatusCode::NOT_FOUND, "folder_not_found"),
            ApiError::ParentFolderNotFound => (StatusCode::NOT_FOUND, "parent_folder_not_found"),
            ApiError::NoteNotFound => (StatusCode::NOT_FOUND, "note_not_found"),
            ApiError::FolderHasChildren => (StatusCode::BAD_REQUEST, "has_children"),
            ApiError::FolderHasNotes => (StatusCode::BAD_REQUEST, "has_notes"),
            ApiError::InvalidParent => (StatusCode::BAD_REQUEST, "invalid_parent"),
            ApiError::Internal(err) => {
                error!("Unhandled internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let message = match &self {
            // Internal detail never reaches the caller.
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        let mut body = json!({ "message": message, "error": tag });
        match &self {
            ApiError::Validation(fields) => {
                body["errors"] = json!(fields.0);
            }
            ApiError::ContentOrFileRequired => {
                body["errors"] = json!({ "content": ["content or file is required"] });
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
