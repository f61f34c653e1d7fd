use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use quill_db::models::FolderRow;
use quill_types::api::{CreateFolderRequest, FolderResponse, UpdateFolderRequest};

use crate::auth::AppState;
use crate::error::{ApiError, FieldErrors};
use crate::middleware::CurrentMember;
use crate::tree;

pub async fn list_folders(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let folders = tokio::task::spawn_blocking(move || db.db.list_folders(member.id))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(tree::build_tree(&folders)))
}

pub async fn create_folder(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validated_name(req.name.as_deref())?;

    // 0 collapses to "no parent", same sentinel notes use for unfiled.
    let parent_id = match req.parent_id {
        Some(0) | None => None,
        other => other,
    };
    if let Some(parent_id) = parent_id {
        // Check-then-act: a parent deleted between this check and the
        // insert is an accepted race for single-member data.
        state
            .db
            .get_folder(member.id, parent_id)
            .map_err(ApiError::from)?
            .ok_or(ApiError::ParentFolderNotFound)?;
    }

    let folder = state
        .db
        .create_folder(member.id, parent_id, &name, req.description.as_deref())?;
    let all = state.db.list_folders(member.id).map_err(ApiError::from)?;
    info!("Member {} created folder {}", member.id, folder.id);

    Ok((StatusCode::CREATED, Json(folder_response(&folder, &all))))
}

pub async fn update_folder(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validated_name(req.name.as_deref())?;

    let folder = state
        .db
        .get_folder(member.id, id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::FolderNotFound)?;

    let parent_id = match req.parent_id {
        // Absent keeps the current position; 0 moves to the root.
        None => folder.parent_id,
        Some(0) => None,
        Some(parent_id) => {
            state
                .db
                .get_folder(member.id, parent_id)
                .map_err(ApiError::from)?
                .ok_or(ApiError::ParentFolderNotFound)?;
            let all = state.db.list_folders(member.id).map_err(ApiError::from)?;
            if tree::reaches_upward(&all, parent_id, id) {
                return Err(ApiError::InvalidParent);
            }
            Some(parent_id)
        }
    };

    state.db.update_folder(id, &name, parent_id)?;

    let all = state.db.list_folders(member.id).map_err(ApiError::from)?;
    let updated = all
        .iter()
        .find(|f| f.id == id)
        .ok_or_else(|| anyhow::anyhow!("Folder {} vanished during update", id))?;

    Ok(Json(folder_response(updated, &all)))
}

pub async fn delete_folder(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .db
        .get_folder(member.id, id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::FolderNotFound)?;

    if state.db.count_child_folders(id).map_err(ApiError::from)? > 0 {
        return Err(ApiError::FolderHasChildren);
    }
    if state.db.count_folder_notes(id).map_err(ApiError::from)? > 0 {
        return Err(ApiError::FolderHasNotes);
    }

    state.db.delete_folder(id)?;
    info!("Member {} deleted folder {}", member.id, id);

    Ok(StatusCode::NO_CONTENT)
}

fn validated_name(name: Option<&str>) -> Result<String, ApiError> {
    let mut errors = FieldErrors::default();
    let name = name.map(str::trim).unwrap_or("");
    if name.is_empty() {
        errors.add("name", "name is required");
    } else if name.len() > 255 {
        errors.add("name", "name must not exceed 255 characters");
    }
    errors.into_result()?;
    Ok(name.to_string())
}

fn folder_response(folder: &FolderRow, all: &[FolderRow]) -> FolderResponse {
    FolderResponse {
        id: folder.id,
        name: folder.name.clone(),
        description: folder.description.clone(),
        parent_id: folder.parent_id,
        path: tree::display_path(all, folder.id),
        sort_order: folder.sort_order,
        is_active: folder.is_active,
        created_at: crate::parse_timestamp(&folder.created_at),
        updated_at: crate::parse_timestamp(&folder.updated_at),
    }
}
