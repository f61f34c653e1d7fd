use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use quill_db::models::{FolderRow, NoteRow};
use quill_types::api::{FolderSummary, NoteGroup, NoteResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentMember;
use crate::payload::NotePayload;
use crate::tree;

#[derive(Debug, Deserialize)]
pub struct NoteQuery {
    pub folder_id: Option<i64>,
}

/// Without a filter, notes come back grouped per folder with the unfiled
/// group last. With `folder_id`, a flat list scoped to that folder.
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Query(query): Query<NoteQuery>,
) -> Result<Response, ApiError> {
    let member_id = member.id;

    match query.folder_id {
        Some(folder_id) => {
            let db = state.clone();
            let (folder, all, notes) = tokio::task::spawn_blocking(move || {
                let folder = db
                    .db
                    .get_active_folder(member_id, folder_id)
                    .map_err(ApiError::from)?
                    .ok_or(ApiError::FolderNotFound)?;
                let all = db.db.list_folders(member_id).map_err(ApiError::from)?;
                let notes = db
                    .db
                    .list_notes_in_folder(member_id, folder_id)
                    .map_err(ApiError::from)?;
                Ok::<_, ApiError>((folder, all, notes))
            })
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

            let summary = folder_summary(&folder, &all);
            let notes: Vec<NoteResponse> = notes
                .iter()
                .map(|note| note_response(note, Some(summary.clone())))
                .collect();
            Ok(Json(notes).into_response())
        }
        None => {
            let db = state.clone();
            let (all, filed, unfiled) = tokio::task::spawn_blocking(move || {
                let all = db.db.list_folders(member_id).map_err(ApiError::from)?;
                let mut filed = Vec::new();
                for folder in all.iter().filter(|f| f.is_active) {
                    let notes = db
                        .db
                        .list_notes_in_folder(member_id, folder.id)
                        .map_err(ApiError::from)?;
                    if !notes.is_empty() {
                        filed.push((folder.clone(), notes));
                    }
                }
                let unfiled = db.db.list_unfiled_notes(member_id).map_err(ApiError::from)?;
                Ok::<_, ApiError>((all, filed, unfiled))
            })
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

            let mut groups: Vec<NoteGroup> = filed
                .into_iter()
                .map(|(folder, notes)| NoteGroup {
                    folder: Some(folder_summary(&folder, &all)),
                    notes: notes.iter().map(|n| note_response(n, None)).collect(),
                })
                .collect();
            if !unfiled.is_empty() {
                groups.push(NoteGroup {
                    folder: None,
                    notes: unfiled.iter().map(|n| note_response(n, None)).collect(),
                });
            }
            Ok(Json(groups).into_response())
        }
    }
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state
        .db
        .get_note(member.id, id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::NoteNotFound)?;

    let folder = assigned_folder(&state, member.id, note.folder_id)?;
    Ok(Json(note_response(&note, folder)))
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    payload: NotePayload,
) -> Result<impl IntoResponse, ApiError> {
    let input = payload.validate()?;

    if let Some(folder_id) = input.folder_id {
        state
            .db
            .get_active_folder(member.id, folder_id)
            .map_err(ApiError::from)?
            .ok_or(ApiError::FolderNotFound)?;
    }

    let note = state
        .db
        .create_note(member.id, input.folder_id, &input.title, &input.content)?;
    let folder = assigned_folder(&state, member.id, note.folder_id)?;
    info!("Member {} created note {}", member.id, note.id);

    Ok((StatusCode::CREATED, Json(note_response(&note, folder))))
}

pub async fn update_note(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Path(id): Path<i64>,
    payload: NotePayload,
) -> Result<impl IntoResponse, ApiError> {
    let input = payload.validate()?;

    state
        .db
        .get_note(member.id, id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::NoteNotFound)?;

    if let Some(folder_id) = input.folder_id {
        state
            .db
            .get_active_folder(member.id, folder_id)
            .map_err(ApiError::from)?
            .ok_or(ApiError::FolderNotFound)?;
    }

    state
        .db
        .update_note(id, &input.title, &input.content, input.folder_id)?;

    let note = state
        .db
        .get_note(member.id, id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::from(anyhow::anyhow!("Note {} vanished during update", id)))?;
    let folder = assigned_folder(&state, member.id, note.folder_id)?;

    Ok(Json(note_response(&note, folder)))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Extension(member): Extension<CurrentMember>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .db
        .get_note(member.id, id)
        .map_err(ApiError::from)?
        .ok_or(ApiError::NoteNotFound)?;

    state.db.delete_note(id)?;
    info!("Member {} deleted note {}", member.id, id);

    Ok(StatusCode::NO_CONTENT)
}

/// Denormalized summary of the note's folder, when it has one.
fn assigned_folder(
    state: &AppState,
    member_id: i64,
    folder_id: Option<i64>,
) -> Result<Option<FolderSummary>, ApiError> {
    let Some(folder_id) = folder_id else {
        return Ok(None);
    };
    let all = state.db.list_folders(member_id).map_err(ApiError::from)?;
    Ok(all
        .iter()
        .find(|f| f.id == folder_id)
        .map(|f| folder_summary(f, &all)))
}

fn folder_summary(folder: &FolderRow, all: &[FolderRow]) -> FolderSummary {
    FolderSummary {
        id: folder.id,
        name: folder.name.clone(),
        path: tree::display_path(all, folder.id),
    }
}

fn note_response(note: &NoteRow, folder: Option<FolderSummary>) -> NoteResponse {
    NoteResponse {
        id: note.id,
        title: note.title.clone(),
        content: note.content.clone(),
        folder,
        is_active: note.is_active,
        created_at: crate::parse_timestamp(&note.created_at),
        updated_at: crate::parse_timestamp(&note.updated_at),
    }
}
