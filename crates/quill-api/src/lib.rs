pub mod auth;
pub mod error;
pub mod folders;
pub mod middleware;
pub mod notes;
pub mod payload;
pub mod token;
pub mod tree;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

pub use auth::{AppState, AppStateInner};

/// Build the full application router: public auth routes, everything else
/// behind the bearer-token middleware.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/folders", get(folders::list_folders).post(folders::create_folder))
        .route("/folders/{id}", put(folders::update_folder).delete(folders::delete_folder))
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/notes/{id}",
            get(notes::get_note)
                .put(notes::update_note)
                .post(notes::update_note)
                .delete(notes::delete_note),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC, accepting RFC 3339 as well.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
