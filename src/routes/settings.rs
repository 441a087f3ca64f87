use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::visibility::{self, VisibilitySettings};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/settings/visibility",
        get(get_visibility).put(put_visibility),
    )
}

/// GET /settings/visibility
async fn get_visibility(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let settings = visibility::load_or_default(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(settings)).into_response())
}

/// PUT /settings/visibility
/// Replaces every setting at once
async fn put_visibility(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(settings): Json<VisibilitySettings>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    visibility::save(&conn, &user.id, &settings)?;
    tracing::info!("User {} updated visibility settings", user.id);

    let stored = visibility::load_or_default(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(stored)).into_response())
}
