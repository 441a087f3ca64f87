use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::users::{self, NewUser, UserError};

// -- Error conversion --

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AppError::NotFound,
            UserError::Invalid(msg) => AppError::BadRequest(msg),
            UserError::Sql(e) => AppError::Database(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

// -- Request/Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(sign_up))
        .route("/users/me", get(me))
        .route("/users/me/logout", post(logout))
        .route("/users/me/address", put(change_address))
        .route("/users/{id}", get(profile))
}

/// POST /users
/// Creates the account and signs it in
async fn sign_up(State(state): State<AppState>, Json(req): Json<NewUser>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (user, token) = users::sign_up(&conn, req, state.config.auth.session_hours)?;

    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    );

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(SignUpResponse {
            user_id: user.id,
            token,
        }),
    )
        .into_response())
}

/// POST /users/me/logout
/// Ends the current session and clears the cookie
async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    session::delete_session(&conn, &user.token)?;
    tracing::info!("User {} logged out", user.id);

    let cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

/// GET /users/me
async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let me = users::find(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(me)).into_response())
}

/// GET /users/{id}
/// Profile filtered by the owner's visibility settings
async fn profile(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let viewer = maybe_user.viewer();
    let profile = users::profile_for(&conn, &id, viewer.as_ref())?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

/// PUT /users/me/address
async fn change_address(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<AddressRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let updated = users::change_address(&conn, &user.id, &req.address, Utc::now())?;
    Ok((StatusCode::OK, Json(updated)).into_response())
}
