use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::listings::{self, ListingError, NewItinerary};
use crate::routes::notify;
use crate::state::AppState;

// -- Error conversion --

impl From<ListingError> for AppError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::ItineraryNotFound | ListingError::RequestNotFound => AppError::NotFound,
            ListingError::Invalid(msg) => AppError::BadRequest(msg),
            ListingError::Forbidden(msg) | ListingError::Rejected(msg) => {
                AppError::BadRequest(msg.to_string())
            }
            ListingError::Sql(e) => AppError::Database(e),
            ListingError::Repository(e) => e.into(),
        }
    }
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/voyages", get(search).post(publish))
        .route("/voyages/{id}", get(show))
        .route("/voyages/{id}/cancel", post(cancel))
}

/// POST /voyages
async fn publish(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewItinerary>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let itinerary = listings::create_itinerary(&conn, &user.id, &user.preferred_currency, req)?;
    Ok((StatusCode::CREATED, Json(itinerary)).into_response())
}

/// GET /voyages?from=&to=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let from = query.from.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let to = query.to.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let itineraries = listings::search_itineraries(&conn, from, to)?;
    Ok((StatusCode::OK, Json(itineraries)).into_response())
}

/// GET /voyages/{id}
async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let viewer_id = maybe_user.0.as_ref().map(|u| u.id.as_str());
    let itinerary = listings::get_itinerary(&conn, &id, viewer_id)?;
    Ok((StatusCode::OK, Json(itinerary)).into_response())
}

/// POST /voyages/{id}/cancel
/// Cancels the trip and every pending proposal on it; clients are notified
async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (itinerary, events) = {
        let conn = state.db.get()?;
        listings::cancel_itinerary(&conn, &id, &user.id)?
    };

    notify(&state, events).await;
    Ok((StatusCode::OK, Json(itinerary)).into_response())
}
