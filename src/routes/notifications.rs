use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::notifications::inbox;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Serialize)]
pub struct MarkAllResponse {
    pub updated: usize,
}

#[derive(Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}

/// GET /notifications?unread=true
async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<InboxQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let notifications = inbox::list(&conn, &user.id, query.unread)?;
    Ok((StatusCode::OK, Json(notifications)).into_response())
}

/// GET /notifications/unread-count
async fn unread_count(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let unread = inbox::unread_count(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(UnreadCount { unread })).into_response())
}

/// POST /notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    if !inbox::mark_read(&conn, &user.id, &id)? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /notifications/read-all
async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let updated = inbox::mark_all_read(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(MarkAllResponse { updated })).into_response())
}

#[cfg(test)]
mod tests {
    use crate::routes::app;
    use crate::routes::test_support::{call, create_test_state, sign_up};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn proposal_lands_in_traveler_inbox() {
        let (state, _temp) = create_test_state();
        let app = app(state);
        let (_, traveler) = sign_up(&app, "traveler").await;
        let (_, client) = sign_up(&app, "client").await;

        let (_, trip) = call(
            &app,
            Method::POST,
            "/voyages",
            Some(&traveler),
            Some(json!({
                "departureCity": "Paris",
                "arrivalCity": "Dakar",
                "departureDate": "2024-06-10",
                "arrivalDate": "2024-06-10",
                "availableWeight": 20
            })),
        )
        .await;
        let (_, request) = call(
            &app,
            Method::POST,
            "/demandes",
            Some(&client),
            Some(json!({
                "departureCity": "Paris",
                "arrivalCity": "Dakar",
                "estimatedWeight": 5
            })),
        )
        .await;
        let (status, proposal) = call(
            &app,
            Method::POST,
            &format!("/voyages/{}/proposals", trip["id"].as_str().unwrap()),
            Some(&client),
            Some(json!({
                "requestId": request["id"],
                "pricePerKilo": 7,
                "commission": 3
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, inbox) =
            call(&app, Method::GET, "/notifications?unread=true", Some(&traveler), None).await;
        assert_eq!(status, StatusCode::OK);
        let inbox = inbox.as_array().unwrap().clone();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0]["kind"], "proposal_received");
        assert_eq!(inbox[0]["payload"]["proposalId"], proposal["id"]);

        let (_, count) =
            call(&app, Method::GET, "/notifications/unread-count", Some(&traveler), None).await;
        assert_eq!(count, json!({ "unread": 1 }));

        // Someone else's notification looks missing
        let read_uri = format!("/notifications/{}/read", inbox[0]["id"].as_str().unwrap());
        let (status, _) = call(&app, Method::POST, &read_uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::POST, &read_uri, Some(&traveler), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, unread) =
            call(&app, Method::GET, "/notifications?unread=true", Some(&traveler), None).await;
        assert!(unread.as_array().unwrap().is_empty());
        let (_, count) =
            call(&app, Method::GET, "/notifications/unread-count", Some(&traveler), None).await;
        assert_eq!(count, json!({ "unread": 0 }));

        let (_, all) = call(&app, Method::POST, "/notifications/read-all", Some(&traveler), None).await;
        assert_eq!(all, json!({ "updated": 0 }));
    }
}
