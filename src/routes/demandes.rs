use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::listings::{self, NewRequest};
use crate::matching;
use crate::routes::notify;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MatchesQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/demandes", post(publish))
        .route("/demandes/mine", get(mine))
        .route("/demandes/{id}", get(show))
        .route("/demandes/{id}/cancel", post(cancel))
        .route("/demandes/{id}/matches", get(matches))
}

/// POST /demandes
async fn publish(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let request = listings::create_request(&conn, &user.id, &user.preferred_currency, req)?;
    Ok((StatusCode::CREATED, Json(request)).into_response())
}

/// GET /demandes/mine
async fn mine(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let requests = listings::requests_owned_by(&conn, &user.id)?;
    Ok((StatusCode::OK, Json(requests)).into_response())
}

/// GET /demandes/{id}
async fn show(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let viewer_id = maybe_user.0.as_ref().map(|u| u.id.as_str());
    let request = listings::get_request(&conn, &id, viewer_id)?;
    Ok((StatusCode::OK, Json(request)).into_response())
}

/// POST /demandes/{id}/cancel
/// Withdraws the request; travelers with pending proposals are notified
async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let (request, events) = {
        let conn = state.db.get()?;
        listings::cancel_request(&conn, &id, &user.id)?
    };

    notify(&state, events).await;
    Ok((StatusCode::OK, Json(request)).into_response())
}

/// GET /demandes/{id}/matches?limit=N
/// Best itineraries for the caller's own request
async fn matches(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<MatchesQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let request = listings::get_request(&conn, &id, Some(&user.id))?;
    if request.owner_id != user.id {
        return Err(AppError::BadRequest(
            "Only the request owner can see its matches".into(),
        ));
    }

    let settings = &state.config.matching;
    let limit = query
        .limit
        .unwrap_or(settings.default_limit)
        .clamp(1, settings.max_limit.max(1));

    let found = matching::find_best_matches(&conn, &request, limit)?;
    Ok((StatusCode::OK, Json(found)).into_response())
}

#[cfg(test)]
mod tests {
    use crate::routes::app;
    use crate::routes::test_support::{call, create_test_state, sign_up};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn publish_trip(app: &axum::Router, token: &str, from: &str, date: &str) {
        let (status, _) = call(
            app,
            Method::POST,
            "/voyages",
            Some(token),
            Some(json!({
                "departureCity": from,
                "arrivalCity": "Dakar",
                "departureDate": date,
                "arrivalDate": date,
                "availableWeight": 10
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn publish_request(app: &axum::Router, token: &str) -> String {
        let (status, created) = call(
            app,
            Method::POST,
            "/demandes",
            Some(token),
            Some(json!({
                "departureCity": "Paris",
                "arrivalCity": "Dakar",
                "deadline": "2024-06-12",
                "estimatedWeight": 8,
                "currency": "XOF"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "searching");
        created["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn matches_are_ranked_and_owner_only() {
        let (state, _temp) = create_test_state();
        let app = app(state);
        let (_, traveler) = sign_up(&app, "traveler").await;
        let (_, client) = sign_up(&app, "client").await;

        publish_trip(&app, &traveler, "Paris CDG", "2024-06-10").await;
        publish_trip(&app, &traveler, "Paris Orly", "2024-07-30").await;
        publish_trip(&app, &traveler, "Lyon", "2024-06-10").await;
        let request_id = publish_request(&app, &client).await;

        let uri = format!("/demandes/{}/matches", request_id);
        let (status, found) = call(&app, Method::GET, &uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::OK);
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["score"], 100);
        assert_eq!(found[0]["itinerary"]["departureCity"], "Paris CDG");
        assert_eq!(found[1]["score"], 70);

        let (_, limited) = call(
            &app,
            Method::GET,
            &format!("{}?limit=1", uri),
            Some(&client),
            None,
        )
        .await;
        assert_eq!(limited.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::GET, &uri, Some(&traveler), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mine_lists_and_cancel_soft_deletes() {
        let (state, _temp) = create_test_state();
        let app = app(state);
        let (_, client) = sign_up(&app, "client").await;
        let request_id = publish_request(&app, &client).await;

        let cancel_uri = format!("/demandes/{}/cancel", request_id);
        let (status, cancelled) = call(&app, Method::POST, &cancel_uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");

        let (_, mine) = call(&app, Method::GET, "/demandes/mine", Some(&client), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert_eq!(mine[0]["status"], "cancelled");

        let (status, _) = call(&app, Method::POST, &cancel_uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hidden_owner_request_is_not_found_for_others() {
        let (state, _temp) = create_test_state();
        let app = app(state);
        let (_, client) = sign_up(&app, "client").await;
        let (_, other) = sign_up(&app, "other").await;
        let request_id = publish_request(&app, &client).await;
        let uri = format!("/demandes/{}", request_id);

        let (status, _) = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/settings/visibility",
            Some(&client),
            Some(json!({
                "showInSearch": false,
                "profileVisibility": "private",
                "contactPermission": "everyone",
                "showPhone": false,
                "showEmail": false,
                "showStats": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, own) = call(&app, Method::GET, &uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(own["id"], request_id.as_str());
    }
}
