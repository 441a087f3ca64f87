// Proposal handlers - domain rules live in crate::proposals, side effects at the edges
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::proposals::{
    NewProposal, ProposalAction, ProposalError, ProposalRepository, ProposalRole, ProposalSummary,
    RepositoryError, SqliteProposalRepository,
};
use crate::routes::notify;
use crate::state::AppState;

// -- Error conversion --

impl From<ProposalError> for AppError {
    fn from(err: ProposalError) -> Self {
        match err {
            ProposalError::ItineraryNotFound
            | ProposalError::RequestNotFound
            | ProposalError::ProposalNotFound => AppError::NotFound,
            // Forbidden is reported as 400 like every other refused rule
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Pool(e),
            RepositoryError::Sql(e) => AppError::Database(e),
            RepositoryError::Serialization(e) => AppError::Json(e),
            RepositoryError::Integrity(msg) => AppError::Internal(msg),
            RepositoryError::Domain(e) => e.into(),
        }
    }
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub action: String,
    #[serde(default)]
    pub reject_message: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub role: ProposalRole,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/voyages/{id}/proposals", post(create))
        .route("/proposals", get(list))
        .route("/proposals/{id}", get(show))
        .route("/proposals/{id}/respond", post(respond))
}

fn summarize(
    state: &AppState,
    viewer: &CurrentUser,
    proposal: crate::db::models::Proposal,
) -> AppResult<ProposalSummary> {
    let conn = state.db.get()?;
    Ok(ProposalSummary::load(
        &conn,
        proposal,
        &viewer.preferred_currency,
        &state.currency,
    )?)
}

/// POST /voyages/{id}/proposals
/// Client offers a price for carrying one of their requests on this itinerary
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(itinerary_id): Path<String>,
    Json(req): Json<NewProposal>,
) -> AppResult<Response> {
    let repo = SqliteProposalRepository::new(state.db.clone());

    let committed = repo.create(&itinerary_id, &user.id, req).await?;
    notify(&state, committed.events).await;

    let summary = summarize(&state, &user, committed.proposal)?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

/// POST /proposals/{id}/respond
/// Traveler accepts or rejects; accepting settles capacity and closes competing proposals
async fn respond(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(proposal_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> AppResult<Response> {
    // Unknown actions are refused before anything is loaded
    let action = ProposalAction::parse(&req.action, req.reject_message)?;
    let repo = SqliteProposalRepository::new(state.db.clone());

    let committed = repo.respond(&proposal_id, &user.id, action).await?;
    notify(&state, committed.events).await;

    let summary = summarize(&state, &user, committed.proposal)?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// GET /proposals/{id}
/// Only the client and the traveler may look
async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(proposal_id): Path<String>,
) -> AppResult<Response> {
    let repo = SqliteProposalRepository::new(state.db.clone());
    let proposal = repo
        .get(&proposal_id)
        .await?
        .filter(|p| p.client_id == user.id || p.traveler_id == user.id)
        .ok_or(AppError::NotFound)?;

    let summary = summarize(&state, &user, proposal)?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// GET /proposals?role=sent|received
async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let repo = SqliteProposalRepository::new(state.db.clone());
    let proposals = repo.list_for_user(&user.id, query.role).await?;

    let summaries = proposals
        .into_iter()
        .map(|p| summarize(&state, &user, p))
        .collect::<AppResult<Vec<_>>>()?;
    Ok((StatusCode::OK, Json(summaries)).into_response())
}
