// Repository pattern - every proposal mutation runs in one immediate transaction
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::models::{Itinerary, Proposal, RequestStatus, TransportRequest};
use crate::db::{fmt_timestamp, with_immediate_transaction};
use crate::proposals::domain::*;
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("{0}")]
    Domain(#[from] ProposalError),
}

/// Which side of the proposal the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalRole {
    /// Proposals the caller made as a client
    Sent,
    /// Proposals made on the caller's itineraries
    #[default]
    Received,
}

/// Outcome of a committed mutation plus the events it produced.
#[derive(Debug)]
pub struct Committed {
    pub proposal: Proposal,
    pub events: Vec<ProposalEvent>,
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    /// Validate and insert a pending proposal
    async fn create(
        &self,
        itinerary_id: &str,
        client_id: &str,
        terms: NewProposal,
    ) -> Result<Committed, RepositoryError>;

    /// Apply the traveler's answer, with all accept side effects
    async fn respond(
        &self,
        proposal_id: &str,
        responder_id: &str,
        action: ProposalAction,
    ) -> Result<Committed, RepositoryError>;

    async fn get(&self, proposal_id: &str) -> Result<Option<Proposal>, RepositoryError>;

    async fn list_for_user(
        &self,
        user_id: &str,
        role: ProposalRole,
    ) -> Result<Vec<Proposal>, RepositoryError>;
}

pub struct SqliteProposalRepository {
    pool: DbPool,
}

impl SqliteProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn proposal_exists(
    conn: &Connection,
    itinerary_id: &str,
    request_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM proposals WHERE itinerary_id = ?1 AND request_id = ?2",
        params![itinerary_id, request_id],
        |row| row.get(0),
    )
}

fn insert_proposal(conn: &Connection, p: &Proposal) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO proposals (id, itinerary_id, request_id, client_id, traveler_id,
                                price_per_kilo, commission, currency, message, status,
                                reject_message, created_at, updated_at, responded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            p.id,
            p.itinerary_id,
            p.request_id,
            p.client_id,
            p.traveler_id,
            p.price_per_kilo.to_string(),
            p.commission.to_string(),
            p.currency,
            p.message,
            p.status.as_str(),
            p.reject_message,
            fmt_timestamp(p.created_at),
            fmt_timestamp(p.updated_at),
            p.responded_at.map(fmt_timestamp),
        ],
    )?;
    Ok(())
}

fn update_proposal_status(conn: &Connection, p: &Proposal) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE proposals
         SET status = ?2, reject_message = ?3, updated_at = ?4, responded_at = ?5
         WHERE id = ?1",
        params![
            p.id,
            p.status.as_str(),
            p.reject_message,
            fmt_timestamp(p.updated_at),
            p.responded_at.map(fmt_timestamp),
        ],
    )?;
    Ok(())
}

/// Pending proposals attached to one request or one itinerary.
#[derive(Debug, Clone, Copy)]
pub enum PendingScope<'a> {
    Request(&'a str),
    Itinerary(&'a str),
}

/// Cancel every pending proposal in `scope`. Must run inside the caller's transaction.
pub fn cancel_pending(
    conn: &Connection,
    scope: PendingScope<'_>,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> Result<Vec<ProposalEvent>, RepositoryError> {
    let (column, id) = match scope {
        PendingScope::Request(id) => ("request_id", id),
        PendingScope::Itinerary(id) => ("itinerary_id", id),
    };

    let pending: Vec<Proposal> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM proposals WHERE {} = ?1 AND status = 'pending' ORDER BY created_at",
            Proposal::COLUMNS,
            column
        ))?;
        let rows = stmt
            .query_map(params![id], Proposal::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut events = Vec::with_capacity(pending.len());
    for proposal in pending {
        let cancelled = proposal.auto_cancel(now)?;
        update_proposal_status(conn, &cancelled)?;
        events.push(ProposalEvent::AutoCancelled {
            proposal: ProposalRef::from(&cancelled),
            reason,
        });
    }

    Ok(events)
}

fn create_in_tx(
    conn: &Connection,
    itinerary_id: &str,
    client_id: &str,
    terms: NewProposal,
    now: DateTime<Utc>,
) -> Result<Committed, RepositoryError> {
    let itinerary = Itinerary::find(conn, itinerary_id)?;
    let request = TransportRequest::find(conn, &terms.request_id)?;

    check_create(itinerary.as_ref(), request.as_ref(), client_id, || {
        Ok::<_, RepositoryError>(proposal_exists(conn, itinerary_id, &terms.request_id)?)
    })?;

    let (Some(itinerary), Some(request)) = (itinerary, request) else {
        return Err(ProposalError::ItineraryNotFound.into());
    };

    let proposal = build_proposal(
        uuid::Uuid::now_v7().to_string(),
        &itinerary,
        &request,
        terms,
        now,
    );
    insert_proposal(conn, &proposal)?;

    let events = vec![ProposalEvent::Created(ProposalRef::from(&proposal))];
    Ok(Committed { proposal, events })
}

fn respond_in_tx(
    conn: &Connection,
    proposal_id: &str,
    responder_id: &str,
    action: ProposalAction,
    now: DateTime<Utc>,
) -> Result<Committed, RepositoryError> {
    let proposal = Proposal::find(conn, proposal_id)?.ok_or(ProposalError::ProposalNotFound)?;
    check_respond(&proposal, responder_id)?;

    match action {
        ProposalAction::Reject { message } => {
            let rejected = proposal.reject(message.clone(), now)?;
            update_proposal_status(conn, &rejected)?;
            let events = vec![ProposalEvent::Rejected {
                proposal: ProposalRef::from(&rejected),
                message,
            }];
            Ok(Committed {
                proposal: rejected,
                events,
            })
        }
        ProposalAction::Accept => {
            let itinerary = Itinerary::find(conn, &proposal.itinerary_id)?
                .ok_or(ProposalError::ItineraryNotFound)?;
            let request = TransportRequest::find(conn, &proposal.request_id)?
                .ok_or(ProposalError::RequestNotFound)?;

            let accepted = proposal.accept(now)?;
            update_proposal_status(conn, &accepted)?;

            let (remaining, status) = settle_capacity(
                itinerary.available_weight,
                request.estimated_weight,
                itinerary.status,
            );
            conn.execute(
                "UPDATE itineraries SET available_weight = ?2, status = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    itinerary.id,
                    remaining.to_string(),
                    status.as_str(),
                    fmt_timestamp(now)
                ],
            )?;

            conn.execute(
                "UPDATE requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![
                    request.id,
                    RequestStatus::TravelerFound.as_str(),
                    fmt_timestamp(now)
                ],
            )?;

            let mut events = cancel_pending(
                conn,
                PendingScope::Request(&request.id),
                CancelReason::RequestFulfilled,
                now,
            )?;
            events.push(ProposalEvent::Accepted(ProposalRef::from(&accepted)));

            tracing::info!(
                "Proposal {} accepted: itinerary {} now has {} left ({}), {} sibling(s) cancelled",
                accepted.id,
                itinerary.id,
                remaining,
                status,
                events.len() - 1
            );

            Ok(Committed {
                proposal: accepted,
                events,
            })
        }
    }
}

#[async_trait]
impl ProposalRepository for SqliteProposalRepository {
    async fn create(
        &self,
        itinerary_id: &str,
        client_id: &str,
        terms: NewProposal,
    ) -> Result<Committed, RepositoryError> {
        let terms = terms.validate()?;
        let conn = self.pool.get()?;
        let now = Utc::now();

        let committed = with_immediate_transaction(&conn, |conn| {
            create_in_tx(conn, itinerary_id, client_id, terms, now)
        })?;

        tracing::info!(
            "Proposal {} created on itinerary {} for request {}",
            committed.proposal.id,
            committed.proposal.itinerary_id,
            committed.proposal.request_id
        );
        Ok(committed)
    }

    async fn respond(
        &self,
        proposal_id: &str,
        responder_id: &str,
        action: ProposalAction,
    ) -> Result<Committed, RepositoryError> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        with_immediate_transaction(&conn, |conn| {
            respond_in_tx(conn, proposal_id, responder_id, action, now)
        })
    }

    async fn get(&self, proposal_id: &str) -> Result<Option<Proposal>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(Proposal::find(&conn, proposal_id)?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        role: ProposalRole,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let conn = self.pool.get()?;
        let column = match role {
            ProposalRole::Sent => "client_id",
            ProposalRole::Received => "traveler_id",
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM proposals WHERE {} = ?1 ORDER BY created_at DESC, id DESC",
            Proposal::COLUMNS,
            column
        ))?;
        let proposals = stmt
            .query_map(params![user_id], Proposal::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(proposals)
    }
}
