// Domain rules for proposals - pure, no database access
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::models::{
    Itinerary, ItineraryStatus, Proposal, ProposalStatus, RequestStatus, TransportRequest,
};

const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    ItineraryNotFound,
    RequestNotFound,
    ProposalNotFound,
    /// Caller is not allowed to act on this pair. Reported as a 400, not 403.
    Forbidden(&'static str),
    /// A business rule refused the transition.
    Rejected(&'static str),
    Conflict(&'static str),
    InvalidAction(String),
    Invalid(String),
}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItineraryNotFound => write!(f, "Itinerary not found"),
            Self::RequestNotFound => write!(f, "Request not found"),
            Self::ProposalNotFound => write!(f, "Proposal not found"),
            Self::Forbidden(msg) | Self::Rejected(msg) | Self::Conflict(msg) => {
                write!(f, "{}", msg)
            }
            Self::InvalidAction(action) => write!(
                f,
                "Unknown action '{}': expected 'accepter' or 'refuser'",
                action
            ),
            Self::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ProposalError {}

pub const NOT_OWN_REQUEST: &str = "You can only propose with your own request";
pub const OWN_ITINERARY: &str = "You cannot propose on your own itinerary";
pub const ITINERARY_INACTIVE: &str = "Itinerary is no longer active";
pub const REQUEST_NOT_SEARCHING: &str = "Request is no longer searching for a traveler";
pub const ALREADY_PROPOSED: &str = "A proposal already exists for this itinerary and request";
pub const NO_CAPACITY: &str = "Not enough capacity left on this itinerary";
pub const NOT_TRAVELER: &str = "Only the traveler can respond to this proposal";
pub const ALREADY_RESPONDED: &str = "This proposal has already been responded to";

/// Price terms submitted by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProposal {
    pub request_id: String,
    pub price_per_kilo: Decimal,
    pub commission: Decimal,
    #[serde(default)]
    pub message: Option<String>,
}

impl NewProposal {
    /// Boundary validation, run before any storage work.
    pub fn validate(mut self) -> Result<Self, ProposalError> {
        if self.price_per_kilo < Decimal::ZERO {
            return Err(ProposalError::Invalid(
                "Price per kilo cannot be negative".into(),
            ));
        }
        if self.commission < Decimal::ZERO {
            return Err(ProposalError::Invalid("Commission cannot be negative".into()));
        }
        self.message = self
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if self
            .message
            .as_ref()
            .is_some_and(|m| m.chars().count() > MAX_MESSAGE_LEN)
        {
            return Err(ProposalError::Invalid(format!(
                "Message must be {} characters or less",
                MAX_MESSAGE_LEN
            )));
        }
        Ok(self)
    }
}

/// Traveler's answer to a pending proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalAction {
    Accept,
    Reject { message: Option<String> },
}

impl ProposalAction {
    /// Parse the wire form. Unknown actions are an error, never an implicit reject.
    pub fn parse(action: &str, reject_message: Option<String>) -> Result<Self, ProposalError> {
        match action.trim().to_ascii_lowercase().as_str() {
            "accepter" | "accept" => Ok(Self::Accept),
            "refuser" | "reject" => Ok(Self::Reject {
                message: reject_message
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty()),
            }),
            _ => Err(ProposalError::InvalidAction(action.to_string())),
        }
    }
}

/// Why a pending proposal was closed without the traveler's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Another proposal on the same request was accepted
    RequestFulfilled,
    /// The client withdrew the request
    RequestWithdrawn,
    /// The traveler cancelled the itinerary
    ItineraryCancelled,
}

/// Identifies a proposal and both parties in an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRef {
    pub proposal_id: String,
    pub itinerary_id: String,
    pub request_id: String,
    pub client_id: String,
    pub traveler_id: String,
}

impl From<&Proposal> for ProposalRef {
    fn from(p: &Proposal) -> Self {
        Self {
            proposal_id: p.id.clone(),
            itinerary_id: p.itinerary_id.clone(),
            request_id: p.request_id.clone(),
            client_id: p.client_id.clone(),
            traveler_id: p.traveler_id.clone(),
        }
    }
}

/// Emitted inside a transaction, delivered only after it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalEvent {
    Created(ProposalRef),
    Accepted(ProposalRef),
    Rejected {
        proposal: ProposalRef,
        message: Option<String>,
    },
    AutoCancelled {
        proposal: ProposalRef,
        reason: CancelReason,
    },
}

impl ProposalEvent {
    pub fn proposal(&self) -> &ProposalRef {
        match self {
            Self::Created(p) | Self::Accepted(p) => p,
            Self::Rejected { proposal, .. } | Self::AutoCancelled { proposal, .. } => proposal,
        }
    }
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        matches!(self, Self::Pending) && next != Self::Pending
    }
}

/// Evaluate the creation preconditions in order; the first failure wins.
///
/// `already_proposed` is only consulted once every earlier rule has passed.
pub fn check_create<F, E>(
    itinerary: Option<&Itinerary>,
    request: Option<&TransportRequest>,
    client_id: &str,
    already_proposed: F,
) -> Result<(), E>
where
    F: FnOnce() -> Result<bool, E>,
    E: From<ProposalError>,
{
    let itinerary = itinerary.ok_or(ProposalError::ItineraryNotFound)?;
    let request = request.ok_or(ProposalError::RequestNotFound)?;

    if request.owner_id != client_id {
        return Err(ProposalError::Forbidden(NOT_OWN_REQUEST).into());
    }
    if itinerary.owner_id == client_id {
        return Err(ProposalError::Forbidden(OWN_ITINERARY).into());
    }
    if itinerary.status != ItineraryStatus::Active {
        return Err(ProposalError::Rejected(ITINERARY_INACTIVE).into());
    }
    if request.status != RequestStatus::Searching {
        return Err(ProposalError::Rejected(REQUEST_NOT_SEARCHING).into());
    }
    if already_proposed()? {
        return Err(ProposalError::Conflict(ALREADY_PROPOSED).into());
    }
    if itinerary.available_weight - request.estimated_weight <= Decimal::ZERO {
        return Err(ProposalError::Rejected(NO_CAPACITY).into());
    }

    Ok(())
}

/// Build the pending proposal. Currency always comes from the request.
pub fn build_proposal(
    id: String,
    itinerary: &Itinerary,
    request: &TransportRequest,
    terms: NewProposal,
    now: DateTime<Utc>,
) -> Proposal {
    Proposal {
        id,
        itinerary_id: itinerary.id.clone(),
        request_id: request.id.clone(),
        client_id: request.owner_id.clone(),
        traveler_id: itinerary.owner_id.clone(),
        price_per_kilo: terms.price_per_kilo,
        commission: terms.commission,
        currency: request.currency.clone(),
        message: terms.message,
        status: ProposalStatus::Pending,
        reject_message: None,
        created_at: now,
        updated_at: now,
        responded_at: None,
    }
}

/// Check who may answer and that the proposal is still open.
pub fn check_respond(proposal: &Proposal, responder_id: &str) -> Result<(), ProposalError> {
    if proposal.traveler_id != responder_id {
        return Err(ProposalError::Forbidden(NOT_TRAVELER));
    }
    if proposal.status.is_terminal() {
        return Err(ProposalError::Rejected(ALREADY_RESPONDED));
    }
    Ok(())
}

impl Proposal {
    fn close(mut self, status: ProposalStatus, now: DateTime<Utc>) -> Result<Self, ProposalError> {
        if !self.status.can_transition_to(status) {
            return Err(ProposalError::Rejected(ALREADY_RESPONDED));
        }
        self.status = status;
        self.updated_at = now;
        self.responded_at = Some(now);
        Ok(self)
    }

    pub fn accept(self, now: DateTime<Utc>) -> Result<Self, ProposalError> {
        self.close(ProposalStatus::Accepted, now)
    }

    pub fn reject(self, message: Option<String>, now: DateTime<Utc>) -> Result<Self, ProposalError> {
        let mut rejected = self.close(ProposalStatus::Rejected, now)?;
        rejected.reject_message = message;
        Ok(rejected)
    }

    pub fn auto_cancel(self, now: DateTime<Utc>) -> Result<Self, ProposalError> {
        self.close(ProposalStatus::Cancelled, now)
    }
}

/// Capacity left after carrying `estimated_weight`, clamped at zero.
/// The itinerary becomes `complete` exactly when nothing is left.
pub fn settle_capacity(
    available_weight: Decimal,
    estimated_weight: Decimal,
    status: ItineraryStatus,
) -> (Decimal, ItineraryStatus) {
    let remaining = (available_weight - estimated_weight).max(Decimal::ZERO);
    if remaining.is_zero() {
        (remaining, ItineraryStatus::Complete)
    } else {
        (remaining, status)
    }
}
