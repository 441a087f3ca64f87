// Read model for proposals: both parties, both listings, optional converted prices
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::{CurrencyCode, CurrencyConverter};
use crate::db::models::{
    Itinerary, ItineraryStatus, Proposal, ProposalStatus, RequestStatus, TransportRequest, User,
};
use crate::proposals::domain::ProposalError;
use crate::proposals::repository::RepositoryError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub id: String,
    pub username: String,
    pub is_verified: bool,
}

impl From<&User> for PartySummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            is_verified: user.is_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItinerarySummary {
    pub id: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    pub arrival_date: NaiveDate,
    pub available_weight: Decimal,
    pub status: ItineraryStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub id: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub deadline: Option<NaiveDate>,
    pub estimated_weight: Decimal,
    pub status: RequestStatus,
}

/// Prices restated in the viewer's currency. Display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedPrice {
    pub currency: String,
    pub price_per_kilo: Decimal,
    pub commission: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub id: String,
    pub status: ProposalStatus,
    pub client: PartySummary,
    pub traveler: PartySummary,
    pub itinerary: ItinerarySummary,
    pub request: RequestSummary,
    pub price_per_kilo: Decimal,
    pub commission: Decimal,
    pub currency: String,
    pub message: Option<String>,
    pub reject_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted: Option<ConvertedPrice>,
}

/// Rows a proposal points at.
pub struct Parties {
    pub client: User,
    pub traveler: User,
    pub itinerary: Itinerary,
    pub request: TransportRequest,
}

impl Parties {
    pub fn load(conn: &Connection, proposal: &Proposal) -> Result<Self, RepositoryError> {
        // Parties are foreign keys; a missing one means the store is inconsistent
        let missing = |what: &str| {
            RepositoryError::Integrity(format!("proposal {} has no {}", proposal.id, what))
        };
        let client = User::find(conn, &proposal.client_id)?.ok_or_else(|| missing("client"))?;
        let traveler =
            User::find(conn, &proposal.traveler_id)?.ok_or_else(|| missing("traveler"))?;
        let itinerary = Itinerary::find(conn, &proposal.itinerary_id)?
            .ok_or(ProposalError::ItineraryNotFound)?;
        let request = TransportRequest::find(conn, &proposal.request_id)?
            .ok_or(ProposalError::RequestNotFound)?;

        Ok(Self {
            client,
            traveler,
            itinerary,
            request,
        })
    }
}

fn convert_terms(
    proposal: &Proposal,
    viewer_currency: &str,
    converter: &CurrencyConverter,
) -> Option<ConvertedPrice> {
    let from = CurrencyCode::parse(&proposal.currency).ok()?;
    let to = CurrencyCode::parse(viewer_currency).ok()?;
    if from == to {
        return None;
    }

    Some(ConvertedPrice {
        currency: to.to_string(),
        price_per_kilo: converter.convert(proposal.price_per_kilo, &from, &to)?,
        commission: converter.convert(proposal.commission, &from, &to)?,
    })
}

impl ProposalSummary {
    pub fn project(
        proposal: Proposal,
        parties: Parties,
        viewer_currency: &str,
        converter: &CurrencyConverter,
    ) -> Self {
        let converted = convert_terms(&proposal, viewer_currency, converter);
        let Parties {
            client,
            traveler,
            itinerary,
            request,
        } = parties;

        Self {
            id: proposal.id,
            status: proposal.status,
            client: PartySummary::from(&client),
            traveler: PartySummary::from(&traveler),
            itinerary: ItinerarySummary {
                id: itinerary.id,
                departure_city: itinerary.departure_city,
                arrival_city: itinerary.arrival_city,
                departure_date: itinerary.departure_date,
                arrival_date: itinerary.arrival_date,
                available_weight: itinerary.available_weight,
                status: itinerary.status,
            },
            request: RequestSummary {
                id: request.id,
                departure_city: request.departure_city,
                arrival_city: request.arrival_city,
                deadline: request.deadline,
                estimated_weight: request.estimated_weight,
                status: request.status,
            },
            price_per_kilo: proposal.price_per_kilo,
            commission: proposal.commission,
            currency: proposal.currency,
            message: proposal.message,
            reject_message: proposal.reject_message,
            created_at: proposal.created_at,
            responded_at: proposal.responded_at,
            converted,
        }
    }

    /// Load the parties and project in one go.
    pub fn load(
        conn: &Connection,
        proposal: Proposal,
        viewer_currency: &str,
        converter: &CurrencyConverter,
    ) -> Result<Self, RepositoryError> {
        let parties = Parties::load(conn, &proposal)?;
        Ok(Self::project(proposal, parties, viewer_currency, converter))
    }
}
