// Itinerary ("voyage") and request ("demande") publishing and cancellation
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::currency::CurrencyCode;
use crate::db::models::{Itinerary, ItineraryStatus, RequestStatus, TransportRequest};
use crate::db::{fmt_date, fmt_timestamp, with_immediate_transaction};
use crate::matching::city_matches;
use crate::proposals::{cancel_pending, CancelReason, PendingScope, ProposalEvent, RepositoryError};
use crate::visibility;

pub const NOT_ITINERARY_OWNER: &str = "Only the traveler can cancel this itinerary";
pub const NOT_REQUEST_OWNER: &str = "Only the client can cancel this request";
pub const ITINERARY_NOT_CANCELLABLE: &str = "Itinerary can no longer be cancelled";
pub const REQUEST_NOT_CANCELLABLE: &str = "Only a request still searching can be cancelled";

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Itinerary not found")]
    ItineraryNotFound,

    #[error("Request not found")]
    RequestNotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Rejected(&'static str),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn required_city(raw: &str, field: &str) -> Result<String, ListingError> {
    let city = raw.trim();
    if city.is_empty() {
        return Err(ListingError::Invalid(format!("{} is required", field)));
    }
    Ok(city.to_string())
}

fn optional_price(value: Option<Decimal>, field: &str) -> Result<Option<Decimal>, ListingError> {
    match value {
        Some(v) if v < Decimal::ZERO => {
            Err(ListingError::Invalid(format!("{} cannot be negative", field)))
        }
        other => Ok(other),
    }
}

fn positive_weight(value: Decimal, field: &str) -> Result<Decimal, ListingError> {
    if value <= Decimal::ZERO {
        return Err(ListingError::Invalid(format!("{} must be greater than zero", field)));
    }
    Ok(value)
}

fn currency_or(raw: Option<&str>, fallback: &str) -> Result<String, ListingError> {
    let code = CurrencyCode::parse(raw.unwrap_or(fallback))
        .map_err(|e| ListingError::Invalid(e.to_string()))?;
    Ok(code.to_string())
}

// -- Itineraries --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItinerary {
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    pub arrival_date: NaiveDate,
    pub available_weight: Decimal,
    #[serde(default)]
    pub price_per_kilo: Option<Decimal>,
    #[serde(default)]
    pub commission: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl NewItinerary {
    /// Validate and build the row. `default_currency` is the owner's preference.
    pub fn into_itinerary(
        self,
        id: String,
        owner_id: &str,
        default_currency: &str,
        now: DateTime<Utc>,
    ) -> Result<Itinerary, ListingError> {
        if self.arrival_date < self.departure_date {
            return Err(ListingError::Invalid(
                "Arrival date cannot be before departure date".into(),
            ));
        }

        Ok(Itinerary {
            id,
            owner_id: owner_id.to_string(),
            departure_city: required_city(&self.departure_city, "Departure city")?,
            arrival_city: required_city(&self.arrival_city, "Arrival city")?,
            departure_date: self.departure_date,
            arrival_date: self.arrival_date,
            available_weight: positive_weight(self.available_weight, "Available weight")?,
            price_per_kilo: optional_price(self.price_per_kilo, "Price per kilo")?,
            commission: optional_price(self.commission, "Commission")?,
            currency: currency_or(self.currency.as_deref(), default_currency)?,
            status: ItineraryStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}

pub fn create_itinerary(
    conn: &Connection,
    owner_id: &str,
    default_currency: &str,
    input: NewItinerary,
) -> Result<Itinerary, ListingError> {
    let itinerary = input.into_itinerary(
        uuid::Uuid::now_v7().to_string(),
        owner_id,
        default_currency,
        Utc::now(),
    )?;

    conn.execute(
        "INSERT INTO itineraries (id, owner_id, departure_city, arrival_city, departure_date,
                                  arrival_date, available_weight, price_per_kilo, commission,
                                  currency, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            itinerary.id,
            itinerary.owner_id,
            itinerary.departure_city,
            itinerary.arrival_city,
            fmt_date(itinerary.departure_date),
            fmt_date(itinerary.arrival_date),
            itinerary.available_weight.to_string(),
            itinerary.price_per_kilo.map(|v| v.to_string()),
            itinerary.commission.map(|v| v.to_string()),
            itinerary.currency,
            itinerary.status.as_str(),
            fmt_timestamp(itinerary.created_at),
            fmt_timestamp(itinerary.updated_at),
        ],
    )?;

    tracing::info!(
        "Itinerary {} published: {} -> {} on {}",
        itinerary.id,
        itinerary.departure_city,
        itinerary.arrival_city,
        itinerary.departure_date
    );
    Ok(itinerary)
}

/// Owners hidden from search are only visible to themselves.
pub fn get_itinerary(
    conn: &Connection,
    id: &str,
    viewer_id: Option<&str>,
) -> Result<Itinerary, ListingError> {
    let itinerary = Itinerary::find(conn, id)?.ok_or(ListingError::ItineraryNotFound)?;
    if viewer_id == Some(itinerary.owner_id.as_str()) {
        return Ok(itinerary);
    }

    let settings = visibility::load_or_default(conn, &itinerary.owner_id)?;
    if !visibility::is_search_visible(&settings) {
        return Err(ListingError::ItineraryNotFound);
    }
    Ok(itinerary)
}

/// Active itineraries of search-visible owners, soonest departure first.
pub fn search_itineraries(
    conn: &Connection,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<Itinerary>, ListingError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM itineraries WHERE status = ?1
         ORDER BY departure_date ASC, created_at ASC",
        Itinerary::COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![ItineraryStatus::Active.as_str()],
            Itinerary::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut found = Vec::new();
    for itinerary in rows {
        if from.is_some_and(|c| !city_matches(&itinerary.departure_city, c))
            || to.is_some_and(|c| !city_matches(&itinerary.arrival_city, c))
        {
            continue;
        }
        let settings = visibility::load_or_default(conn, &itinerary.owner_id)?;
        if visibility::is_search_visible(&settings) {
            found.push(itinerary);
        }
    }
    Ok(found)
}

/// Cancel an itinerary and every pending proposal on it, in one transaction.
pub fn cancel_itinerary(
    conn: &Connection,
    id: &str,
    owner_id: &str,
) -> Result<(Itinerary, Vec<ProposalEvent>), ListingError> {
    let now = Utc::now();
    with_immediate_transaction(conn, |conn| {
        let mut itinerary = Itinerary::find(conn, id)?.ok_or(ListingError::ItineraryNotFound)?;
        if itinerary.owner_id != owner_id {
            return Err(ListingError::Forbidden(NOT_ITINERARY_OWNER));
        }
        if !matches!(
            itinerary.status,
            ItineraryStatus::Active | ItineraryStatus::Complete
        ) {
            return Err(ListingError::Rejected(ITINERARY_NOT_CANCELLABLE));
        }

        itinerary.status = ItineraryStatus::Cancelled;
        itinerary.updated_at = now;
        conn.execute(
            "UPDATE itineraries SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, itinerary.status.as_str(), fmt_timestamp(now)],
        )?;

        let events = cancel_pending(
            conn,
            PendingScope::Itinerary(id),
            CancelReason::ItineraryCancelled,
            now,
        )?;

        tracing::info!(
            "Itinerary {} cancelled, {} pending proposal(s) closed",
            id,
            events.len()
        );
        Ok((itinerary, events))
    })
}

// -- Requests --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub departure_city: String,
    pub arrival_city: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    pub estimated_weight: Decimal,
    #[serde(default)]
    pub price_per_kilo: Option<Decimal>,
    #[serde(default)]
    pub commission: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl NewRequest {
    pub fn into_request(
        self,
        id: String,
        owner_id: &str,
        default_currency: &str,
        now: DateTime<Utc>,
    ) -> Result<TransportRequest, ListingError> {
        Ok(TransportRequest {
            id,
            owner_id: owner_id.to_string(),
            departure_city: required_city(&self.departure_city, "Departure city")?,
            arrival_city: required_city(&self.arrival_city, "Arrival city")?,
            deadline: self.deadline,
            estimated_weight: positive_weight(self.estimated_weight, "Estimated weight")?,
            price_per_kilo: optional_price(self.price_per_kilo, "Price per kilo")?,
            commission: optional_price(self.commission, "Commission")?,
            currency: currency_or(self.currency.as_deref(), default_currency)?,
            status: RequestStatus::Searching,
            created_at: now,
            updated_at: now,
        })
    }
}

pub fn create_request(
    conn: &Connection,
    owner_id: &str,
    default_currency: &str,
    input: NewRequest,
) -> Result<TransportRequest, ListingError> {
    let request = input.into_request(
        uuid::Uuid::now_v7().to_string(),
        owner_id,
        default_currency,
        Utc::now(),
    )?;

    conn.execute(
        "INSERT INTO requests (id, owner_id, departure_city, arrival_city, deadline,
                               estimated_weight, price_per_kilo, commission, currency,
                               status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            request.id,
            request.owner_id,
            request.departure_city,
            request.arrival_city,
            request.deadline.map(fmt_date),
            request.estimated_weight.to_string(),
            request.price_per_kilo.map(|v| v.to_string()),
            request.commission.map(|v| v.to_string()),
            request.currency,
            request.status.as_str(),
            fmt_timestamp(request.created_at),
            fmt_timestamp(request.updated_at),
        ],
    )?;

    tracing::info!(
        "Request {} published: {} -> {}, {} kg",
        request.id,
        request.departure_city,
        request.arrival_city,
        request.estimated_weight
    );
    Ok(request)
}

/// Same rule as itineraries: a hidden owner's requests look missing to others.
pub fn get_request(
    conn: &Connection,
    id: &str,
    viewer_id: Option<&str>,
) -> Result<TransportRequest, ListingError> {
    let request = TransportRequest::find(conn, id)?.ok_or(ListingError::RequestNotFound)?;
    if viewer_id == Some(request.owner_id.as_str()) {
        return Ok(request);
    }

    let settings = visibility::load_or_default(conn, &request.owner_id)?;
    if !visibility::is_search_visible(&settings) {
        return Err(ListingError::RequestNotFound);
    }
    Ok(request)
}

/// Newest first, cancelled ones included.
pub fn requests_owned_by(
    conn: &Connection,
    owner_id: &str,
) -> Result<Vec<TransportRequest>, ListingError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM requests WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC",
        TransportRequest::COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![owner_id], TransportRequest::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Withdraw a searching request. The row is kept with status `cancelled`.
pub fn cancel_request(
    conn: &Connection,
    id: &str,
    owner_id: &str,
) -> Result<(TransportRequest, Vec<ProposalEvent>), ListingError> {
    let now = Utc::now();
    with_immediate_transaction(conn, |conn| {
        let mut request = TransportRequest::find(conn, id)?.ok_or(ListingError::RequestNotFound)?;
        if request.owner_id != owner_id {
            return Err(ListingError::Forbidden(NOT_REQUEST_OWNER));
        }
        if request.status != RequestStatus::Searching {
            return Err(ListingError::Rejected(REQUEST_NOT_CANCELLABLE));
        }

        request.status = RequestStatus::Cancelled;
        request.updated_at = now;
        conn.execute(
            "UPDATE requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, request.status.as_str(), fmt_timestamp(now)],
        )?;

        let events = cancel_pending(
            conn,
            PendingScope::Request(id),
            CancelReason::RequestWithdrawn,
            now,
        )?;

        tracing::info!(
            "Request {} withdrawn, {} pending proposal(s) closed",
            id,
            events.len()
        );
        Ok((request, events))
    })
}
