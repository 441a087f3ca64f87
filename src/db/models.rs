use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{
    date_column, decimal_column, opt_date_column, opt_decimal_column, opt_timestamp_column,
    timestamp_column,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub preferred_currency: String,
    pub address: Option<String>,
    pub address_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub const COLUMNS: &'static str = "id, username, email, phone, is_verified, preferred_currency, \
         address, address_updated_at, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            is_verified: row.get(4)?,
            preferred_currency: row.get(5)?,
            address: row.get(6)?,
            address_updated_at: opt_timestamp_column(row, 7)?,
            created_at: timestamp_column(row, 8)?,
        })
    }

    pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", Self::COLUMNS),
            params![id],
            Self::from_row,
        )
        .optional()
    }
}

/// Error returned when a status column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownStatus(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(ItineraryStatus {
    Active => "active",
    Complete => "complete",
    Finished => "finished",
    Cancelled => "cancelled",
});

status_enum!(RequestStatus {
    Searching => "searching",
    TravelerFound => "traveler_found",
    Cancelled => "cancelled",
});

status_enum!(ProposalStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

pub(crate) fn status_column<S>(row: &Row<'_>, idx: usize) -> rusqlite::Result<S>
where
    S: FromStr<Err = UnknownStatus>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// A traveler's announced trip ("voyage").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub id: String,
    pub owner_id: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    pub arrival_date: NaiveDate,
    pub available_weight: Decimal,
    pub price_per_kilo: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub currency: String,
    pub status: ItineraryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Itinerary {
    pub const COLUMNS: &'static str = "id, owner_id, departure_city, arrival_city, departure_date, \
         arrival_date, available_weight, price_per_kilo, commission, currency, status, \
         created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            departure_city: row.get(2)?,
            arrival_city: row.get(3)?,
            departure_date: date_column(row, 4)?,
            arrival_date: date_column(row, 5)?,
            available_weight: decimal_column(row, 6)?,
            price_per_kilo: opt_decimal_column(row, 7)?,
            commission: opt_decimal_column(row, 8)?,
            currency: row.get(9)?,
            status: status_column(row, 10)?,
            created_at: timestamp_column(row, 11)?,
            updated_at: timestamp_column(row, 12)?,
        })
    }

    pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM itineraries WHERE id = ?1", Self::COLUMNS),
            params![id],
            Self::from_row,
        )
        .optional()
    }
}

/// A client's ask to have baggage transported ("demande").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub id: String,
    pub owner_id: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub deadline: Option<NaiveDate>,
    pub estimated_weight: Decimal,
    pub price_per_kilo: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub currency: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransportRequest {
    pub const COLUMNS: &'static str = "id, owner_id, departure_city, arrival_city, deadline, \
         estimated_weight, price_per_kilo, commission, currency, status, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            departure_city: row.get(2)?,
            arrival_city: row.get(3)?,
            deadline: opt_date_column(row, 4)?,
            estimated_weight: decimal_column(row, 5)?,
            price_per_kilo: opt_decimal_column(row, 6)?,
            commission: opt_decimal_column(row, 7)?,
            currency: row.get(8)?,
            status: status_column(row, 9)?,
            created_at: timestamp_column(row, 10)?,
            updated_at: timestamp_column(row, 11)?,
        })
    }

    pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM requests WHERE id = ?1", Self::COLUMNS),
            params![id],
            Self::from_row,
        )
        .optional()
    }
}

/// A price offer linking one itinerary to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub itinerary_id: String,
    pub request_id: String,
    pub client_id: String,
    pub traveler_id: String,
    pub price_per_kilo: Decimal,
    pub commission: Decimal,
    pub currency: String,
    pub message: Option<String>,
    pub status: ProposalStatus,
    pub reject_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub const COLUMNS: &'static str = "id, itinerary_id, request_id, client_id, traveler_id, \
         price_per_kilo, commission, currency, message, status, reject_message, created_at, \
         updated_at, responded_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            itinerary_id: row.get(1)?,
            request_id: row.get(2)?,
            client_id: row.get(3)?,
            traveler_id: row.get(4)?,
            price_per_kilo: decimal_column(row, 5)?,
            commission: decimal_column(row, 6)?,
            currency: row.get(7)?,
            message: row.get(8)?,
            status: status_column(row, 9)?,
            reject_message: row.get(10)?,
            created_at: timestamp_column(row, 11)?,
            updated_at: timestamp_column(row, 12)?,
            responded_at: opt_timestamp_column(row, 13)?,
        })
    }

    pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM proposals WHERE id = ?1", Self::COLUMNS),
            params![id],
            Self::from_row,
        )
        .optional()
    }
}
