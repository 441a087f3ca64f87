// Notifications - in-app messages raised by proposal events
// Rendered events go to the sink only after the producing transaction commits; delivery is best effort.
pub mod inbox;
pub mod render;
pub mod sink;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::Serialize;

use crate::db::timestamp_column;

pub use render::render;
pub use sink::{dispatch_events, NotificationSink, SqliteNotificationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProposalReceived,
    ProposalAccepted,
    ProposalRejected,
    ProposalCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalReceived => "proposal_received",
            Self::ProposalAccepted => "proposal_accepted",
            Self::ProposalRejected => "proposal_rejected",
            Self::ProposalCancelled => "proposal_cancelled",
        }
    }
}

/// A notification ready to be delivered to one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
}

/// A stored notification as shown in the inbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub const COLUMNS: &'static str = "id, kind, title, body, payload, is_read, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let payload: String = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            is_read: row.get(5)?,
            created_at: timestamp_column(row, 6)?,
        })
    }
}
