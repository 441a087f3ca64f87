use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

use super::{render, NewNotification};
use crate::db::fmt_timestamp;
use crate::proposals::ProposalEvent;
use crate::state::DbPool;

/// Destination for rendered notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> anyhow::Result<()>;
}

/// Stores notifications in the recipient's inbox table.
pub struct SqliteNotificationSink {
    pool: DbPool,
}

impl SqliteNotificationSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for SqliteNotificationSink {
    async fn notify(&self, notification: NewNotification) -> anyhow::Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, kind, title, body, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::now_v7().to_string(),
                notification.user_id,
                notification.kind.as_str(),
                notification.title,
                notification.body,
                serde_json::to_string(&notification.payload)?,
                fmt_timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

/// Deliver every event, in order. Failures are logged and dropped.
pub async fn dispatch_events(sink: &dyn NotificationSink, events: Vec<ProposalEvent>) {
    for event in events {
        let notification = render(&event);
        let kind = notification.kind;
        let recipient = notification.user_id.clone();

        if let Err(e) = sink.notify(notification).await {
            tracing::warn!(
                "Failed to deliver {} notification to {} for proposal {}: {}",
                kind.as_str(),
                recipient,
                event.proposal().proposal_id,
                e
            );
        }
    }
}
