use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::currency::CurrencyConverter;
use crate::notifications::NotificationSink;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub currency: Arc<CurrencyConverter>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Wire the default SQLite-backed collaborators for a pool and config.
    pub fn new(db: DbPool, config: Config) -> Self {
        let currency = Arc::new(CurrencyConverter::from_config(&config.currency));
        let notifier = Arc::new(crate::notifications::SqliteNotificationSink::new(db.clone()));
        Self {
            db,
            config,
            currency,
            notifier,
        }
    }
}
