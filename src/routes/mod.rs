pub mod demandes;
pub mod notifications;
pub mod proposals;
pub mod settings;
pub mod users;
pub mod voyages;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::proposals::ProposalEvent;
use crate::state::AppState;

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(settings::router())
        .merge(voyages::router())
        .merge(demandes::router())
        .merge(proposals::router())
        .merge(notifications::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Hand committed events to the notifier. Never fails the request.
pub(crate) async fn notify(state: &AppState, events: Vec<ProposalEvent>) {
    if events.is_empty() {
        return;
    }
    crate::notifications::dispatch_events(state.notifier.as_ref(), events).await;
}
