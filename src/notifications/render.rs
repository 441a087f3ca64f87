// Pure event -> notification rendering
use serde_json::json;

use super::{NewNotification, NotificationKind};
use crate::proposals::{CancelReason, ProposalEvent, ProposalRef};

fn payload(p: &ProposalRef) -> serde_json::Value {
    json!({
        "proposalId": p.proposal_id,
        "itineraryId": p.itinerary_id,
        "requestId": p.request_id,
    })
}

/// Turn one proposal event into the notification its recipient should see.
///
/// Created goes to the traveler; accepted and rejected go to the client.
/// Auto-cancellations go to whoever did not cause them: the traveler when
/// the request was fulfilled or withdrawn, the client when the itinerary
/// was cancelled.
pub fn render(event: &ProposalEvent) -> NewNotification {
    let p = event.proposal();

    let (user_id, kind, title, body) = match event {
        ProposalEvent::Created(_) => (
            &p.traveler_id,
            NotificationKind::ProposalReceived,
            "New proposal".to_string(),
            "You received a new proposal for one of your trips.".to_string(),
        ),
        ProposalEvent::Accepted(_) => (
            &p.client_id,
            NotificationKind::ProposalAccepted,
            "Proposal accepted".to_string(),
            "The traveler accepted your proposal.".to_string(),
        ),
        ProposalEvent::Rejected { message, .. } => {
            let body = match message {
                Some(m) => format!("The traveler declined your proposal: {}", m),
                None => "The traveler declined your proposal.".to_string(),
            };
            (
                &p.client_id,
                NotificationKind::ProposalRejected,
                "Proposal declined".to_string(),
                body,
            )
        }
        ProposalEvent::AutoCancelled { reason, .. } => {
            let (recipient, body) = match reason {
                CancelReason::RequestFulfilled => (
                    &p.traveler_id,
                    "The client accepted another traveler for this request.",
                ),
                CancelReason::RequestWithdrawn => {
                    (&p.traveler_id, "The client withdrew this request.")
                }
                CancelReason::ItineraryCancelled => {
                    (&p.client_id, "The traveler cancelled this trip.")
                }
            };
            (
                recipient,
                NotificationKind::ProposalCancelled,
                "Proposal cancelled".to_string(),
                body.to_string(),
            )
        }
    };

    let mut payload = payload(p);
    if let ProposalEvent::AutoCancelled { reason, .. } = event {
        payload["reason"] = json!(reason);
    }

    NewNotification {
        user_id: user_id.clone(),
        kind,
        title,
        body,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> ProposalRef {
        ProposalRef {
            proposal_id: "p1".into(),
            itinerary_id: "i1".into(),
            request_id: "r1".into(),
            client_id: "client".into(),
            traveler_id: "traveler".into(),
        }
    }

    #[test]
    fn created_notifies_traveler() {
        let n = render(&ProposalEvent::Created(proposal()));
        assert_eq!(n.user_id, "traveler");
        assert_eq!(n.kind, NotificationKind::ProposalReceived);
        assert_eq!(n.payload["proposalId"], "p1");
        assert_eq!(n.payload["itineraryId"], "i1");
        assert_eq!(n.payload["requestId"], "r1");
    }

    #[test]
    fn answers_notify_client() {
        let accepted = render(&ProposalEvent::Accepted(proposal()));
        assert_eq!(accepted.user_id, "client");
        assert_eq!(accepted.kind, NotificationKind::ProposalAccepted);

        let rejected = render(&ProposalEvent::Rejected {
            proposal: proposal(),
            message: Some("Bag too large".into()),
        });
        assert_eq!(rejected.user_id, "client");
        assert_eq!(rejected.kind, NotificationKind::ProposalRejected);
        assert!(rejected.body.contains("Bag too large"));
    }

    #[test]
    fn auto_cancel_recipient_depends_on_reason() {
        let cancelled = |reason| {
            render(&ProposalEvent::AutoCancelled {
                proposal: proposal(),
                reason,
            })
        };

        let fulfilled = cancelled(CancelReason::RequestFulfilled);
        assert_eq!(fulfilled.user_id, "traveler");
        assert_eq!(fulfilled.kind, NotificationKind::ProposalCancelled);
        assert_eq!(fulfilled.payload["reason"], "request_fulfilled");

        assert_eq!(cancelled(CancelReason::RequestWithdrawn).user_id, "traveler");
        assert_eq!(cancelled(CancelReason::ItineraryCancelled).user_id, "client");
    }
}
