pub mod domain;
pub mod repository;
pub mod summary;

pub use domain::{
    CancelReason, NewProposal, ProposalAction, ProposalError, ProposalEvent, ProposalRef,
};
pub use repository::{
    cancel_pending, Committed, PendingScope, ProposalRepository, ProposalRole, RepositoryError,
    SqliteProposalRepository,
};
pub use summary::ProposalSummary;
