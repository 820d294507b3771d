pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod permissions;

pub use engine::{
    DeletionReview, NewContract, ProgressTarget, ProofSubmission, ReviewAction,
    SignatureSubmission, TermsUpdate, VerificationAction,
};
pub use error::{WorkflowError, WorkflowResult};
pub use events::{DomainEvent, DomainEventKind};
pub use lifecycle::{ContractState, SignatureParty};
pub use models::{
    Actor, Contract, ContractTerms, DeletionRequest, DeletionRequestStatus, PaymentMilestone,
    PaymentProof, PaymentTerms, Role, ServiceTerms, SignatureEvidence, SignatureSet,
    commission_amount, contract_number,
};
pub use notify::{NotificationDraft, NotificationKind, notifications_for};
pub use permissions::{Operation, authorize};
