use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Actor, Role};

/// Everything a workflow operation can report having done. Events become
/// `contract_activities` rows and feed the notification fan-out; delivery
/// happens after the primary mutation commits, never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    ContractCreated,
    TermsModified,
    SentForSignature,
    SignatureSubmitted,
    ContractSigned,
    PaymentProofSubmitted,
    PaymentApproved,
    PaymentRejected,
    ContractCompleted,
    ContractCancelled,
    DeletionRequested,
    DeletionApproved,
    DeletionRejected,
    ContractDeleted,
}

impl DomainEventKind {
    /// `contract_activities.activity_type` column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventKind::ContractCreated => "contract_created",
            DomainEventKind::TermsModified => "terms_modified",
            DomainEventKind::SentForSignature => "sent_for_signature",
            DomainEventKind::SignatureSubmitted => "signature_submitted",
            DomainEventKind::ContractSigned => "contract_signed",
            DomainEventKind::PaymentProofSubmitted => "payment_proof_submitted",
            DomainEventKind::PaymentApproved => "payment_approved",
            DomainEventKind::PaymentRejected => "payment_rejected",
            DomainEventKind::ContractCompleted => "contract_completed",
            DomainEventKind::ContractCancelled => "contract_cancelled",
            DomainEventKind::DeletionRequested => "deletion_requested",
            DomainEventKind::DeletionApproved => "deletion_approved",
            DomainEventKind::DeletionRejected => "deletion_rejected",
            DomainEventKind::ContractDeleted => "contract_deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub kind: DomainEventKind,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        contract_id: Uuid,
        kind: DomainEventKind,
        actor: Actor,
        detail: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            kind,
            actor_id: actor.id,
            actor_role: actor.role,
            detail,
            occurred_at,
        }
    }
}
