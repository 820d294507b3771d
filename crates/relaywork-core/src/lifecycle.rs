use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

/// Party expected to act during the dual-signature handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureParty {
    Admin,
    Client,
}

impl SignatureParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureParty::Admin => "admin",
            SignatureParty::Client => "client",
        }
    }

    pub fn counterpart(&self) -> SignatureParty {
        match self {
            SignatureParty::Admin => SignatureParty::Client,
            SignatureParty::Client => SignatureParty::Admin,
        }
    }
}

/// Single tagged-union state for a contract. The `status` and
/// `workflow_status` columns are the canonical encoding of this union, so
/// the two can never drift apart in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ContractState {
    Draft,
    PendingSignature { awaiting: SignatureParty },
    Signed,
    PendingVerification,
    PendingPaymentProof,
    Active,
    Completed,
    Cancelled,
}

impl ContractState {
    /// Top-level `status` column value.
    pub fn status(&self) -> &'static str {
        match self {
            ContractState::Draft => "draft",
            ContractState::PendingSignature { .. } => "pending_signature",
            ContractState::Signed => "signed",
            ContractState::PendingVerification => "pending_verification",
            ContractState::PendingPaymentProof => "pending_payment_proof",
            ContractState::Active => "active",
            ContractState::Completed => "completed",
            ContractState::Cancelled => "cancelled",
        }
    }

    /// `workflow_status` column value. Unset until the contract enters the
    /// signature phase; `completed` once both signatures are collected.
    pub fn workflow_status(&self) -> Option<&'static str> {
        match self {
            ContractState::Draft => None,
            ContractState::PendingSignature { awaiting } => Some(match awaiting {
                SignatureParty::Admin => "pending_admin_signature",
                SignatureParty::Client => "pending_client_signature",
            }),
            _ => Some("completed"),
        }
    }

    /// Rebuild the union from the persisted column pair. `status` is
    /// authoritative; a missing or stale `workflow_status` defaults the
    /// handshake to the admin side.
    pub fn decode(status: &str, workflow_status: Option<&str>) -> WorkflowResult<ContractState> {
        let state = match status {
            "draft" => ContractState::Draft,
            "pending_signature" => {
                let awaiting = match workflow_status {
                    Some("pending_client_signature") => SignatureParty::Client,
                    _ => SignatureParty::Admin,
                };
                ContractState::PendingSignature { awaiting }
            }
            "signed" => ContractState::Signed,
            "pending_verification" => ContractState::PendingVerification,
            "pending_payment_proof" => ContractState::PendingPaymentProof,
            "active" => ContractState::Active,
            "completed" => ContractState::Completed,
            "cancelled" => ContractState::Cancelled,
            other => {
                return Err(WorkflowError::validation(format!(
                    "unknown contract status: {other}"
                )));
            }
        };

        Ok(state)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractState::Completed | ContractState::Cancelled)
    }

    /// Terms stay editable only before any signature has legal weight.
    pub fn terms_editable(&self) -> bool {
        matches!(
            self,
            ContractState::Draft | ContractState::PendingSignature { .. }
        )
    }

    /// draft -> pending_signature, opening the handshake on the admin side.
    pub fn send_for_signature(self) -> WorkflowResult<ContractState> {
        match self {
            ContractState::Draft => Ok(ContractState::PendingSignature {
                awaiting: SignatureParty::Admin,
            }),
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    /// Record one party's signature. The handshake flips to the counterpart,
    /// or closes into `signed` once the other side has already signed.
    pub fn record_signature(
        self,
        party: SignatureParty,
        counterpart_signed: bool,
    ) -> WorkflowResult<ContractState> {
        match self {
            ContractState::PendingSignature { .. } => {
                if counterpart_signed {
                    Ok(ContractState::Signed)
                } else {
                    Ok(ContractState::PendingSignature {
                        awaiting: party.counterpart(),
                    })
                }
            }
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    /// Client submits (or re-submits) a payment proof.
    pub fn submit_payment_proof(self) -> WorkflowResult<ContractState> {
        match self {
            ContractState::Signed | ContractState::PendingPaymentProof => {
                Ok(ContractState::PendingVerification)
            }
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    pub fn approve_payment(self) -> WorkflowResult<ContractState> {
        match self {
            ContractState::PendingVerification => Ok(ContractState::Active),
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    /// A rejected proof always forces re-submission; it never stays active.
    pub fn reject_payment(self) -> WorkflowResult<ContractState> {
        match self {
            ContractState::PendingVerification => Ok(ContractState::PendingPaymentProof),
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    pub fn complete(self) -> WorkflowResult<ContractState> {
        match self {
            ContractState::Active => Ok(ContractState::Completed),
            other => Err(WorkflowError::invalid_state(other.status())),
        }
    }

    pub fn cancel(self) -> WorkflowResult<ContractState> {
        if self.is_terminal() {
            return Err(WorkflowError::invalid_state(self.status()));
        }

        Ok(ContractState::Cancelled)
    }
}
