use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{DomainEvent, DomainEventKind};
use crate::lifecycle::{ContractState, SignatureParty};
use crate::models::{
    Actor, Contract, ContractTerms, DeletionRequest, DeletionRequestStatus, PaymentProof,
    PaymentTerms, Role, ServiceTerms, SignatureEvidence, SignatureSet, commission_amount,
};
use crate::permissions::{Operation, authorize};

/// Inputs for contract creation. The gateway supplies identity material
/// (number, link token) since both come from the store.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub client_id: Uuid,
    pub affiliate_id: Option<Uuid>,
    pub service_type: String,
    pub package_name: String,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub payment_method: Option<String>,
    pub service: ServiceTerms,
    pub payment: PaymentTerms,
    pub custom_terms: Vec<String>,
    pub commission_percentage: Option<Decimal>,
}

/// Partial terms edit; absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct TermsUpdate {
    pub service_type: Option<String>,
    pub package_name: Option<String>,
    pub total_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub service: Option<ServiceTerms>,
    pub payment: Option<PaymentTerms>,
    pub custom_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SignatureSubmission {
    pub image_data: String,
    pub signer_name: String,
    pub id_card_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProofSubmission {
    pub url: String,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTarget {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Outcome of a deletion-request review; the gateway removes the contract
/// row only when `remove_contract` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionReview {
    pub remove_contract: bool,
}

pub fn create_contract(
    actor: Actor,
    input: NewContract,
    contract_number: String,
    link_token: String,
    default_commission_rate: Decimal,
    now: DateTime<Utc>,
) -> WorkflowResult<(Contract, Vec<DomainEvent>)> {
    authorize(Operation::CreateContract, &actor, None)?;
    validate_amounts(input.total_amount, input.deposit_amount)?;

    // An affiliate always creates contracts under their own attribution.
    let affiliate_id = match actor.role {
        Role::Affiliate => Some(actor.id),
        _ => input.affiliate_id,
    };

    let commission_percentage = input
        .commission_percentage
        .unwrap_or(default_commission_rate);
    if commission_percentage < Decimal::ZERO {
        return Err(WorkflowError::validation(
            "commission percentage must be non-negative",
        ));
    }

    let commission = if affiliate_id.is_some() {
        commission_amount(input.total_amount, commission_percentage)
    } else {
        Decimal::ZERO
    };

    let contract = Contract {
        id: Uuid::new_v4(),
        contract_number,
        link_token,
        client_id: input.client_id,
        affiliate_id,
        service_type: input.service_type,
        package_name: input.package_name,
        total_amount: input.total_amount,
        deposit_amount: input.deposit_amount,
        remaining_amount: input.total_amount - input.deposit_amount,
        payment_method: input.payment_method,
        commission_percentage,
        commission_amount: commission,
        terms: ContractTerms {
            service: input.service,
            payment: input.payment,
            custom_terms: input.custom_terms,
            last_modified_by: Some(actor.id),
            last_modified_at: Some(now),
            modified_by_role: Some(actor.role),
        },
        state: ContractState::Draft,
        signatures: SignatureSet::default(),
        payment_proof: PaymentProof::default(),
        created_at: now,
        updated_at: now,
    };

    let event = DomainEvent::new(
        contract.id,
        DomainEventKind::ContractCreated,
        actor,
        json!({
            "contract_number": contract.contract_number,
            "total_amount": contract.total_amount,
        }),
        now,
    );

    Ok((contract, vec![event]))
}

pub fn update_terms(
    contract: &mut Contract,
    actor: Actor,
    update: TermsUpdate,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::UpdateTerms, &actor, Some(contract))?;

    if !contract.state.terms_editable() {
        return Err(WorkflowError::invalid_state(contract.state.status()));
    }

    let total = update.total_amount.unwrap_or(contract.total_amount);
    let deposit = update.deposit_amount.unwrap_or(contract.deposit_amount);
    validate_amounts(total, deposit)?;

    if let Some(service_type) = update.service_type {
        contract.service_type = service_type;
    }
    if let Some(package_name) = update.package_name {
        contract.package_name = package_name;
    }
    if let Some(payment_method) = update.payment_method {
        contract.payment_method = Some(payment_method);
    }
    if let Some(service) = update.service {
        contract.terms.service = service;
    }
    if let Some(payment) = update.payment {
        contract.terms.payment = payment;
    }
    if let Some(custom_terms) = update.custom_terms {
        contract.terms.custom_terms = custom_terms;
    }

    contract.total_amount = total;
    contract.deposit_amount = deposit;
    contract.remaining_amount = total - deposit;
    if contract.affiliate_id.is_some() {
        contract.commission_amount = commission_amount(total, contract.commission_percentage);
    }

    contract.terms.last_modified_by = Some(actor.id);
    contract.terms.last_modified_at = Some(now);
    contract.terms.modified_by_role = Some(actor.role);
    contract.updated_at = now;

    Ok(vec![DomainEvent::new(
        contract.id,
        DomainEventKind::TermsModified,
        actor,
        json!({
            "total_amount": contract.total_amount,
            "deposit_amount": contract.deposit_amount,
            "remaining_amount": contract.remaining_amount,
        }),
        now,
    )])
}

pub fn send_for_signature(
    contract: &mut Contract,
    actor: Actor,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::SendForSignature, &actor, Some(contract))?;

    contract.state = contract.state.send_for_signature()?;
    contract.updated_at = now;

    Ok(vec![DomainEvent::new(
        contract.id,
        DomainEventKind::SentForSignature,
        actor,
        json!({ "workflow_status": contract.state.workflow_status() }),
        now,
    )])
}

pub fn submit_signature(
    contract: &mut Contract,
    actor: Actor,
    submission: SignatureSubmission,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::SubmitSignature, &actor, Some(contract))?;

    let party = match actor.role {
        Role::Admin => SignatureParty::Admin,
        Role::Client => SignatureParty::Client,
        Role::Affiliate => return Err(WorkflowError::Forbidden),
    };

    if submission.image_data.trim().is_empty() {
        return Err(WorkflowError::validation("signature image is required"));
    }
    if submission.signer_name.trim().is_empty() {
        return Err(WorkflowError::validation("signer name is required"));
    }

    let (own, counterpart_signed) = match party {
        SignatureParty::Admin => (&contract.signatures.admin, contract.signatures.client.is_some()),
        SignatureParty::Client => (&contract.signatures.client, contract.signatures.admin.is_some()),
    };
    if own.is_some() {
        return Err(WorkflowError::AlreadySigned(party.as_str()));
    }

    contract.state = contract.state.record_signature(party, counterpart_signed)?;

    let evidence = SignatureEvidence {
        image_data: submission.image_data,
        signer_name: submission.signer_name.trim().to_string(),
        id_card_url: submission.id_card_url,
        signed_at: now,
    };
    match party {
        SignatureParty::Admin => contract.signatures.admin = Some(evidence),
        SignatureParty::Client => contract.signatures.client = Some(evidence),
    }
    contract.updated_at = now;

    let mut events = vec![DomainEvent::new(
        contract.id,
        DomainEventKind::SignatureSubmitted,
        actor,
        json!({
            "party": party.as_str(),
            "workflow_status": contract.state.workflow_status(),
        }),
        now,
    )];

    if contract.state == ContractState::Signed {
        events.push(DomainEvent::new(
            contract.id,
            DomainEventKind::ContractSigned,
            actor,
            json!({ "contract_number": contract.contract_number }),
            now,
        ));
    }

    Ok(events)
}

pub fn submit_payment_proof(
    contract: &mut Contract,
    actor: Actor,
    proof: ProofSubmission,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::SubmitPaymentProof, &actor, Some(contract))?;

    if proof.url.trim().is_empty() {
        return Err(WorkflowError::validation("payment proof file is required"));
    }

    contract.state = contract.state.submit_payment_proof()?;
    contract.payment_proof = PaymentProof {
        url: Some(proof.url.clone()),
        verified: None,
        verified_by: None,
        verified_at: None,
        rejection_notes: None,
    };
    contract.payment_method = Some(proof.payment_method.clone());
    contract.updated_at = now;

    Ok(vec![DomainEvent::new(
        contract.id,
        DomainEventKind::PaymentProofSubmitted,
        actor,
        json!({
            "proof_url": proof.url,
            "payment_method": proof.payment_method,
            "notes": proof.notes,
        }),
        now,
    )])
}

pub fn verify_payment_proof(
    contract: &mut Contract,
    actor: Actor,
    action: VerificationAction,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::VerifyPaymentProof, &actor, Some(contract))?;

    match action {
        VerificationAction::Approve => {
            contract.state = contract.state.approve_payment()?;
            contract.payment_proof.verified = Some(true);
            contract.payment_proof.verified_by = Some(actor.id);
            contract.payment_proof.verified_at = Some(now);
            contract.payment_proof.rejection_notes = None;
            contract.updated_at = now;

            Ok(vec![DomainEvent::new(
                contract.id,
                DomainEventKind::PaymentApproved,
                actor,
                json!({ "commission_amount": contract.commission_amount }),
                now,
            )])
        }
        VerificationAction::Reject => {
            let notes = notes.as_deref().map(str::trim).unwrap_or_default();
            if notes.is_empty() {
                return Err(WorkflowError::validation(
                    "rejection notes are required when rejecting a payment proof",
                ));
            }

            contract.state = contract.state.reject_payment()?;
            contract.payment_proof.url = None;
            contract.payment_proof.verified = Some(false);
            contract.payment_proof.verified_by = Some(actor.id);
            contract.payment_proof.verified_at = Some(now);
            contract.payment_proof.rejection_notes = Some(notes.to_string());
            contract.updated_at = now;

            Ok(vec![DomainEvent::new(
                contract.id,
                DomainEventKind::PaymentRejected,
                actor,
                json!({ "notes": notes }),
                now,
            )])
        }
    }
}

pub fn update_progress(
    contract: &mut Contract,
    actor: Actor,
    target: ProgressTarget,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::UpdateProgress, &actor, Some(contract))?;

    let (state, kind) = match target {
        ProgressTarget::Completed => (contract.state.complete()?, DomainEventKind::ContractCompleted),
        ProgressTarget::Cancelled => (contract.state.cancel()?, DomainEventKind::ContractCancelled),
    };
    contract.state = state;
    contract.updated_at = now;

    Ok(vec![DomainEvent::new(
        contract.id,
        kind,
        actor,
        json!({ "status": contract.state.status() }),
        now,
    )])
}

pub fn request_deletion(
    contract: &Contract,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> WorkflowResult<(DeletionRequest, Vec<DomainEvent>)> {
    authorize(Operation::RequestDeletion, &actor, Some(contract))?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::validation("a deletion reason is required"));
    }

    let request = DeletionRequest {
        id: Uuid::new_v4(),
        contract_id: contract.id,
        affiliate_id: actor.id,
        reason: reason.to_string(),
        status: DeletionRequestStatus::Pending,
        reviewed_by: None,
        reviewed_at: None,
        review_notes: None,
        created_at: now,
    };

    let event = DomainEvent::new(
        contract.id,
        DomainEventKind::DeletionRequested,
        actor,
        json!({ "request_id": request.id, "reason": reason }),
        now,
    );

    Ok((request, vec![event]))
}

pub fn review_deletion(
    request: &mut DeletionRequest,
    contract: &Contract,
    actor: Actor,
    action: ReviewAction,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> WorkflowResult<(DeletionReview, Vec<DomainEvent>)> {
    authorize(Operation::ReviewDeletion, &actor, Some(contract))?;

    if request.status != DeletionRequestStatus::Pending {
        return Err(WorkflowError::invalid_state(request.status.as_str()));
    }

    let notes = notes
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let (status, kind, remove_contract) = match action {
        ReviewAction::Approve => (
            DeletionRequestStatus::Approved,
            DomainEventKind::DeletionApproved,
            true,
        ),
        ReviewAction::Reject => (
            DeletionRequestStatus::Rejected,
            DomainEventKind::DeletionRejected,
            false,
        ),
    };

    request.status = status;
    request.reviewed_by = Some(actor.id);
    request.reviewed_at = Some(now);
    request.review_notes = notes.clone();

    let event = DomainEvent::new(
        request.contract_id,
        kind,
        actor,
        json!({ "request_id": request.id, "notes": notes }),
        now,
    );

    Ok((DeletionReview { remove_contract }, vec![event]))
}

pub fn delete_directly(
    contract: &Contract,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> WorkflowResult<Vec<DomainEvent>> {
    authorize(Operation::DeleteContract, &actor, Some(contract))?;

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::validation("a deletion reason is required"));
    }

    Ok(vec![DomainEvent::new(
        contract.id,
        DomainEventKind::ContractDeleted,
        actor,
        json!({ "reason": reason }),
        now,
    )])
}

fn validate_amounts(total: Decimal, deposit: Decimal) -> WorkflowResult<()> {
    if total <= Decimal::ZERO {
        return Err(WorkflowError::validation("total amount must be positive"));
    }
    if deposit < Decimal::ZERO {
        return Err(WorkflowError::validation(
            "deposit amount must be non-negative",
        ));
    }
    if deposit > total {
        return Err(WorkflowError::validation(
            "deposit amount cannot exceed the total amount",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn new_contract_input(client_id: Uuid) -> NewContract {
        NewContract {
            client_id,
            affiliate_id: None,
            service_type: "web_development".to_string(),
            package_name: "Business".to_string(),
            total_amount: Decimal::new(10_000, 0),
            deposit_amount: Decimal::new(5_000, 0),
            payment_method: Some("bank_transfer".to_string()),
            service: ServiceTerms::default(),
            payment: PaymentTerms::default(),
            custom_terms: Vec::new(),
            commission_percentage: None,
        }
    }

    fn default_rate() -> Decimal {
        Decimal::new(1_000, 2) // 10.00
    }

    fn draft_contract(client_id: Uuid, affiliate_id: Option<Uuid>) -> Contract {
        let mut input = new_contract_input(client_id);
        input.affiliate_id = affiliate_id;
        let (contract, _) = create_contract(
            admin(),
            input,
            "RW-2025-0001".to_string(),
            "token".to_string(),
            default_rate(),
            Utc::now(),
        )
        .unwrap();
        contract
    }

    fn signed_contract(client_id: Uuid, affiliate_id: Option<Uuid>) -> Contract {
        let mut contract = draft_contract(client_id, affiliate_id);
        let now = Utc::now();
        send_for_signature(&mut contract, admin(), now).unwrap();
        submit_signature(
            &mut contract,
            admin(),
            SignatureSubmission {
                image_data: "data:image/png;base64,Zm9v".to_string(),
                signer_name: "Relay Admin".to_string(),
                id_card_url: None,
            },
            now,
        )
        .unwrap();
        submit_signature(
            &mut contract,
            Actor::new(client_id, Role::Client),
            SignatureSubmission {
                image_data: "data:image/png;base64,YmFy".to_string(),
                signer_name: "Client Co".to_string(),
                id_card_url: None,
            },
            now,
        )
        .unwrap();
        contract
    }

    fn proof_pending_contract(client_id: Uuid, affiliate_id: Option<Uuid>) -> Contract {
        let mut contract = signed_contract(client_id, affiliate_id);
        submit_payment_proof(
            &mut contract,
            Actor::new(client_id, Role::Client),
            ProofSubmission {
                url: "https://store/payment-proofs/x/proof-1.png".to_string(),
                payment_method: "bank_transfer".to_string(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        contract
    }

    #[test]
    fn creation_computes_remaining_from_total_and_deposit() {
        let contract = draft_contract(Uuid::new_v4(), None);
        assert_eq!(contract.remaining_amount, Decimal::new(5_000, 0));
        assert_eq!(
            contract.total_amount,
            contract.deposit_amount + contract.remaining_amount
        );
        assert_eq!(contract.state, ContractState::Draft);
        assert_eq!(contract.commission_amount, Decimal::ZERO);
    }

    #[test]
    fn affiliate_creation_attributes_itself_and_prices_commission() {
        let affiliate = Actor::new(Uuid::new_v4(), Role::Affiliate);
        let (contract, events) = create_contract(
            affiliate,
            new_contract_input(Uuid::new_v4()),
            "RW-2025-0002".to_string(),
            "token".to_string(),
            default_rate(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(contract.affiliate_id, Some(affiliate.id));
        assert_eq!(contract.commission_percentage, default_rate());
        assert_eq!(contract.commission_amount, Decimal::new(1_000, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DomainEventKind::ContractCreated);
    }

    #[test]
    fn clients_cannot_create_contracts() {
        let client = Actor::new(Uuid::new_v4(), Role::Client);
        let err = create_contract(
            client,
            new_contract_input(client.id),
            "RW-2025-0003".to_string(),
            "token".to_string(),
            default_rate(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Forbidden);
    }

    #[test]
    fn terms_update_keeps_the_amount_invariant() {
        let affiliate_id = Uuid::new_v4();
        let mut contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));

        let events = update_terms(
            &mut contract,
            Actor::new(affiliate_id, Role::Affiliate),
            TermsUpdate {
                total_amount: Some(Decimal::new(12_000, 0)),
                ..TermsUpdate::default()
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(contract.total_amount, Decimal::new(12_000, 0));
        assert_eq!(contract.deposit_amount, Decimal::new(5_000, 0));
        assert_eq!(contract.remaining_amount, Decimal::new(7_000, 0));
        assert_eq!(
            contract.total_amount,
            contract.deposit_amount + contract.remaining_amount
        );
        // commission follows the new total at the stored rate
        assert_eq!(contract.commission_amount, Decimal::new(1_200, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DomainEventKind::TermsModified);
    }

    #[test]
    fn terms_update_stamps_the_audit_fields() {
        let mut contract = draft_contract(Uuid::new_v4(), None);
        let editor = admin();
        let now = Utc::now();

        update_terms(
            &mut contract,
            editor,
            TermsUpdate {
                package_name: Some("Enterprise".to_string()),
                ..TermsUpdate::default()
            },
            now,
        )
        .unwrap();

        assert_eq!(contract.package_name, "Enterprise");
        assert_eq!(contract.terms.last_modified_by, Some(editor.id));
        assert_eq!(contract.terms.last_modified_at, Some(now));
        assert_eq!(contract.terms.modified_by_role, Some(Role::Admin));
    }

    #[test]
    fn terms_update_rejects_every_non_editable_status() {
        let client_id = Uuid::new_v4();
        let locked = [
            ContractState::Signed,
            ContractState::PendingVerification,
            ContractState::PendingPaymentProof,
            ContractState::Active,
            ContractState::Completed,
            ContractState::Cancelled,
        ];

        for state in locked {
            let mut contract = draft_contract(client_id, None);
            contract.state = state;

            let err = update_terms(
                &mut contract,
                admin(),
                TermsUpdate {
                    total_amount: Some(Decimal::new(12_000, 0)),
                    ..TermsUpdate::default()
                },
                Utc::now(),
            )
            .unwrap_err();
            assert_eq!(err, WorkflowError::InvalidState(state.status().to_string()));
        }
    }

    #[test]
    fn terms_update_rejects_deposit_above_total() {
        let mut contract = draft_contract(Uuid::new_v4(), None);
        let err = update_terms(
            &mut contract,
            admin(),
            TermsUpdate {
                deposit_amount: Some(Decimal::new(20_000, 0)),
                ..TermsUpdate::default()
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn duplicate_signature_is_rejected() {
        let client_id = Uuid::new_v4();
        let mut contract = draft_contract(client_id, None);
        let now = Utc::now();
        send_for_signature(&mut contract, admin(), now).unwrap();

        let submission = SignatureSubmission {
            image_data: "data:image/png;base64,Zm9v".to_string(),
            signer_name: "Relay Admin".to_string(),
            id_card_url: None,
        };
        submit_signature(&mut contract, admin(), submission.clone(), now).unwrap();

        let err = submit_signature(&mut contract, admin(), submission, now).unwrap_err();
        assert_eq!(err, WorkflowError::AlreadySigned("admin"));
    }

    #[test]
    fn both_signatures_close_the_handshake() {
        let client_id = Uuid::new_v4();
        let contract = signed_contract(client_id, None);
        assert_eq!(contract.state, ContractState::Signed);
        assert!(contract.signatures.admin.is_some());
        assert!(contract.signatures.client.is_some());
    }

    #[test]
    fn payment_proof_is_rejected_for_non_owners() {
        let client_id = Uuid::new_v4();
        let mut contract = signed_contract(client_id, None);

        let err = submit_payment_proof(
            &mut contract,
            Actor::new(Uuid::new_v4(), Role::Client),
            ProofSubmission {
                url: "https://store/payment-proofs/x/proof-1.png".to_string(),
                payment_method: "bank_transfer".to_string(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Forbidden);
    }

    #[test]
    fn payment_proof_moves_the_contract_into_verification() {
        let client_id = Uuid::new_v4();
        let contract = proof_pending_contract(client_id, None);
        assert_eq!(contract.state, ContractState::PendingVerification);
        assert!(contract.payment_proof.url.is_some());
        assert_eq!(contract.payment_proof.verified, None);
    }

    #[test]
    fn approval_activates_the_contract() {
        let client_id = Uuid::new_v4();
        let mut contract = proof_pending_contract(client_id, None);
        let verifier = admin();

        let events = verify_payment_proof(
            &mut contract,
            verifier,
            VerificationAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(contract.state, ContractState::Active);
        assert_eq!(contract.payment_proof.verified, Some(true));
        assert_eq!(contract.payment_proof.verified_by, Some(verifier.id));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, DomainEventKind::PaymentApproved);
    }

    #[test]
    fn rejection_without_notes_is_a_validation_error() {
        let client_id = Uuid::new_v4();
        let mut contract = proof_pending_contract(client_id, None);

        for notes in [None, Some("".to_string()), Some("   ".to_string())] {
            let err = verify_payment_proof(
                &mut contract,
                admin(),
                VerificationAction::Reject,
                notes,
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)));
        }
        // the failed attempts left the contract untouched
        assert_eq!(contract.state, ContractState::PendingVerification);
        assert!(contract.payment_proof.url.is_some());
    }

    #[test]
    fn rejection_clears_the_proof_and_forces_resubmission() {
        let client_id = Uuid::new_v4();
        let mut contract = proof_pending_contract(client_id, None);

        let events = verify_payment_proof(
            &mut contract,
            admin(),
            VerificationAction::Reject,
            Some("amount does not match the deposit".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(contract.state, ContractState::PendingPaymentProof);
        assert_eq!(contract.payment_proof.url, None);
        assert_eq!(contract.payment_proof.verified, Some(false));
        assert_eq!(
            contract.payment_proof.rejection_notes.as_deref(),
            Some("amount does not match the deposit")
        );
        assert_eq!(events[0].kind, DomainEventKind::PaymentRejected);

        // the client can submit a fresh proof afterwards
        let resubmitted = submit_payment_proof(
            &mut contract,
            Actor::new(client_id, Role::Client),
            ProofSubmission {
                url: "https://store/payment-proofs/x/proof-2.png".to_string(),
                payment_method: "bank_transfer".to_string(),
                notes: Some("corrected transfer".to_string()),
            },
            Utc::now(),
        );
        assert!(resubmitted.is_ok());
        assert_eq!(contract.state, ContractState::PendingVerification);
    }

    #[test]
    fn only_admins_verify_payment_proofs() {
        let client_id = Uuid::new_v4();
        let mut contract = proof_pending_contract(client_id, None);

        let err = verify_payment_proof(
            &mut contract,
            Actor::new(client_id, Role::Client),
            VerificationAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Forbidden);
    }

    #[test]
    fn deletion_request_leaves_the_contract_in_place() {
        let affiliate_id = Uuid::new_v4();
        let contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));

        let (request, events) = request_deletion(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "client withdrew",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(request.status, DeletionRequestStatus::Pending);
        assert_eq!(request.contract_id, contract.id);
        assert_eq!(request.affiliate_id, affiliate_id);
        assert_eq!(events[0].kind, DomainEventKind::DeletionRequested);
    }

    #[test]
    fn approval_of_a_deletion_request_removes_the_contract() {
        let affiliate_id = Uuid::new_v4();
        let contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));
        let (mut request, _) = request_deletion(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "client withdrew",
            Utc::now(),
        )
        .unwrap();

        let (review, events) = review_deletion(
            &mut request,
            &contract,
            admin(),
            ReviewAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap();

        assert!(review.remove_contract);
        assert_eq!(request.status, DeletionRequestStatus::Approved);
        assert_eq!(events[0].kind, DomainEventKind::DeletionApproved);
    }

    #[test]
    fn rejection_of_a_deletion_request_keeps_the_contract() {
        let affiliate_id = Uuid::new_v4();
        let contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));
        let (mut request, _) = request_deletion(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "client withdrew",
            Utc::now(),
        )
        .unwrap();

        let (review, events) = review_deletion(
            &mut request,
            &contract,
            admin(),
            ReviewAction::Reject,
            Some("contract already signed".to_string()),
            Utc::now(),
        )
        .unwrap();

        assert!(!review.remove_contract);
        assert_eq!(request.status, DeletionRequestStatus::Rejected);
        assert_eq!(
            request.review_notes.as_deref(),
            Some("contract already signed")
        );
        assert_eq!(events[0].kind, DomainEventKind::DeletionRejected);
    }

    #[test]
    fn a_decided_deletion_request_cannot_be_reviewed_again() {
        let affiliate_id = Uuid::new_v4();
        let contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));
        let (mut request, _) = request_deletion(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "duplicate entry",
            Utc::now(),
        )
        .unwrap();

        review_deletion(
            &mut request,
            &contract,
            admin(),
            ReviewAction::Reject,
            Some("keep it".to_string()),
            Utc::now(),
        )
        .unwrap();

        let err = review_deletion(
            &mut request,
            &contract,
            admin(),
            ReviewAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::InvalidState("rejected".to_string()));
    }

    #[test]
    fn direct_deletion_requires_a_reason() {
        let contract = draft_contract(Uuid::new_v4(), None);
        let err = delete_directly(&contract, admin(), "  ", Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let events = delete_directly(&contract, admin(), "duplicate", Utc::now()).unwrap();
        assert_eq!(events[0].kind, DomainEventKind::ContractDeleted);
    }

    #[test]
    fn affiliates_cannot_delete_directly() {
        let affiliate_id = Uuid::new_v4();
        let contract = draft_contract(Uuid::new_v4(), Some(affiliate_id));
        let err = delete_directly(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "duplicate",
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, WorkflowError::Forbidden);
    }

    #[test]
    fn progress_moves_active_contracts_to_completed() {
        let client_id = Uuid::new_v4();
        let mut contract = proof_pending_contract(client_id, None);
        verify_payment_proof(
            &mut contract,
            admin(),
            VerificationAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap();

        let events =
            update_progress(&mut contract, admin(), ProgressTarget::Completed, Utc::now()).unwrap();
        assert_eq!(contract.state, ContractState::Completed);
        assert_eq!(events[0].kind, DomainEventKind::ContractCompleted);

        let err = update_progress(&mut contract, admin(), ProgressTarget::Cancelled, Utc::now())
            .unwrap_err();
        assert_eq!(err, WorkflowError::InvalidState("completed".to_string()));
    }
}
