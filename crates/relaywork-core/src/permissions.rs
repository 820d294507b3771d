use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Actor, Contract, Role};

/// Workflow operations gated by the permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateContract,
    ViewContract,
    UpdateTerms,
    SendForSignature,
    SubmitSignature,
    SubmitPaymentProof,
    VerifyPaymentProof,
    UpdateProgress,
    RequestDeletion,
    ReviewDeletion,
    DeleteContract,
    SendMessage,
}

/// What an operation requires of the caller, relative to the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    AdminOnly,
    AdminOrAffiliateRole,
    ContractClient,
    ContractAffiliate,
    AdminOrContractAffiliate,
    AdminOrContractClient,
    AdminOrContractParty,
}

const PERMISSIONS: &[(Operation, Requirement)] = &[
    (Operation::CreateContract, Requirement::AdminOrAffiliateRole),
    (Operation::ViewContract, Requirement::AdminOrContractParty),
    (Operation::UpdateTerms, Requirement::AdminOrContractAffiliate),
    (Operation::SendForSignature, Requirement::AdminOnly),
    (Operation::SubmitSignature, Requirement::AdminOrContractClient),
    (Operation::SubmitPaymentProof, Requirement::ContractClient),
    (Operation::VerifyPaymentProof, Requirement::AdminOnly),
    (Operation::UpdateProgress, Requirement::AdminOnly),
    (Operation::RequestDeletion, Requirement::ContractAffiliate),
    (Operation::ReviewDeletion, Requirement::AdminOnly),
    (Operation::DeleteContract, Requirement::AdminOnly),
    (Operation::SendMessage, Requirement::AdminOrContractParty),
];

/// Single authorization checkpoint for every workflow operation.
/// Operations without a subject contract (creation) pass `None`.
pub fn authorize(
    operation: Operation,
    actor: &Actor,
    contract: Option<&Contract>,
) -> WorkflowResult<()> {
    let requirement = PERMISSIONS
        .iter()
        .find(|(candidate, _)| *candidate == operation)
        .map(|(_, requirement)| *requirement)
        .ok_or(WorkflowError::Forbidden)?;

    let allowed = match requirement {
        Requirement::AdminOnly => actor.role == Role::Admin,
        Requirement::AdminOrAffiliateRole => {
            matches!(actor.role, Role::Admin | Role::Affiliate)
        }
        Requirement::ContractClient => {
            actor.role == Role::Client && subject(contract)?.is_client(actor.id)
        }
        Requirement::ContractAffiliate => {
            actor.role == Role::Affiliate && subject(contract)?.is_affiliate(actor.id)
        }
        Requirement::AdminOrContractAffiliate => {
            actor.role == Role::Admin
                || (actor.role == Role::Affiliate && subject(contract)?.is_affiliate(actor.id))
        }
        Requirement::AdminOrContractClient => {
            actor.role == Role::Admin
                || (actor.role == Role::Client && subject(contract)?.is_client(actor.id))
        }
        Requirement::AdminOrContractParty => {
            let contract = subject(contract)?;
            actor.role == Role::Admin
                || contract.is_client(actor.id)
                || contract.is_affiliate(actor.id)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden)
    }
}

fn subject<'a>(contract: Option<&'a Contract>) -> WorkflowResult<&'a Contract> {
    contract.ok_or(WorkflowError::NotFound("contract"))
}
