use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{DomainEvent, DomainEventKind};
use crate::lifecycle::ContractState;
use crate::models::{Contract, Role};

/// Notification type tag; the UI keys icons and routing off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ContractCreated,
    TermsModified,
    SignatureRequired,
    ContractSigned,
    PaymentProofSubmitted,
    ContractActivated,
    CommissionConfirmed,
    PaymentProofRejected,
    DeletionRequested,
    DeletionApproved,
    DeletionRejected,
    ContractDeleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ContractCreated => "contract_created",
            NotificationKind::TermsModified => "terms_modified",
            NotificationKind::SignatureRequired => "signature_required",
            NotificationKind::ContractSigned => "contract_signed",
            NotificationKind::PaymentProofSubmitted => "payment_proof_submitted",
            NotificationKind::ContractActivated => "contract_activated",
            NotificationKind::CommissionConfirmed => "commission_confirmed",
            NotificationKind::PaymentProofRejected => "payment_proof_rejected",
            NotificationKind::DeletionRequested => "deletion_requested",
            NotificationKind::DeletionApproved => "deletion_approved",
            NotificationKind::DeletionRejected => "deletion_rejected",
            NotificationKind::ContractDeleted => "contract_deleted",
        }
    }
}

/// A notification ready to be inserted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
}

/// Fan-out rules: which users hear about a domain event, and how. Pure so
/// the delivery guarantees can be asserted without a store; the gateway
/// inserts the drafts in the same transaction as the primary mutation.
pub fn notifications_for(
    event: &DomainEvent,
    contract: &Contract,
    admin_ids: &[Uuid],
) -> Vec<NotificationDraft> {
    let number = &contract.contract_number;
    let link = format!("/contracts/{}", contract.id);
    let mut drafts = Vec::new();

    match event.kind {
        DomainEventKind::ContractCreated => {
            if event.actor_role == Role::Affiliate {
                for admin_id in admin_ids {
                    drafts.push(NotificationDraft {
                        user_id: *admin_id,
                        kind: NotificationKind::ContractCreated,
                        title: "New contract draft".to_string(),
                        message: format!("An affiliate drafted contract {number}."),
                        link: link.clone(),
                    });
                }
            }
        }
        DomainEventKind::TermsModified => {
            if event.actor_role == Role::Affiliate {
                for admin_id in admin_ids {
                    drafts.push(NotificationDraft {
                        user_id: *admin_id,
                        kind: NotificationKind::TermsModified,
                        title: "Contract terms updated".to_string(),
                        message: format!("The affiliate updated the terms of contract {number}."),
                        link: link.clone(),
                    });
                }
            }
        }
        DomainEventKind::SentForSignature => {
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::SignatureRequired,
                title: "Contract ready for signature".to_string(),
                message: format!("Contract {number} is ready for your review and signature."),
                link: link.clone(),
            });
        }
        DomainEventKind::SignatureSubmitted => {
            // Tell whichever party the handshake now waits on.
            if let ContractState::PendingSignature { awaiting } = contract.state {
                match awaiting {
                    crate::lifecycle::SignatureParty::Client => {
                        drafts.push(NotificationDraft {
                            user_id: contract.client_id,
                            kind: NotificationKind::SignatureRequired,
                            title: "Your signature is required".to_string(),
                            message: format!("Contract {number} is waiting for your signature."),
                            link: link.clone(),
                        });
                    }
                    crate::lifecycle::SignatureParty::Admin => {
                        for admin_id in admin_ids {
                            drafts.push(NotificationDraft {
                                user_id: *admin_id,
                                kind: NotificationKind::SignatureRequired,
                                title: "Counter-signature required".to_string(),
                                message: format!(
                                    "The client signed contract {number}; your signature is required."
                                ),
                                link: link.clone(),
                            });
                        }
                    }
                }
            }
        }
        DomainEventKind::ContractSigned => {
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::ContractSigned,
                title: "Contract fully signed".to_string(),
                message: format!(
                    "Both parties signed contract {number}. Please submit the deposit payment proof."
                ),
                link: link.clone(),
            });
            if let Some(affiliate_id) = contract.affiliate_id {
                drafts.push(NotificationDraft {
                    user_id: affiliate_id,
                    kind: NotificationKind::ContractSigned,
                    title: "Referred contract signed".to_string(),
                    message: format!("Contract {number} has been signed by both parties."),
                    link: link.clone(),
                });
            }
        }
        DomainEventKind::PaymentProofSubmitted => {
            for admin_id in admin_ids {
                drafts.push(NotificationDraft {
                    user_id: *admin_id,
                    kind: NotificationKind::PaymentProofSubmitted,
                    title: "Payment proof awaiting verification".to_string(),
                    message: format!("The client uploaded a payment proof for contract {number}."),
                    link: link.clone(),
                });
            }
        }
        DomainEventKind::PaymentApproved => {
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::ContractActivated,
                title: "Payment confirmed".to_string(),
                message: format!("Your payment was verified; contract {number} is now active."),
                link: link.clone(),
            });
            if let Some(affiliate_id) = contract.affiliate_id {
                if contract.commission_amount > rust_decimal::Decimal::ZERO {
                    drafts.push(NotificationDraft {
                        user_id: affiliate_id,
                        kind: NotificationKind::CommissionConfirmed,
                        title: "Commission confirmed".to_string(),
                        message: format!(
                            "Your commission of {} for contract {number} has been confirmed.",
                            contract.commission_amount
                        ),
                        link: link.clone(),
                    });
                }
            }
        }
        DomainEventKind::PaymentRejected => {
            let reason = event
                .detail
                .get("notes")
                .and_then(|value| value.as_str())
                .unwrap_or("see the contract for details");
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::PaymentProofRejected,
                title: "Payment proof rejected".to_string(),
                message: format!(
                    "Your payment proof for contract {number} was rejected: {reason}. Please upload a new proof."
                ),
                link: link.clone(),
            });
        }
        DomainEventKind::ContractCompleted | DomainEventKind::ContractCancelled => {
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::ContractSigned,
                title: "Contract status updated".to_string(),
                message: format!("Contract {number} is now {}.", contract.state.status()),
                link: link.clone(),
            });
        }
        DomainEventKind::DeletionRequested => {
            for admin_id in admin_ids {
                drafts.push(NotificationDraft {
                    user_id: *admin_id,
                    kind: NotificationKind::DeletionRequested,
                    title: "Contract deletion requested".to_string(),
                    message: format!("An affiliate asked to delete contract {number}."),
                    link: link.clone(),
                });
            }
        }
        DomainEventKind::DeletionApproved => {
            if let Some(affiliate_id) = contract.affiliate_id {
                drafts.push(NotificationDraft {
                    user_id: affiliate_id,
                    kind: NotificationKind::DeletionApproved,
                    title: "Deletion request approved".to_string(),
                    message: format!("Contract {number} has been deleted as requested."),
                    link: "/contracts".to_string(),
                });
            }
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::ContractDeleted,
                title: "Contract removed".to_string(),
                message: format!("Contract {number} has been removed."),
                link: "/contracts".to_string(),
            });
        }
        DomainEventKind::DeletionRejected => {
            if let Some(affiliate_id) = contract.affiliate_id {
                drafts.push(NotificationDraft {
                    user_id: affiliate_id,
                    kind: NotificationKind::DeletionRejected,
                    title: "Deletion request rejected".to_string(),
                    message: format!("Your request to delete contract {number} was rejected."),
                    link: link.clone(),
                });
            }
        }
        DomainEventKind::ContractDeleted => {
            if let Some(affiliate_id) = contract.affiliate_id {
                drafts.push(NotificationDraft {
                    user_id: affiliate_id,
                    kind: NotificationKind::ContractDeleted,
                    title: "Contract deleted".to_string(),
                    message: format!("Contract {number} was deleted by an administrator."),
                    link: "/contracts".to_string(),
                });
            }
            drafts.push(NotificationDraft {
                user_id: contract.client_id,
                kind: NotificationKind::ContractDeleted,
                title: "Contract removed".to_string(),
                message: format!("Contract {number} has been removed."),
                link: "/contracts".to_string(),
            });
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::engine::{
        NewContract, ProofSubmission, SignatureSubmission, TermsUpdate, VerificationAction,
        create_contract, delete_directly, request_deletion, review_deletion, send_for_signature,
        submit_payment_proof, submit_signature, update_terms, verify_payment_proof, ReviewAction,
    };
    use crate::models::{Actor, PaymentTerms, ServiceTerms};

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    fn verified_contract(affiliate_id: Option<Uuid>) -> (Contract, Vec<DomainEvent>) {
        let client_id = Uuid::new_v4();
        let creator = admin();
        let (mut contract, _) = create_contract(
            creator,
            NewContract {
                client_id,
                affiliate_id,
                service_type: "web_development".to_string(),
                package_name: "Business".to_string(),
                total_amount: Decimal::new(10_000, 0),
                deposit_amount: Decimal::new(5_000, 0),
                payment_method: None,
                service: ServiceTerms::default(),
                payment: PaymentTerms::default(),
                custom_terms: Vec::new(),
                commission_percentage: None,
            },
            "RW-2025-0010".to_string(),
            "token".to_string(),
            Decimal::new(1_000, 2),
            Utc::now(),
        )
        .unwrap();

        let now = Utc::now();
        send_for_signature(&mut contract, creator, now).unwrap();
        submit_signature(
            &mut contract,
            creator,
            SignatureSubmission {
                image_data: "sig".to_string(),
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
                image_data: "sig".to_string(),
                signer_name: "Client Co".to_string(),
                id_card_url: None,
            },
            now,
        )
        .unwrap();
        submit_payment_proof(
            &mut contract,
            Actor::new(client_id, Role::Client),
            ProofSubmission {
                url: "https://store/payment-proofs/proof.png".to_string(),
                payment_method: "bank_transfer".to_string(),
                notes: None,
            },
            now,
        )
        .unwrap();

        let events = verify_payment_proof(
            &mut contract,
            admin(),
            VerificationAction::Approve,
            None,
            now,
        )
        .unwrap();

        (contract, events)
    }

    #[test]
    fn approval_notifies_exactly_the_client_without_an_affiliate() {
        let (contract, events) = verified_contract(None);
        let admins = vec![Uuid::new_v4(), Uuid::new_v4()];

        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &admins))
            .collect();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].user_id, contract.client_id);
        assert_eq!(drafts[0].kind, NotificationKind::ContractActivated);
    }

    #[test]
    fn approval_also_notifies_the_affiliate_when_commission_is_due() {
        let affiliate_id = Uuid::new_v4();
        let (contract, events) = verified_contract(Some(affiliate_id));
        let admins = vec![Uuid::new_v4()];

        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &admins))
            .collect();

        assert_eq!(drafts.len(), 2);

        let activated: Vec<_> = drafts
            .iter()
            .filter(|draft| draft.kind == NotificationKind::ContractActivated)
            .collect();
        assert_eq!(activated.len(), 1);
        assert_eq!(activated[0].user_id, contract.client_id);

        let commission: Vec<_> = drafts
            .iter()
            .filter(|draft| draft.kind == NotificationKind::CommissionConfirmed)
            .collect();
        assert_eq!(commission.len(), 1);
        assert_eq!(commission[0].user_id, affiliate_id);
    }

    #[test]
    fn zero_commission_suppresses_the_affiliate_notification() {
        let affiliate_id = Uuid::new_v4();
        let (mut contract, events) = verified_contract(Some(affiliate_id));
        contract.commission_amount = Decimal::ZERO;

        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &[]))
            .collect();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, NotificationKind::ContractActivated);
    }

    #[test]
    fn affiliate_terms_edit_notifies_every_admin() {
        let affiliate_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let (mut contract, _) = create_contract(
            admin(),
            NewContract {
                client_id,
                affiliate_id: Some(affiliate_id),
                service_type: "web_development".to_string(),
                package_name: "Business".to_string(),
                total_amount: Decimal::new(10_000, 0),
                deposit_amount: Decimal::new(5_000, 0),
                payment_method: None,
                service: ServiceTerms::default(),
                payment: PaymentTerms::default(),
                custom_terms: Vec::new(),
                commission_percentage: None,
            },
            "RW-2025-0011".to_string(),
            "token".to_string(),
            Decimal::new(1_000, 2),
            Utc::now(),
        )
        .unwrap();

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

        assert_eq!(contract.remaining_amount, Decimal::new(7_000, 0));

        let admins = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &admins))
            .collect();

        assert_eq!(drafts.len(), admins.len());
        assert!(drafts.iter().all(|d| d.kind == NotificationKind::TermsModified));
        assert!(drafts.iter().all(|d| admins.contains(&d.user_id)));
    }

    #[test]
    fn admin_terms_edit_stays_silent() {
        let (mut contract, _) = verified_contract(None);
        contract.state = crate::lifecycle::ContractState::Draft;

        let events = update_terms(
            &mut contract,
            admin(),
            TermsUpdate {
                total_amount: Some(Decimal::new(11_000, 0)),
                ..TermsUpdate::default()
            },
            Utc::now(),
        )
        .unwrap();

        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &[Uuid::new_v4()]))
            .collect();
        assert!(drafts.is_empty());
    }

    #[test]
    fn direct_deletion_notifies_the_attached_affiliate() {
        let affiliate_id = Uuid::new_v4();
        let (contract, _) = verified_contract(Some(affiliate_id));

        let events = delete_directly(&contract, admin(), "duplicate", Utc::now()).unwrap();
        let drafts: Vec<_> = events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &[]))
            .collect();

        let affiliate_drafts: Vec<_> = drafts
            .iter()
            .filter(|draft| draft.user_id == affiliate_id)
            .collect();
        assert_eq!(affiliate_drafts.len(), 1);
        assert_eq!(affiliate_drafts[0].kind, NotificationKind::ContractDeleted);
    }

    #[test]
    fn deletion_review_outcomes_reach_the_affiliate() {
        let affiliate_id = Uuid::new_v4();
        let (contract, _) = verified_contract(Some(affiliate_id));
        let (mut request, request_events) = request_deletion(
            &contract,
            Actor::new(affiliate_id, Role::Affiliate),
            "client withdrew",
            Utc::now(),
        )
        .unwrap();

        let admins = vec![Uuid::new_v4()];
        let request_drafts: Vec<_> = request_events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &admins))
            .collect();
        assert_eq!(request_drafts.len(), 1);
        assert_eq!(request_drafts[0].kind, NotificationKind::DeletionRequested);
        assert_eq!(request_drafts[0].user_id, admins[0]);

        let (_, review_events) = review_deletion(
            &mut request,
            &contract,
            admin(),
            ReviewAction::Approve,
            None,
            Utc::now(),
        )
        .unwrap();
        let review_drafts: Vec<_> = review_events
            .iter()
            .flat_map(|event| notifications_for(event, &contract, &admins))
            .collect();

        assert!(
            review_drafts
                .iter()
                .any(|d| d.user_id == affiliate_id && d.kind == NotificationKind::DeletionApproved)
        );
    }
}
