use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::lifecycle::ContractState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Client,
    Affiliate,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Affiliate => "affiliate",
        }
    }

    pub fn parse(value: &str) -> WorkflowResult<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            "affiliate" => Ok(Role::Affiliate),
            other => Err(WorkflowError::validation(format!("unknown role: {other}"))),
        }
    }
}

/// Authenticated caller identity passed into every workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTerms {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMilestone {
    pub label: String,
    pub amount: Decimal,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentTerms {
    #[serde(default)]
    pub schedule: Vec<PaymentMilestone>,
}

/// Structured terms blob persisted as jsonb on the contract row, including
/// the audit stamp of the last edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    #[serde(default)]
    pub service: ServiceTerms,
    #[serde(default)]
    pub payment: PaymentTerms,
    #[serde(default)]
    pub custom_terms: Vec<String>,
    #[serde(default)]
    pub last_modified_by: Option<Uuid>,
    #[serde(default)]
    pub last_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by_role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEvidence {
    pub image_data: String,
    pub signer_name: String,
    #[serde(default)]
    pub id_card_url: Option<String>,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureSet {
    #[serde(default)]
    pub admin: Option<SignatureEvidence>,
    #[serde(default)]
    pub client: Option<SignatureEvidence>,
}

/// Payment-proof evidence. `ContractState` is authoritative for the payment
/// sub-cycle; `verified` is a derived convenience flag written alongside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentProof {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub verified_by: Option<Uuid>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_notes: Option<String>,
}

/// Contract aggregate as the workflow engine sees it. The gateway hydrates
/// this from the row, runs one operation, and persists the changed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub contract_number: String,
    pub link_token: String,
    pub client_id: Uuid,
    pub affiliate_id: Option<Uuid>,
    pub service_type: String,
    pub package_name: String,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub payment_method: Option<String>,
    pub commission_percentage: Decimal,
    pub commission_amount: Decimal,
    pub terms: ContractTerms,
    pub state: ContractState,
    pub signatures: SignatureSet,
    pub payment_proof: PaymentProof,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_client(&self, actor_id: Uuid) -> bool {
        self.client_id == actor_id
    }

    pub fn is_affiliate(&self, actor_id: Uuid) -> bool {
        self.affiliate_id == Some(actor_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeletionRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionRequestStatus::Pending => "pending",
            DeletionRequestStatus::Approved => "approved",
            DeletionRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> WorkflowResult<DeletionRequestStatus> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(DeletionRequestStatus::Pending),
            "approved" => Ok(DeletionRequestStatus::Approved),
            "rejected" => Ok(DeletionRequestStatus::Rejected),
            other => Err(WorkflowError::validation(format!(
                "unknown deletion request status: {other}"
            ))),
        }
    }
}

/// Affiliate-initiated, admin-reviewed sub-workflow gating contract removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub affiliate_id: Uuid,
    pub reason: String,
    pub status: DeletionRequestStatus,
    #[serde(default)]
    pub reviewed_by: Option<Uuid>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Commission owed to the referring affiliate for a given contract total.
pub fn commission_amount(total: Decimal, rate_percentage: Decimal) -> Decimal {
    (total * rate_percentage / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Human-readable contract number, sequential within the issuing year.
pub fn contract_number(year: i32, sequence: i64) -> String {
    format!("RW-{year}-{sequence:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_and_whitespace_tolerant() {
        assert_eq!(Role::parse(" Admin ").unwrap(), Role::Admin);
        assert_eq!(Role::parse("affiliate").unwrap(), Role::Affiliate);
        assert!(Role::parse("superuser").is_err());
    }

    #[test]
    fn commission_uses_the_configured_rate() {
        let amount = commission_amount(Decimal::new(10_000, 0), Decimal::new(1_000, 2));
        assert_eq!(amount, Decimal::new(1_000_00, 2));

        let fractional = commission_amount(Decimal::new(9_999, 0), Decimal::new(1_050, 2));
        assert_eq!(fractional, Decimal::new(1_049_90, 2));
    }

    #[test]
    fn contract_numbers_are_zero_padded_per_year() {
        assert_eq!(contract_number(2025, 1), "RW-2025-0001");
        assert_eq!(contract_number(2025, 412), "RW-2025-0412");
        assert_eq!(contract_number(2026, 12_345), "RW-2026-12345");
    }

    #[test]
    fn terms_blob_round_trips_through_json() {
        let terms = ContractTerms {
            service: ServiceTerms {
                description: "Brand site build".to_string(),
                timeline: "6 weeks".to_string(),
                deliverables: vec!["design".to_string(), "deployment".to_string()],
            },
            payment: PaymentTerms {
                schedule: vec![PaymentMilestone {
                    label: "deposit".to_string(),
                    amount: Decimal::new(5_000, 0),
                    due_date: None,
                }],
            },
            custom_terms: vec!["net 14".to_string()],
            ..ContractTerms::default()
        };

        let encoded = serde_json::to_value(&terms).unwrap();
        let decoded: ContractTerms = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, terms);
    }

    #[test]
    fn terms_blob_tolerates_missing_fields() {
        let decoded: ContractTerms = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(decoded, ContractTerms::default());
    }
}
