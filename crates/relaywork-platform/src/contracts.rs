use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaywork_core::{
    Contract, DeletionRequest, DomainEventKind, NotificationKind, PaymentTerms, ProgressTarget,
    ReviewAction, Role, ServiceTerms, VerificationAction,
};

/// Envelope shared by every JSON endpoint:
/// `{success, message|error, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub full_name: String,
    #[serde(default = "default_signup_role")]
    pub role: String,
    /// Referral code from an affiliate sign-up link, if any.
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
    /// Minted for affiliate accounts only.
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContractRequest {
    pub client_id: Uuid,
    pub affiliate_id: Option<Uuid>,
    pub service_type: String,
    pub package_name: String,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub service: ServiceTerms,
    #[serde(default)]
    pub payment: PaymentTerms,
    #[serde(default)]
    pub custom_terms: Vec<String>,
    pub commission_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTermsRequest {
    pub service_type: Option<String>,
    pub package_name: Option<String>,
    pub total_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub service: Option<ServiceTerms>,
    pub payment: Option<PaymentTerms>,
    pub custom_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignatureRequest {
    pub signature_image: String,
    pub signer_name: String,
    /// Base64 payload pushed to the `id-cards` bucket when present.
    pub id_card_base64: Option<String>,
    #[serde(default = "default_image_ext")]
    pub id_card_ext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPaymentProofRequest {
    pub file_base64: String,
    #[serde(default = "default_image_ext")]
    pub file_ext: String,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentProofRequest {
    pub action: VerificationAction,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub target: ProgressTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDeletionRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDeletionRequest {
    pub action: ReviewAction,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteContractRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequestView {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub affiliate_id: Uuid,
    pub reason: String,
    pub status: String,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DeletionRequest> for DeletionRequestView {
    fn from(request: DeletionRequest) -> Self {
        Self {
            id: request.id,
            contract_id: request.contract_id,
            affiliate_id: request.affiliate_id,
            reason: request.reason,
            status: request.status.as_str().to_string(),
            reviewed_by: request.reviewed_by,
            reviewed_at: request.reviewed_at,
            review_notes: request.review_notes,
            created_at: request.created_at,
        }
    }
}

/// Contract representation returned to authenticated callers and, by the
/// capability link, to the unauthenticated public view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractView {
    pub id: Uuid,
    pub contract_number: String,
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
    pub status: String,
    pub workflow_status: Option<String>,
    pub terms: serde_json::Value,
    pub admin_signed: bool,
    pub client_signed: bool,
    pub admin_signer_name: Option<String>,
    pub client_signer_name: Option<String>,
    pub admin_signed_at: Option<DateTime<Utc>>,
    pub client_signed_at: Option<DateTime<Utc>>,
    pub payment_proof_url: Option<String>,
    pub payment_proof_verified: Option<bool>,
    pub payment_rejection_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Contract> for ContractView {
    fn from(contract: &Contract) -> Self {
        Self {
            id: contract.id,
            contract_number: contract.contract_number.clone(),
            client_id: contract.client_id,
            affiliate_id: contract.affiliate_id,
            service_type: contract.service_type.clone(),
            package_name: contract.package_name.clone(),
            total_amount: contract.total_amount,
            deposit_amount: contract.deposit_amount,
            remaining_amount: contract.remaining_amount,
            payment_method: contract.payment_method.clone(),
            commission_percentage: contract.commission_percentage,
            commission_amount: contract.commission_amount,
            status: contract.state.status().to_string(),
            workflow_status: contract.state.workflow_status().map(str::to_string),
            terms: serde_json::to_value(&contract.terms).unwrap_or_default(),
            admin_signed: contract.signatures.admin.is_some(),
            client_signed: contract.signatures.client.is_some(),
            admin_signer_name: contract
                .signatures
                .admin
                .as_ref()
                .map(|s| s.signer_name.clone()),
            client_signer_name: contract
                .signatures
                .client
                .as_ref()
                .map(|s| s.signer_name.clone()),
            admin_signed_at: contract.signatures.admin.as_ref().map(|s| s.signed_at),
            client_signed_at: contract.signatures.client.as_ref().map(|s| s.signed_at),
            payment_proof_url: contract.payment_proof.url.clone(),
            payment_proof_verified: contract.payment_proof.verified,
            payment_rejection_notes: contract.payment_proof.rejection_notes.clone(),
            created_at: contract.created_at,
            updated_at: contract.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateStatsView {
    pub referral_code: String,
    pub commission_rate: Decimal,
    pub total_referrals: i64,
    pub total_contracts: i64,
    pub contracts_total_amount: Decimal,
    pub confirmed_commission: Decimal,
    pub paid_out: Decimal,
    pub pending_payout: Decimal,
}

/// Change-feed message published after a workflow mutation commits. Carries
/// the notification ids inserted by that mutation so the notifier can
/// deliver email without re-deriving the fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEventMessage {
    pub event_id: Uuid,
    pub contract_id: Uuid,
    pub kind: DomainEventKind,
    #[serde(default)]
    pub notification_ids: Vec<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListContractsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

fn default_signup_role() -> String {
    "client".to_string()
}

fn default_image_ext() -> String {
    "png".to_string()
}
