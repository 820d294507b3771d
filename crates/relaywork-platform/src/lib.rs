pub mod config;
pub mod contracts;
pub mod db;
pub mod mailer;
pub mod object_store;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    AffiliateStatsView, ApiResponse, ContractEventMessage, ContractView, CreateContractRequest,
    DeleteContractRequest, DeletionRequestView, ListContractsQuery, MessageView, NotificationView,
    ProgressRequest, RequestDeletionRequest, ReviewDeletionRequest, SendMessageRequest,
    SignUpRequest, SignUpResponse, SubmitSignatureRequest, UpdateTermsRequest,
    UploadPaymentProofRequest, VerifyPaymentProofRequest,
};
pub use db::connect_database;
pub use mailer::{HttpMailer, Mailer, OutboundEmail};
pub use object_store::{
    BUCKET_ID_CARDS, BUCKET_PAYMENT_PROOFS, ObjectStoreClient, content_type_for_ext,
};
pub use redis_bus::{CONTRACT_EVENTS_CHANNEL, RedisBus};
