use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const BUCKET_PAYMENT_PROOFS: &str = "payment-proofs";
pub const BUCKET_ID_CARDS: &str = "id-cards";

/// Thin client for the hosted object store. Uploads are synchronous
/// request-blocking calls; the returned URL is persisted on the contract row.
#[derive(Clone)]
pub struct ObjectStoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ObjectStoreClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Bucket keys are namespaced by the uploading actor and contract:
    /// `{actorId}/{contractId}/{artifact}-{timestamp}.{ext}`.
    pub fn object_key(
        actor_id: Uuid,
        contract_id: Uuid,
        artifact: &str,
        timestamp: DateTime<Utc>,
        ext: &str,
    ) -> String {
        format!(
            "{actor_id}/{contract_id}/{artifact}-{}.{ext}",
            timestamp.timestamp()
        )
    }

    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let endpoint = format!("{}/object/{bucket}/{key}", self.base_url);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .context("object store upload request failed")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "object store rejected upload to {bucket}/{key}: {}",
                response.status()
            );
        }

        Ok(format!("{}/object/public/{bucket}/{key}", self.base_url))
    }
}

/// Content type for the few image/document extensions the app accepts.
pub fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "image/png",
    }
}
