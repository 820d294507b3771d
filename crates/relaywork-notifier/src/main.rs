use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use redis::Msg;
use sqlx::{PgPool, Row};
use tracing::{error, info};
use uuid::Uuid;

use relaywork_platform::{
    CONTRACT_EVENTS_CHANNEL, ContractEventMessage, HttpMailer, Mailer, OutboundEmail, RedisBus,
    ServiceConfig, connect_database,
};

const EMAIL_STATUS_SENT: &str = "sent";
const EMAIL_STATUS_FAILED: &str = "failed";

/// One email owed to a recipient for a freshly inserted notification.
#[derive(Debug, Clone)]
struct PendingEmail {
    notification_id: Uuid,
    recipient: String,
    subject: String,
    body_html: String,
}

#[derive(Debug)]
struct DeliveryOutcome {
    notification_id: Uuid,
    recipient: String,
    subject: String,
    status: &'static str,
    error: Option<String>,
    provider_message_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "relaywork_notifier=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let mailer = HttpMailer::new(
        config.email_api_url.clone(),
        config.email_api_key.clone(),
        config.email_from.clone(),
    );

    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(CONTRACT_EVENTS_CHANNEL).await?;
    let mut messages = pubsub.on_message();

    info!("notifier subscribed to {CONTRACT_EVENTS_CHANNEL}");

    loop {
        let msg = messages
            .next()
            .await
            .context("contracts.events stream ended unexpectedly")?;
        if let Err(err) = handle_message(&pool, &mailer, &config.public_base_url, msg).await {
            error!("failed to process change-feed message: {err:#}");
        }
    }
}

async fn handle_message(
    pool: &PgPool,
    mailer: &impl Mailer,
    base_url: &str,
    msg: Msg,
) -> Result<()> {
    let payload: String = msg.get_payload()?;
    let event: ContractEventMessage = serde_json::from_str(&payload)?;

    if event.notification_ids.is_empty() {
        return Ok(());
    }

    let pending = load_pending_emails(pool, &event.notification_ids, base_url).await?;
    let outcomes = deliver(mailer, pending).await;

    for outcome in outcomes {
        record_outcome(pool, &outcome).await?;
        match outcome.status {
            EMAIL_STATUS_SENT => info!(
                "delivered {} notification email to {}",
                event.kind.as_str(),
                outcome.recipient
            ),
            _ => error!(
                "failed to deliver notification {} to {}: {}",
                outcome.notification_id,
                outcome.recipient,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    Ok(())
}

async fn load_pending_emails(
    pool: &PgPool,
    notification_ids: &[Uuid],
    base_url: &str,
) -> Result<Vec<PendingEmail>> {
    let rows = sqlx::query(
        r#"
        SELECT n.id, n.title, n.message, n.link, u.email
        FROM notifications n
        INNER JOIN users u ON u.id = n.user_id
        WHERE n.id = ANY($1)
        "#,
    )
    .bind(notification_ids.to_vec())
    .fetch_all(pool)
    .await?;

    let mut pending = Vec::with_capacity(rows.len());
    for row in rows {
        let title: String = row.try_get("title")?;
        let message: String = row.try_get("message")?;
        let link: String = row.try_get("link")?;

        pending.push(PendingEmail {
            notification_id: row.try_get("id")?,
            recipient: row.try_get("email")?,
            subject: title,
            body_html: format!(
                "<p>{message}</p><p><a href=\"{base_url}{link}\">Open in Relaywork</a></p>"
            ),
        });
    }

    Ok(pending)
}

/// One provider call per recipient. A failed send is recorded and skipped;
/// there is no retry and no effect on the other recipients.
async fn deliver(mailer: &impl Mailer, pending: Vec<PendingEmail>) -> Vec<DeliveryOutcome> {
    let mut outcomes = Vec::with_capacity(pending.len());

    for email in pending {
        let outbound = OutboundEmail {
            to: email.recipient.clone(),
            subject: email.subject.clone(),
            html: email.body_html.clone(),
        };

        let outcome = match mailer.send(&outbound).await {
            Ok(provider_message_id) => DeliveryOutcome {
                notification_id: email.notification_id,
                recipient: email.recipient,
                subject: email.subject,
                status: EMAIL_STATUS_SENT,
                error: None,
                provider_message_id: Some(provider_message_id),
            },
            Err(err) => DeliveryOutcome {
                notification_id: email.notification_id,
                recipient: email.recipient,
                subject: email.subject,
                status: EMAIL_STATUS_FAILED,
                error: Some(err.to_string()),
                provider_message_id: None,
            },
        };
        outcomes.push(outcome);
    }

    outcomes
}

async fn record_outcome(pool: &PgPool, outcome: &DeliveryOutcome) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_logs (
            id, notification_id, recipient, subject, status, error, provider_message_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(outcome.notification_id)
    .bind(&outcome.recipient)
    .bind(&outcome.subject)
    .bind(outcome.status)
    .bind(outcome.error.as_deref())
    .bind(outcome.provider_message_id.as_deref())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
