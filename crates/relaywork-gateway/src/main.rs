mod auth;
mod error;

use std::net::SocketAddr;

use anyhow::Result as AnyResult;
use axum::{
    Json, Router, middleware,
    extract::{Extension, Path, Query, State},
    response::Redirect,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{error, info};
use uuid::Uuid;

use relaywork_core::{
    Actor, Contract, ContractState, ContractTerms, DeletionRequest, DeletionRequestStatus,
    DomainEvent, DomainEventKind, NewContract, NotificationKind, Operation, PaymentProof,
    ProofSubmission, Role, SignatureEvidence, SignatureSet, SignatureSubmission, TermsUpdate,
    WorkflowError, authorize, contract_number, engine, notifications_for,
};
use relaywork_platform::{
    AffiliateStatsView, ApiResponse, BUCKET_ID_CARDS, BUCKET_PAYMENT_PROOFS, CONTRACT_EVENTS_CHANNEL,
    ContractEventMessage, ContractView, CreateContractRequest, DeleteContractRequest,
    DeletionRequestView, ListContractsQuery, MessageView, NotificationView, ObjectStoreClient,
    ProgressRequest, RedisBus, RequestDeletionRequest, ReviewDeletionRequest, SendMessageRequest,
    ServiceConfig, SignUpRequest, SignUpResponse, SubmitSignatureRequest, UpdateTermsRequest,
    UploadPaymentProofRequest, VerifyPaymentProofRequest, connect_database, content_type_for_ext,
};

use crate::auth::{issue_token, require_auth};
use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
struct AppState {
    pool: PgPool,
    redis: RedisBus,
    storage: ObjectStoreClient,
    config: ServiceConfig,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "relaywork_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let storage = ObjectStoreClient::new(config.storage_url.clone(), config.storage_api_key.clone());

    let http_addr = config.http_addr.clone();
    let state = AppState {
        pool,
        redis,
        storage,
        config,
    };

    let protected = Router::new()
        .route("/contracts", get(list_contracts).post(create_contract))
        .route("/contracts/{contract_id}", get(get_contract))
        .route("/contracts/{contract_id}/update-terms", post(update_terms))
        .route(
            "/contracts/{contract_id}/send-for-signature",
            post(send_for_signature),
        )
        .route("/contracts/{contract_id}/signatures", post(submit_signature))
        .route(
            "/contracts/{contract_id}/upload-payment-proof",
            post(upload_payment_proof),
        )
        .route(
            "/contracts/{contract_id}/verify-payment-proof",
            post(verify_payment_proof),
        )
        .route("/contracts/{contract_id}/progress", post(update_progress))
        .route(
            "/contracts/{contract_id}/deletion-requests",
            post(request_deletion),
        )
        .route(
            "/deletion-requests/{request_id}/review",
            post(review_deletion),
        )
        .route("/contracts/{contract_id}/delete", post(delete_contract))
        .route(
            "/contracts/{contract_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/notifications", get(list_notifications))
        .route(
            "/notifications/read-all",
            post(mark_all_notifications_read),
        )
        .route(
            "/notifications/{notification_id}/read",
            post(mark_notification_read),
        )
        .route(
            "/notifications/{notification_id}/delete",
            post(delete_notification),
        )
        .route("/affiliates/me/stats", get(affiliate_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/callback", get(auth_callback))
        .route("/public/contracts/{link_token}", get(public_contract))
        .merge(protected)
        .with_state(state);

    let addr: SocketAddr = http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct CallbackQuery {
    redirect_to: Option<String>,
}

/// Landing for the auth provider's redirect; only same-origin targets are
/// honored.
async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let base = &state.config.public_base_url;
    let target = query
        .redirect_to
        .filter(|target| target.starts_with(base.as_str()))
        .unwrap_or_else(|| format!("{base}/dashboard"));

    Redirect::to(&target)
}

async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> ApiResult<Json<ApiResponse<SignUpResponse>>> {
    let email = payload.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(WorkflowError::validation("a valid email is required").into());
    }
    let full_name = payload.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(WorkflowError::validation("full name is required").into());
    }

    let role = Role::parse(&payload.role)?;
    if role == Role::Admin {
        return Err(
            WorkflowError::validation("admin accounts are provisioned by an operator").into(),
        );
    }

    let mut tx = state.pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;
    if exists {
        return Err(
            WorkflowError::validation(format!("an account already exists for {email}")).into(),
        );
    }

    // Referral attribution from an affiliate sign-up link.
    let referred_by: Option<Uuid> = match payload
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        Some(code) => {
            let affiliate: Option<Uuid> =
                sqlx::query_scalar("SELECT user_id FROM affiliates WHERE referral_code = $1")
                    .bind(code)
                    .fetch_optional(&mut *tx)
                    .await?;
            match affiliate {
                Some(user_id) => Some(user_id),
                None => {
                    return Err(WorkflowError::validation("unknown referral code").into());
                }
            }
        }
        None => None,
    };

    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, full_name, role, referred_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&full_name)
    .bind(role.as_str())
    .bind(referred_by)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let referral_code = match role {
        Role::Affiliate => {
            let code = mint_referral_code();
            sqlx::query(
                r#"
                INSERT INTO affiliates (user_id, referral_code, commission_rate, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(user_id)
            .bind(&code)
            .bind(state.config.default_commission_rate)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            Some(code)
        }
        _ => {
            sqlx::query("INSERT INTO clients (user_id, created_at) VALUES ($1, $2)")
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            None
        }
    };

    tx.commit().await?;

    let token = issue_token(user_id, role, &state.config.jwt_secret)?;

    Ok(Json(ApiResponse::ok_with_message(
        SignUpResponse {
            user_id,
            role,
            token,
            referral_code,
        },
        "account created",
    )))
}

async fn create_contract(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateContractRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    ensure_user_role(&state.pool, payload.client_id, Role::Client, "client_id").await?;
    if actor.role == Role::Admin {
        if let Some(affiliate_id) = payload.affiliate_id {
            ensure_user_role(&state.pool, affiliate_id, Role::Affiliate, "affiliate_id").await?;
        }
    }

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    let sequence: i64 =
        sqlx::query_scalar("SELECT COUNT(*) + 1 FROM contracts WHERE contract_number LIKE $1")
            .bind(format!("RW-{}-%", now.year()))
            .fetch_one(&mut *tx)
            .await?;
    let number = contract_number(now.year(), sequence);
    let link_token = Uuid::new_v4().simple().to_string();

    let (contract, events) = engine::create_contract(
        actor,
        NewContract {
            client_id: payload.client_id,
            affiliate_id: payload.affiliate_id,
            service_type: payload.service_type,
            package_name: payload.package_name,
            total_amount: payload.total_amount,
            deposit_amount: payload.deposit_amount,
            payment_method: payload.payment_method,
            service: payload.service,
            payment: payload.payment,
            custom_terms: payload.custom_terms,
            commission_percentage: payload.commission_percentage,
        },
        number,
        link_token,
        state.config.default_commission_rate,
        now,
    )?;

    insert_contract(&mut tx, &contract).await?;
    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

async fn list_contracts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListContractsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ContractView>>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let rows = match actor.role {
        Role::Admin => {
            sqlx::query(&format!(
                "{CONTRACT_SELECT} WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC LIMIT $2"
            ))
            .bind(query.status)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        Role::Client => {
            sqlx::query(&format!(
                "{CONTRACT_SELECT} WHERE client_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY created_at DESC LIMIT $3"
            ))
            .bind(actor.id)
            .bind(query.status)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
        Role::Affiliate => {
            sqlx::query(&format!(
                "{CONTRACT_SELECT} WHERE affiliate_id = $1 AND ($2::text IS NULL OR status = $2) ORDER BY created_at DESC LIMIT $3"
            ))
            .bind(actor.id)
            .bind(query.status)
            .bind(limit)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let contract = row_to_contract(&row)?;
        views.push(ContractView::from(&contract));
    }

    Ok(Json(ApiResponse::ok(views)))
}

async fn get_contract(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let contract = load_contract(&state.pool, contract_id).await?;
    authorize(Operation::ViewContract, &actor, Some(&contract))?;

    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

/// Unauthenticated capability view addressed by the opaque link token.
async fn public_contract(
    State(state): State<AppState>,
    Path(link_token): Path<String>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let row = sqlx::query(&format!("{CONTRACT_SELECT} WHERE link_token = $1"))
        .bind(link_token)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(WorkflowError::NotFound("contract"))?;

    let contract = row_to_contract(&row)?;
    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

async fn update_terms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<UpdateTermsRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::update_terms(
        &mut contract,
        actor,
        TermsUpdate {
            service_type: payload.service_type,
            package_name: payload.package_name,
            total_amount: payload.total_amount,
            deposit_amount: payload.deposit_amount,
            payment_method: payload.payment_method,
            service: payload.service,
            payment: payload.payment,
            custom_terms: payload.custom_terms,
        },
        now,
    )?;

    persist_contract(&mut tx, &contract).await?;
    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok_with_message(
        ContractView::from(&contract),
        "contract terms updated",
    )))
}

async fn send_for_signature(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::send_for_signature(&mut contract, actor, now)?;

    persist_contract(&mut tx, &contract).await?;
    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

async fn submit_signature(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<SubmitSignatureRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();

    // The ID card goes to the object store before the row is touched; a
    // failed upload leaves the contract unchanged.
    let id_card_url = match payload.id_card_base64.as_deref() {
        Some(encoded) => {
            let bytes = decode_base64_file(encoded)?;
            let key = ObjectStoreClient::object_key(
                actor.id,
                contract_id,
                "id-card",
                now,
                &payload.id_card_ext,
            );
            let url = state
                .storage
                .upload(
                    BUCKET_ID_CARDS,
                    &key,
                    bytes,
                    content_type_for_ext(&payload.id_card_ext),
                )
                .await?;
            Some(url)
        }
        None => None,
    };

    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::submit_signature(
        &mut contract,
        actor,
        SignatureSubmission {
            image_data: payload.signature_image,
            signer_name: payload.signer_name,
            id_card_url,
        },
        now,
    )?;

    persist_contract(&mut tx, &contract).await?;
    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok_with_message(
        ContractView::from(&contract),
        "signature recorded",
    )))
}

async fn upload_payment_proof(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<UploadPaymentProofRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();

    let bytes = decode_base64_file(&payload.file_base64)?;
    let key = ObjectStoreClient::object_key(actor.id, contract_id, "proof", now, &payload.file_ext);
    let proof_url = state
        .storage
        .upload(
            BUCKET_PAYMENT_PROOFS,
            &key,
            bytes,
            content_type_for_ext(&payload.file_ext),
        )
        .await?;

    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::submit_payment_proof(
        &mut contract,
        actor,
        ProofSubmission {
            url: proof_url.clone(),
            payment_method: payload.payment_method.clone(),
            notes: payload.notes.clone(),
        },
        now,
    )?;

    persist_contract(&mut tx, &contract).await?;

    sqlx::query(
        r#"
        INSERT INTO payment_transactions (
            id, contract_id, client_id, amount, payment_method, proof_url, notes,
            status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(contract.id)
    .bind(contract.client_id)
    .bind(contract.deposit_amount)
    .bind(&payload.payment_method)
    .bind(&proof_url)
    .bind(payload.notes.as_deref())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok_with_message(
        ContractView::from(&contract),
        "payment proof submitted for verification",
    )))
}

async fn verify_payment_proof(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<VerifyPaymentProofRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::verify_payment_proof(
        &mut contract,
        actor,
        payload.action,
        payload.notes.clone(),
        now,
    )?;

    persist_contract(&mut tx, &contract).await?;

    // Settle the matching pending transaction row.
    let transaction_status = match payload.action {
        relaywork_core::VerificationAction::Approve => "verified",
        relaywork_core::VerificationAction::Reject => "rejected",
    };
    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = $2, verified_by = $3, verified_at = $4
        WHERE contract_id = $1 AND status = 'pending'
        "#,
    )
    .bind(contract.id)
    .bind(transaction_status)
    .bind(actor.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

async fn update_progress(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<ProgressRequest>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let mut contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::update_progress(&mut contract, actor, payload.target, now)?;

    persist_contract(&mut tx, &contract).await?;
    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok(ContractView::from(&contract))))
}

async fn request_deletion(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<RequestDeletionRequest>,
) -> ApiResult<Json<ApiResponse<DeletionRequestView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let contract = load_contract_for_update(&mut tx, contract_id).await?;

    let (request, events) = engine::request_deletion(&contract, actor, &payload.reason, now)?;

    sqlx::query(
        r#"
        INSERT INTO contract_deletion_requests (
            id, contract_id, affiliate_id, reason, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(request.id)
    .bind(request.contract_id)
    .bind(request.affiliate_id)
    .bind(&request.reason)
    .bind(request.status.as_str())
    .bind(request.created_at)
    .execute(&mut *tx)
    .await?;

    let messages = record_events(&mut tx, &contract, &events).await?;
    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok_with_message(
        DeletionRequestView::from(request),
        "deletion request submitted for review",
    )))
}

async fn review_deletion(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<ReviewDeletionRequest>,
) -> ApiResult<Json<ApiResponse<DeletionRequestView>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    let request_row = sqlx::query(
        r#"
        SELECT id, contract_id, affiliate_id, reason, status, reviewed_by, reviewed_at,
               review_notes, created_at
        FROM contract_deletion_requests
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(WorkflowError::NotFound("deletion request"))?;

    let mut request = row_to_deletion_request(&request_row)?;
    let contract = load_contract_for_update(&mut tx, request.contract_id).await?;

    let (review, events) = engine::review_deletion(
        &mut request,
        &contract,
        actor,
        payload.action,
        payload.notes,
        now,
    )?;

    sqlx::query(
        r#"
        UPDATE contract_deletion_requests
        SET status = $2, reviewed_by = $3, reviewed_at = $4, review_notes = $5
        WHERE id = $1
        "#,
    )
    .bind(request.id)
    .bind(request.status.as_str())
    .bind(request.reviewed_by)
    .bind(request.reviewed_at)
    .bind(request.review_notes.as_deref())
    .execute(&mut *tx)
    .await?;

    let messages = record_events(&mut tx, &contract, &events).await?;

    if review.remove_contract {
        sqlx::query("DELETE FROM contracts WHERE id = $1")
            .bind(contract.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok(DeletionRequestView::from(request))))
}

async fn delete_contract(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<DeleteContractRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let contract = load_contract_for_update(&mut tx, contract_id).await?;

    let events = engine::delete_directly(&contract, actor, &payload.reason, now)?;

    let messages = record_events(&mut tx, &contract, &events).await?;

    sqlx::query("DELETE FROM contracts WHERE id = $1")
        .bind(contract.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    publish_events(&state, messages).await;

    Ok(Json(ApiResponse::ok_with_message((), "contract deleted")))
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<ApiResponse<Vec<NotificationView>>>> {
    let rows = sqlx::query(
        r#"
        SELECT id, kind, title, message, link, is_read, created_at
        FROM notifications
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(actor.id)
    .fetch_all(&state.pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.try_get("kind")?;
        let kind: NotificationKind =
            serde_json::from_value(serde_json::Value::String(kind))
                .map_err(|err| ApiError::Internal(err.into()))?;
        views.push(NotificationView {
            id: row.try_get("id")?,
            kind,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            link: row.try_get("link")?,
            read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        });
    }

    Ok(Json(ApiResponse::ok(views)))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let updated = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
    )
    .bind(notification_id)
    .bind(actor.id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(WorkflowError::NotFound("notification").into());
    }

    Ok(Json(ApiResponse::ok(())))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<ApiResponse<()>>> {
    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1")
        .bind(actor.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ApiResponse::ok(())))
}

async fn delete_notification(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(actor.id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(WorkflowError::NotFound("notification").into());
    }

    Ok(Json(ApiResponse::ok(())))
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<MessageView>>>> {
    let contract = load_contract(&state.pool, contract_id).await?;
    authorize(Operation::ViewContract, &actor, Some(&contract))?;

    let rows = sqlx::query(
        r#"
        SELECT id, contract_id, sender_id, body, created_at
        FROM messages
        WHERE contract_id = $1
        ORDER BY created_at ASC
        LIMIT 500
        "#,
    )
    .bind(contract_id)
    .fetch_all(&state.pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(MessageView {
            id: row.try_get("id")?,
            contract_id: row.try_get("contract_id")?,
            sender_id: row.try_get("sender_id")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
        });
    }

    Ok(Json(ApiResponse::ok(views)))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<ApiResponse<MessageView>>> {
    let contract = load_contract(&state.pool, contract_id).await?;
    authorize(Operation::SendMessage, &actor, Some(&contract))?;

    let body = payload.body.trim().to_string();
    if body.is_empty() {
        return Err(WorkflowError::validation("message body is required").into());
    }

    let message = MessageView {
        id: Uuid::new_v4(),
        contract_id,
        sender_id: actor.id,
        body,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO messages (id, contract_id, sender_id, body, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(message.id)
    .bind(message.contract_id)
    .bind(message.sender_id)
    .bind(&message.body)
    .bind(message.created_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(ApiResponse::ok(message)))
}

/// Aggregated affiliate totals, recomputed from contracts and payouts on
/// every call rather than stored.
async fn affiliate_stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<ApiResponse<AffiliateStatsView>>> {
    if actor.role != Role::Affiliate {
        return Err(WorkflowError::Forbidden.into());
    }

    let profile = sqlx::query(
        "SELECT referral_code, commission_rate FROM affiliates WHERE user_id = $1",
    )
    .bind(actor.id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(WorkflowError::NotFound("affiliate profile"))?;

    let total_referrals: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE referred_by = $1")
            .bind(actor.id)
            .fetch_one(&state.pool)
            .await?;

    let contracts_row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_contracts,
               COALESCE(SUM(total_amount), 0)::numeric AS contracts_total_amount,
               COALESCE(SUM(commission_amount) FILTER (WHERE status IN ('active', 'completed')), 0)::numeric
                   AS confirmed_commission
        FROM contracts
        WHERE affiliate_id = $1
        "#,
    )
    .bind(actor.id)
    .fetch_one(&state.pool)
    .await?;

    let paid_out: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0)::numeric FROM payouts WHERE affiliate_id = $1 AND status = 'paid'",
    )
    .bind(actor.id)
    .fetch_one(&state.pool)
    .await?;

    let confirmed_commission: Decimal = contracts_row.try_get("confirmed_commission")?;

    Ok(Json(ApiResponse::ok(AffiliateStatsView {
        referral_code: profile.try_get("referral_code")?,
        commission_rate: profile.try_get("commission_rate")?,
        total_referrals,
        total_contracts: contracts_row.try_get("total_contracts")?,
        contracts_total_amount: contracts_row.try_get("contracts_total_amount")?,
        confirmed_commission,
        paid_out,
        pending_payout: confirmed_commission - paid_out,
    })))
}

const CONTRACT_SELECT: &str = r#"
    SELECT id, contract_number, link_token, client_id, affiliate_id, service_type,
           package_name, total_amount, deposit_amount, remaining_amount, payment_method,
           commission_percentage, commission_amount, contract_terms, status, workflow_status,
           admin_signature, admin_signer_name, admin_id_card_url, admin_signed_at,
           client_signature, client_signer_name, client_id_card_url, client_signed_at,
           payment_proof_url, payment_proof_verified, payment_verified_by, payment_verified_at,
           payment_rejection_notes, created_at, updated_at
    FROM contracts
"#;

async fn load_contract(pool: &PgPool, contract_id: Uuid) -> ApiResult<Contract> {
    let row = sqlx::query(&format!("{CONTRACT_SELECT} WHERE id = $1"))
        .bind(contract_id)
        .fetch_optional(pool)
        .await?
        .ok_or(WorkflowError::NotFound("contract"))?;

    row_to_contract(&row)
}

async fn load_contract_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract_id: Uuid,
) -> ApiResult<Contract> {
    let row = sqlx::query(&format!("{CONTRACT_SELECT} WHERE id = $1 FOR UPDATE"))
        .bind(contract_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(WorkflowError::NotFound("contract"))?;

    row_to_contract(&row)
}

fn row_to_contract(row: &PgRow) -> ApiResult<Contract> {
    let status: String = row.try_get("status")?;
    let workflow_status: Option<String> = row.try_get("workflow_status")?;
    let state = ContractState::decode(&status, workflow_status.as_deref())?;

    let terms_value: serde_json::Value = row.try_get("contract_terms")?;
    let terms: ContractTerms =
        serde_json::from_value(terms_value).map_err(|err| ApiError::Internal(err.into()))?;

    let admin_signature: Option<String> = row.try_get("admin_signature")?;
    let admin = match admin_signature {
        Some(image_data) => Some(SignatureEvidence {
            image_data,
            signer_name: row
                .try_get::<Option<String>, _>("admin_signer_name")?
                .unwrap_or_default(),
            id_card_url: row.try_get("admin_id_card_url")?,
            signed_at: row
                .try_get::<Option<DateTime<Utc>>, _>("admin_signed_at")?
                .unwrap_or_else(Utc::now),
        }),
        None => None,
    };

    let client_signature: Option<String> = row.try_get("client_signature")?;
    let client = match client_signature {
        Some(image_data) => Some(SignatureEvidence {
            image_data,
            signer_name: row
                .try_get::<Option<String>, _>("client_signer_name")?
                .unwrap_or_default(),
            id_card_url: row.try_get("client_id_card_url")?,
            signed_at: row
                .try_get::<Option<DateTime<Utc>>, _>("client_signed_at")?
                .unwrap_or_else(Utc::now),
        }),
        None => None,
    };

    Ok(Contract {
        id: row.try_get("id")?,
        contract_number: row.try_get("contract_number")?,
        link_token: row.try_get("link_token")?,
        client_id: row.try_get("client_id")?,
        affiliate_id: row.try_get("affiliate_id")?,
        service_type: row.try_get("service_type")?,
        package_name: row.try_get("package_name")?,
        total_amount: row.try_get("total_amount")?,
        deposit_amount: row.try_get("deposit_amount")?,
        remaining_amount: row.try_get("remaining_amount")?,
        payment_method: row.try_get("payment_method")?,
        commission_percentage: row.try_get("commission_percentage")?,
        commission_amount: row.try_get("commission_amount")?,
        terms,
        state,
        signatures: SignatureSet { admin, client },
        payment_proof: PaymentProof {
            url: row.try_get("payment_proof_url")?,
            verified: row.try_get("payment_proof_verified")?,
            verified_by: row.try_get("payment_verified_by")?,
            verified_at: row.try_get("payment_verified_at")?,
            rejection_notes: row.try_get("payment_rejection_notes")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_deletion_request(row: &PgRow) -> ApiResult<DeletionRequest> {
    let status: String = row.try_get("status")?;

    Ok(DeletionRequest {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        affiliate_id: row.try_get("affiliate_id")?,
        reason: row.try_get("reason")?,
        status: DeletionRequestStatus::parse(&status)?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        review_notes: row.try_get("review_notes")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_contract(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract: &Contract,
) -> ApiResult<()> {
    let terms = serde_json::to_value(&contract.terms)
        .map_err(|err| ApiError::Internal(err.into()))?;

    sqlx::query(
        r#"
        INSERT INTO contracts (
            id, contract_number, link_token, client_id, affiliate_id, service_type,
            package_name, total_amount, deposit_amount, remaining_amount, payment_method,
            commission_percentage, commission_amount, contract_terms, status, workflow_status,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
        "#,
    )
    .bind(contract.id)
    .bind(&contract.contract_number)
    .bind(&contract.link_token)
    .bind(contract.client_id)
    .bind(contract.affiliate_id)
    .bind(&contract.service_type)
    .bind(&contract.package_name)
    .bind(contract.total_amount)
    .bind(contract.deposit_amount)
    .bind(contract.remaining_amount)
    .bind(contract.payment_method.as_deref())
    .bind(contract.commission_percentage)
    .bind(contract.commission_amount)
    .bind(terms)
    .bind(contract.state.status())
    .bind(contract.state.workflow_status())
    .bind(contract.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn persist_contract(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract: &Contract,
) -> ApiResult<()> {
    let terms = serde_json::to_value(&contract.terms)
        .map_err(|err| ApiError::Internal(err.into()))?;

    sqlx::query(
        r#"
        UPDATE contracts
        SET service_type = $2,
            package_name = $3,
            total_amount = $4,
            deposit_amount = $5,
            remaining_amount = $6,
            payment_method = $7,
            commission_percentage = $8,
            commission_amount = $9,
            contract_terms = $10,
            status = $11,
            workflow_status = $12,
            admin_signature = $13,
            admin_signer_name = $14,
            admin_id_card_url = $15,
            admin_signed_at = $16,
            client_signature = $17,
            client_signer_name = $18,
            client_id_card_url = $19,
            client_signed_at = $20,
            payment_proof_url = $21,
            payment_proof_verified = $22,
            payment_verified_by = $23,
            payment_verified_at = $24,
            payment_rejection_notes = $25,
            updated_at = $26
        WHERE id = $1
        "#,
    )
    .bind(contract.id)
    .bind(&contract.service_type)
    .bind(&contract.package_name)
    .bind(contract.total_amount)
    .bind(contract.deposit_amount)
    .bind(contract.remaining_amount)
    .bind(contract.payment_method.as_deref())
    .bind(contract.commission_percentage)
    .bind(contract.commission_amount)
    .bind(terms)
    .bind(contract.state.status())
    .bind(contract.state.workflow_status())
    .bind(contract.signatures.admin.as_ref().map(|s| s.image_data.as_str()))
    .bind(contract.signatures.admin.as_ref().map(|s| s.signer_name.as_str()))
    .bind(
        contract
            .signatures
            .admin
            .as_ref()
            .and_then(|s| s.id_card_url.as_deref()),
    )
    .bind(contract.signatures.admin.as_ref().map(|s| s.signed_at))
    .bind(contract.signatures.client.as_ref().map(|s| s.image_data.as_str()))
    .bind(contract.signatures.client.as_ref().map(|s| s.signer_name.as_str()))
    .bind(
        contract
            .signatures
            .client
            .as_ref()
            .and_then(|s| s.id_card_url.as_deref()),
    )
    .bind(contract.signatures.client.as_ref().map(|s| s.signed_at))
    .bind(contract.payment_proof.url.as_deref())
    .bind(contract.payment_proof.verified)
    .bind(contract.payment_proof.verified_by)
    .bind(contract.payment_proof.verified_at)
    .bind(contract.payment_proof.rejection_notes.as_deref())
    .bind(contract.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Persists each event as a `contract_activities` row, materializes the
/// notification fan-out in the same transaction, and returns the change-feed
/// messages to publish after commit.
async fn record_events(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract: &Contract,
    events: &[DomainEvent],
) -> ApiResult<Vec<ContractEventMessage>> {
    let admin_ids = admin_user_ids(tx).await?;
    let mut messages = Vec::with_capacity(events.len());

    for event in events {
        // Activity rows cascade away with the contract, so deletion events
        // keep only their notifications.
        let removes_contract = matches!(
            event.kind,
            DomainEventKind::DeletionApproved | DomainEventKind::ContractDeleted
        );
        if !removes_contract {
            sqlx::query(
                r#"
                INSERT INTO contract_activities (
                    id, contract_id, activity_type, actor_id, actor_role, detail, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.id)
            .bind(event.contract_id)
            .bind(event.kind.as_str())
            .bind(event.actor_id)
            .bind(event.actor_role.as_str())
            .bind(&event.detail)
            .bind(event.occurred_at)
            .execute(&mut **tx)
            .await?;
        }

        let drafts = notifications_for(event, contract, &admin_ids);
        let mut notification_ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let notification_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO notifications (
                    id, user_id, kind, title, message, link, is_read, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
                "#,
            )
            .bind(notification_id)
            .bind(draft.user_id)
            .bind(draft.kind.as_str())
            .bind(&draft.title)
            .bind(&draft.message)
            .bind(&draft.link)
            .bind(event.occurred_at)
            .execute(&mut **tx)
            .await?;
            notification_ids.push(notification_id);
        }

        messages.push(ContractEventMessage {
            event_id: event.id,
            contract_id: event.contract_id,
            kind: event.kind,
            notification_ids,
            occurred_at: event.occurred_at,
        });
    }

    Ok(messages)
}

async fn admin_user_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> ApiResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin'")
        .fetch_all(&mut **tx)
        .await?;

    Ok(ids)
}

/// Best-effort change feed: a failed publish is logged and never surfaces
/// as a failure of the committed mutation.
async fn publish_events(state: &AppState, messages: Vec<ContractEventMessage>) {
    for message in messages {
        if let Err(err) = state
            .redis
            .publish_json(CONTRACT_EVENTS_CHANNEL, &message)
            .await
        {
            error!(
                "failed to publish {} event for contract {}: {err}",
                message.kind.as_str(),
                message.contract_id
            );
        }
    }
}

async fn ensure_user_role(
    pool: &PgPool,
    user_id: Uuid,
    expected: Role,
    field: &str,
) -> ApiResult<()> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match role {
        Some(role) if role == expected.as_str() => Ok(()),
        Some(_) => Err(WorkflowError::validation(format!(
            "{field} must reference a {} user",
            expected.as_str()
        ))
        .into()),
        None => Err(WorkflowError::validation(format!("{field} does not exist")).into()),
    }
}

fn decode_base64_file(encoded: &str) -> ApiResult<Vec<u8>> {
    // Tolerate data-URL payloads from the browser.
    let encoded = encoded
        .rsplit_once("base64,")
        .map(|(_, tail)| tail)
        .unwrap_or(encoded);

    BASE64
        .decode(encoded.trim())
        .map_err(|_| WorkflowError::validation("file payload is not valid base64").into())
}

fn mint_referral_code() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("RW{}", token[..6].to_ascii_uppercase())
}
