use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaywork_core::{Actor, Role, WorkflowError};

use crate::{AppState, error::ApiError};

const TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(user_id: Uuid, role: Role, secret: &str) -> Result<String, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role,
        iat: now,
        exp: now + TOKEN_TTL_SECONDS,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| ApiError::Internal(err.into()))
}

fn decode_token(token: &str, secret: &str) -> Result<Claims, WorkflowError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| WorkflowError::Unauthorized)
}

/// Bearer-session middleware: decodes the token into an `Actor` request
/// extension. Routes outside this layer are the public surface.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(WorkflowError::Unauthorized)?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(WorkflowError::Unauthorized)?
        .trim();

    let claims = decode_token(token, &state.config.jwt_secret)?;
    request
        .extensions_mut()
        .insert(Actor::new(claims.sub, claims.role));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, Role::Affiliate, "test-secret").unwrap();
        let claims = decode_token(&token, "test-secret").unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Affiliate);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = issue_token(Uuid::new_v4(), Role::Client, "test-secret").unwrap();
        assert_eq!(
            decode_token(&token, "other-secret").unwrap_err(),
            WorkflowError::Unauthorized
        );
    }
}
