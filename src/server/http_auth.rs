use super::http_errors::map_auth_error;
use super::state::AppState;
use crate::domain::Account;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, header::HeaderMap, request::Parts, StatusCode},
    Json,
};
use tracing::warn;

pub(super) type Rejection = (StatusCode, Json<serde_json::Value>);

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// The account named by a valid bearer token.
pub(super) struct AuthenticatedAccount(pub(super) Account);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            )
        })?;

        match state.auth.verify_token(token).await {
            Ok(account) => Ok(AuthenticatedAccount(account)),
            Err(e) => {
                let (status, body) = map_auth_error(&e);
                // A token for a deleted account is still an auth failure here.
                let status = if status == StatusCode::NOT_FOUND {
                    StatusCode::UNAUTHORIZED
                } else {
                    status
                };
                Err((status, Json(body)))
            }
        }
    }
}

/// An authenticated account holding the admin role.
pub(super) struct AdminAccount(pub(super) Account);

#[async_trait]
impl FromRequestParts<AppState> for AdminAccount {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedAccount(account) =
            AuthenticatedAccount::from_request_parts(parts, state).await?;
        if !account.is_admin() {
            warn!(account_id = %account.id, "Non-admin attempted admin operation");
            return Err((
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Admin access required" })),
            ));
        }
        Ok(AdminAccount(account))
    }
}
