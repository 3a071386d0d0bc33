use crate::application::{AuthError, LedgerError, SubscriptionError, WebhookError};
use crate::domain::PricingError;
use crate::infrastructure::RepositoryError;
use axum::http::StatusCode;

pub(super) fn map_auth_error(err: &AuthError) -> (StatusCode, serde_json::Value) {
    match err {
        AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg })),
        AuthError::EmailTaken => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string() }),
        ),
        AuthError::InvalidCredentials | AuthError::InvalidToken => (
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": err.to_string() }),
        ),
        AuthError::InvalidResetToken => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        AuthError::AccountNotFound => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        AuthError::Repository(_) | AuthError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Internal server error" }),
        ),
    }
}

pub(super) fn map_ledger_error(err: &LedgerError) -> (StatusCode, serde_json::Value) {
    match err {
        LedgerError::InsufficientCredits {
            required,
            available,
        } => (
            StatusCode::PAYMENT_REQUIRED,
            serde_json::json!({
                "error": "Insufficient credits",
                "required": required,
                "available": available,
            }),
        ),
        LedgerError::InvalidAmount(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        LedgerError::Pricing(PricingError::UnknownModel(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": err.to_string() }),
        ),
        LedgerError::Pricing(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        LedgerError::Repository(RepositoryError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        LedgerError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Ledger operation failed" }),
        ),
    }
}

pub(super) fn map_subscription_error(err: &SubscriptionError) -> (StatusCode, serde_json::Value) {
    match err {
        SubscriptionError::State(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        SubscriptionError::Repository(RepositoryError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        SubscriptionError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to update subscription" }),
        ),
    }
}

/// Rejections here are the only non-2xx answers the provider sees. A storage
/// failure is a 500 so the delivery is retried.
pub(super) fn map_webhook_error(err: &WebhookError) -> (StatusCode, serde_json::Value) {
    match err {
        WebhookError::Signature(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Invalid signature" }),
        ),
        WebhookError::MalformedEnvelope(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Invalid payload" }),
        ),
        WebhookError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Webhook processing failed" }),
        ),
    }
}
