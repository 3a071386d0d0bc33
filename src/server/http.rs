use super::http_auth::{AdminAccount, AuthenticatedAccount};
use super::http_errors::{
    map_auth_error, map_ledger_error, map_subscription_error, map_webhook_error,
};
use super::http_parse::{clamp_page, grant_reason, signature_header};
use super::http_types::*;
use super::state::AppState;
use crate::application::RegisterInput;
use crate::domain::{CreditGrant, GENERATION_MODELS};
use crate::infrastructure::{PaymentRepository, ProfileUpdate};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/verify-token", post(verify_token))
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/billing/plans", get(list_plans))
        .route("/billing/subscription", get(get_subscription))
        .route("/billing/subscription/cancel", post(cancel_subscription))
        .route("/billing/history", get(billing_history))
        .route("/generation/models", get(list_models))
        .route("/generation/charge", post(charge_generation))
        .route("/webhooks/payments", post(payment_webhook))
        .route("/admin/accounts/:id", get(admin_get_account))
        .route("/admin/accounts/:id/credits", post(admin_grant_credits))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        register,
        login,
        forgot_password,
        reset_password,
        verify_token,
        get_profile,
        update_profile,
        list_plans,
        get_subscription,
        cancel_subscription,
        billing_history,
        list_models,
        charge_generation,
        payment_webhook,
        admin_get_account,
        admin_grant_credits,
    ),
    components(
        schemas(
            HealthResponse,
            MessageResponse,
            RegisterRequest,
            LoginRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            VerifyTokenRequest,
            UpdateProfileRequest,
            AccountResponse,
            SubscriptionResponse,
            AuthResponse,
            PlanResponse,
            SubscriptionStatusResponse,
            PaymentResponse,
            LedgerEntryResponse,
            HistoryResponse,
            ModelResponse,
            ChargeRequest,
            ChargeResponse,
            WebhookAck,
            AdminGrantRequest,
            AdminGrantResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Registration, login and password reset"),
        (name = "Billing", description = "Plans, subscription state and payment history"),
        (name = "Generation", description = "Model pricing and credit charges"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Admin", description = "Operator endpoints"),
    ),
    info(
        title = "VidCraft Billing API",
        version = "0.1.0",
        description = "Credits, subscriptions and payment webhooks for the VidCraft video platform",
        license(name = "MIT")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Create an account and sign it in
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed", body = Object),
        (status = 409, description = "Email already registered", body = Object)
    )
)]
async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> impl IntoResponse {
    let input = RegisterInput {
        email: req.email,
        password: req.password,
        first_name: req.first_name,
        last_name: req.last_name,
        company: req.company,
    };

    match state.auth.register(input).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(json!(AuthResponse {
                account: session.account.into(),
                token: session.token,
            })),
        ),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            if status.is_server_error() {
                error!(error = %e, "Registration failed");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = Object)
    )
)]
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> impl IntoResponse {
    match state.auth.login(&req.email, &req.password).await {
        Ok(session) => (
            StatusCode::OK,
            Json(json!(AuthResponse {
                account: session.account.into(),
                token: session.token,
            })),
        ),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            if status.is_server_error() {
                error!(error = %e, "Login failed");
            }
            (status, Json(body))
        }
    }
}

/// Request a password reset
///
/// The response is the same whether or not the email is registered.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 400, description = "Email missing", body = Object)
    )
)]
async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> impl IntoResponse {
    match state.auth.forgot_password(&req.email).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!(MessageResponse::new(
                "If an account exists with this email, a password reset link has been sent"
            ))),
        ),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            if status.is_server_error() {
                error!(error = %e, "Password reset request failed");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset token", body = Object)
    )
)]
async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    match state.auth.reset_password(&req.token, &req.password).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!(MessageResponse::new("Password has been reset successfully"))),
        ),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            if status.is_server_error() {
                error!(error = %e, "Password reset failed");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/verify-token",
    tag = "Auth",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = AccountResponse),
        (status = 401, description = "Invalid or expired token", body = Object),
        (status = 404, description = "Account no longer exists", body = Object)
    )
)]
async fn verify_token(
    State(state): State<AppState>,
    Json(req): Json<VerifyTokenRequest>,
) -> impl IntoResponse {
    match state.auth.verify_token(&req.token).await {
        Ok(account) => (
            StatusCode::OK,
            Json(json!({ "valid": true, "account": AccountResponse::from(account) })),
        ),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current account", body = AccountResponse),
        (status = 401, description = "Authentication required", body = Object)
    )
)]
async fn get_profile(AuthenticatedAccount(account): AuthenticatedAccount) -> impl IntoResponse {
    (StatusCode::OK, Json(AccountResponse::from(account)))
}

#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = AccountResponse),
        (status = 400, description = "Validation failed", body = Object),
        (status = 401, description = "Authentication required", body = Object)
    )
)]
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let update = ProfileUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        company: req.company,
    };

    match state.auth.update_profile(account.id, update).await {
        Ok(account) => (StatusCode::OK, Json(json!(AccountResponse::from(account)))),
        Err(e) => {
            let (status, body) = map_auth_error(&e);
            if status.is_server_error() {
                error!(account_id = %account.id, error = %e, "Failed to update profile");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/billing/plans",
    tag = "Billing",
    responses((status = 200, description = "Plan catalog", body = [PlanResponse]))
)]
async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    let plans: Vec<PlanResponse> = state
        .subscriptions
        .catalog()
        .plans()
        .iter()
        .map(PlanResponse::from)
        .collect();
    (StatusCode::OK, Json(plans))
}

#[utoipa::path(
    get,
    path = "/billing/subscription",
    tag = "Billing",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Subscription state and balance", body = SubscriptionStatusResponse),
        (status = 401, description = "Authentication required", body = Object)
    )
)]
async fn get_subscription(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
) -> impl IntoResponse {
    let plan = state
        .subscriptions
        .catalog()
        .by_tier(account.subscription.tier)
        .map(PlanResponse::from);

    (
        StatusCode::OK,
        Json(SubscriptionStatusResponse {
            subscription: SubscriptionResponse::from(&account.subscription),
            credits_remaining: account.credits_remaining,
            plan,
        }),
    )
}

/// Request cancellation at period end
///
/// Only flags the local record. The plan stays active until the provider
/// reports the subscription ended.
#[utoipa::path(
    post,
    path = "/billing/subscription/cancel",
    tag = "Billing",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Cancellation recorded", body = SubscriptionResponse),
        (status = 400, description = "No active subscription", body = Object),
        (status = 401, description = "Authentication required", body = Object)
    )
)]
async fn cancel_subscription(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
) -> impl IntoResponse {
    match state.subscriptions.request_cancellation(account.id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(json!(SubscriptionResponse::from(&account.subscription))),
        ),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            if status.is_server_error() {
                error!(account_id = %account.id, error = %e, "Failed to cancel subscription");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/billing/history",
    tag = "Billing",
    security(("bearer" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Payments, ledger entries and counters", body = HistoryResponse),
        (status = 401, description = "Authentication required", body = Object),
        (status = 500, description = "Failed to load history", body = Object)
    )
)]
async fn billing_history(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let (limit, offset) = clamp_page(params.limit, params.offset);

    let payments = match state.payment_repo.list_by_account(account.id, limit).await {
        Ok(payments) => payments,
        Err(e) => {
            error!(account_id = %account.id, error = %e, "Failed to list payments");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to load history" })),
            );
        }
    };

    let ledger = match state.ledger.history(account.id, limit, offset).await {
        Ok(entries) => entries,
        Err(e) => {
            let (status, body) = map_ledger_error(&e);
            error!(account_id = %account.id, error = %e, "Failed to list ledger entries");
            return (status, Json(body));
        }
    };

    (
        StatusCode::OK,
        Json(json!(HistoryResponse {
            credits_remaining: account.credits_remaining,
            credits_purchased: account.credits_purchased,
            total_spent_cents: account.total_spent_cents,
            payments: payments.into_iter().map(Into::into).collect(),
            ledger: ledger.into_iter().map(Into::into).collect(),
        })),
    )
}

#[utoipa::path(
    get,
    path = "/generation/models",
    tag = "Generation",
    responses((status = 200, description = "Models and per-second pricing", body = [ModelResponse]))
)]
async fn list_models() -> impl IntoResponse {
    let models: Vec<ModelResponse> = GENERATION_MODELS.iter().map(ModelResponse::from).collect();
    (StatusCode::OK, Json(models))
}

/// Charge credits for a generation request
///
/// Prices the request and deducts it atomically. Nothing is deducted when the
/// balance does not cover the full cost.
#[utoipa::path(
    post,
    path = "/generation/charge",
    tag = "Generation",
    security(("bearer" = [])),
    request_body = ChargeRequest,
    responses(
        (status = 200, description = "Credits deducted", body = ChargeResponse),
        (status = 400, description = "Invalid duration or variations", body = Object),
        (status = 401, description = "Authentication required", body = Object),
        (status = 402, description = "Insufficient credits", body = Object),
        (status = 404, description = "Unknown model", body = Object)
    )
)]
async fn charge_generation(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Json(req): Json<ChargeRequest>,
) -> impl IntoResponse {
    match state
        .ledger
        .charge_generation(account.id, &req.model_id, req.duration_seconds, req.variations)
        .await
    {
        Ok(charge) => (StatusCode::OK, Json(json!(ChargeResponse::from(charge)))),
        Err(e) => {
            let (status, body) = map_ledger_error(&e);
            if status.is_server_error() {
                error!(account_id = %account.id, error = %e, "Failed to charge generation");
            }
            (status, Json(body))
        }
    }
}

/// Payment provider webhook
///
/// The raw body is verified against the signature header before parsing.
/// Accepted deliveries are acknowledged with 200 even when the event could
/// not be applied, so the provider does not retry indefinitely.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "Webhooks",
    request_body(content = String, description = "Raw provider event JSON", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or payload", body = Object),
        (status = 500, description = "Delivery could not be recorded; retry", body = Object)
    )
)]
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = signature_header(&headers);

    match state
        .webhooks
        .handle(&body, signature, Utc::now().timestamp())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!(WebhookAck {
                received: true,
                outcome: outcome.as_str().to_string(),
            })),
        ),
        Err(e) => {
            let (status, body) = map_webhook_error(&e);
            if status.is_server_error() {
                error!(error = %e, "Webhook delivery not recorded");
            }
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/accounts/{id}",
    tag = "Admin",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = AccountResponse),
        (status = 403, description = "Admin access required", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn admin_get_account(
    State(state): State<AppState>,
    AdminAccount(_admin): AdminAccount,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.subscriptions.status(id).await {
        Ok(account) => (StatusCode::OK, Json(json!(AccountResponse::from(account)))),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            if status.is_server_error() {
                error!(account_id = %id, error = %e, "Failed to get account");
            }
            (status, Json(body))
        }
    }
}

/// Grant promotional credits
#[utoipa::path(
    post,
    path = "/admin/accounts/{id}/credits",
    tag = "Admin",
    security(("bearer" = [])),
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = AdminGrantRequest,
    responses(
        (status = 200, description = "Credits granted", body = AdminGrantResponse),
        (status = 400, description = "Amount must be positive", body = Object),
        (status = 403, description = "Admin access required", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn admin_grant_credits(
    State(state): State<AppState>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<AdminGrantRequest>,
) -> impl IntoResponse {
    let grant = CreditGrant::promotional(req.amount).with_metadata(json!({
        "reason": grant_reason(req.reason),
        "granted_by": admin.id,
    }));

    match state.ledger.grant(id, &grant).await {
        Ok(balance) => {
            info!(account_id = %id, admin_id = %admin.id, amount = req.amount, "Admin credit grant");
            (
                StatusCode::OK,
                Json(json!(AdminGrantResponse {
                    account_id: id,
                    credits_remaining: balance,
                })),
            )
        }
        Err(e) => {
            let (status, body) = map_ledger_error(&e);
            if status.is_server_error() {
                error!(account_id = %id, error = %e, "Admin credit grant failed");
            }
            (status, Json(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::http_auth::extract_bearer_token;
    use super::super::http_parse::{clamp_page, grant_reason, signature_header};
    use axum::http::{header, HeaderMap, HeaderValue};

    #[test]
    fn extract_bearer_token_happy_path() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_or_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers2 = HeaderMap::new();
        headers2.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers2), None);
    }

    #[test]
    fn extract_bearer_token_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn signature_header_is_case_insensitive_and_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static(" t=1,v1=ab "));
        assert_eq!(signature_header(&headers), Some("t=1,v1=ab"));

        let mut blank = HeaderMap::new();
        blank.insert("stripe-signature", HeaderValue::from_static("  "));
        assert_eq!(signature_header(&blank), None);
    }

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(clamp_page(0, -5), (1, 0));
        assert_eq!(clamp_page(10_000, 20), (100, 20));
    }

    #[test]
    fn grant_reason_defaults_when_blank() {
        assert_eq!(grant_reason(None), "admin grant");
        assert_eq!(grant_reason(Some("   ".into())), "admin grant");
        assert_eq!(grant_reason(Some(" launch promo ".into())), "launch promo");
    }
}
