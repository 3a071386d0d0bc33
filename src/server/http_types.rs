use crate::application::GenerationCharge;
use crate::domain::{Account, GenerationModel, LedgerEntry, Payment, Subscription, SubscriptionPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct MessageResponse {
    pub(super) message: String,
}

impl MessageResponse {
    pub(super) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct RegisterRequest {
    #[schema(example = "maker@example.com")]
    pub(super) email: String,
    pub(super) password: String,
    #[schema(example = "Ada")]
    pub(super) first_name: String,
    #[serde(default)]
    pub(super) last_name: Option<String>,
    #[serde(default)]
    pub(super) company: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct LoginRequest {
    pub(super) email: String,
    pub(super) password: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ForgotPasswordRequest {
    pub(super) email: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ResetPasswordRequest {
    pub(super) token: String,
    #[serde(alias = "new_password")]
    pub(super) password: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct VerifyTokenRequest {
    pub(super) token: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct UpdateProfileRequest {
    #[serde(default)]
    pub(super) first_name: Option<String>,
    #[serde(default)]
    pub(super) last_name: Option<String>,
    #[serde(default)]
    pub(super) company: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionResponse {
    #[schema(example = "pro")]
    pub(super) tier: String,
    #[schema(example = "active")]
    pub(super) status: String,
    pub(super) expires_at: Option<DateTime<Utc>>,
    pub(super) cancel_at_period_end: bool,
    pub(super) has_provider_subscription: bool,
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(sub: &Subscription) -> Self {
        Self {
            tier: sub.tier.to_string(),
            status: sub.status.to_string(),
            expires_at: sub.expires_at,
            cancel_at_period_end: sub.cancel_at_period_end,
            has_provider_subscription: sub.provider_subscription_id.is_some(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct AccountResponse {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) first_name: String,
    pub(super) last_name: Option<String>,
    pub(super) full_name: String,
    pub(super) company: Option<String>,
    pub(super) role: String,
    pub(super) credits_remaining: i64,
    pub(super) credits_purchased: i64,
    pub(super) total_spent_cents: i64,
    pub(super) subscription: SubscriptionResponse,
    pub(super) created_at: DateTime<Utc>,
    pub(super) last_login_at: Option<DateTime<Utc>>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            full_name: account.full_name(),
            subscription: SubscriptionResponse::from(&account.subscription),
            id: account.id,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            company: account.company,
            role: account.role.to_string(),
            credits_remaining: account.credits_remaining,
            credits_purchased: account.credits_purchased,
            total_spent_cents: account.total_spent_cents,
            created_at: account.created_at,
            last_login_at: account.last_login_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct AuthResponse {
    pub(super) account: AccountResponse,
    pub(super) token: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct PlanResponse {
    pub(super) name: String,
    pub(super) tier: String,
    pub(super) price_monthly_cents: i64,
    pub(super) price_yearly_cents: i64,
    pub(super) credits_included: i64,
    pub(super) max_duration_seconds: u32,
    pub(super) priority_support: bool,
    pub(super) api_access: bool,
    pub(super) custom_branding: bool,
}

impl From<&SubscriptionPlan> for PlanResponse {
    fn from(plan: &SubscriptionPlan) -> Self {
        Self {
            name: plan.name.clone(),
            tier: plan.tier.to_string(),
            price_monthly_cents: plan.price_monthly_cents,
            price_yearly_cents: plan.price_yearly_cents,
            credits_included: plan.credits_included,
            max_duration_seconds: plan.max_duration_seconds,
            priority_support: plan.priority_support,
            api_access: plan.api_access,
            custom_branding: plan.custom_branding,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionStatusResponse {
    pub(super) subscription: SubscriptionResponse,
    pub(super) credits_remaining: i64,
    pub(super) plan: Option<PlanResponse>,
}

#[derive(Deserialize, Debug, IntoParams, ToSchema)]
pub(super) struct PaginationParams {
    #[serde(default = "default_limit")]
    #[param(default = 50, maximum = 100)]
    pub(super) limit: i64,
    #[serde(default)]
    #[param(default = 0)]
    pub(super) offset: i64,
}

pub(super) fn default_limit() -> i64 {
    50
}

#[derive(Serialize, ToSchema)]
pub(super) struct PaymentResponse {
    pub(super) id: Uuid,
    pub(super) kind: String,
    pub(super) status: String,
    pub(super) amount_cents: i64,
    pub(super) currency: String,
    pub(super) credits: i64,
    pub(super) description: String,
    pub(super) created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            kind: p.kind.to_string(),
            status: p.status.to_string(),
            amount_cents: p.amount_cents,
            currency: p.currency,
            credits: p.credits,
            description: p.description,
            created_at: p.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct LedgerEntryResponse {
    pub(super) id: Uuid,
    #[schema(example = "generate")]
    pub(super) action: String,
    pub(super) delta: i64,
    pub(super) balance_after: i64,
    #[schema(value_type = Object)]
    pub(super) metadata: serde_json::Value,
    pub(super) created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            action: e.action.to_string(),
            delta: e.delta,
            balance_after: e.balance_after,
            metadata: e.metadata,
            created_at: e.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct HistoryResponse {
    pub(super) credits_remaining: i64,
    pub(super) credits_purchased: i64,
    pub(super) total_spent_cents: i64,
    pub(super) payments: Vec<PaymentResponse>,
    pub(super) ledger: Vec<LedgerEntryResponse>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct ModelResponse {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) provider: String,
    pub(super) credits_per_second: f64,
    pub(super) max_duration_seconds: u32,
}

impl From<&GenerationModel> for ModelResponse {
    fn from(m: &GenerationModel) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name.to_string(),
            provider: m.provider.to_string(),
            credits_per_second: f64::from(m.tenths_per_second) / 10.0,
            max_duration_seconds: m.max_duration_seconds,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ChargeRequest {
    #[schema(example = "kling-1.6")]
    pub(super) model_id: String,
    #[schema(example = 5)]
    pub(super) duration_seconds: u32,
    #[serde(default = "default_variations")]
    pub(super) variations: u32,
}

fn default_variations() -> u32 {
    1
}

#[derive(Serialize, ToSchema)]
pub(super) struct ChargeResponse {
    pub(super) model_id: String,
    pub(super) credits_charged: i64,
    pub(super) credits_remaining: i64,
}

impl From<GenerationCharge> for ChargeResponse {
    fn from(c: GenerationCharge) -> Self {
        Self {
            model_id: c.model_id,
            credits_charged: c.credits_charged,
            credits_remaining: c.balance,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct WebhookAck {
    pub(super) received: bool,
    #[schema(example = "applied")]
    pub(super) outcome: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct AdminGrantRequest {
    #[schema(example = 25)]
    pub(super) amount: i64,
    #[serde(default)]
    pub(super) reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct AdminGrantResponse {
    pub(super) account_id: Uuid,
    pub(super) credits_remaining: i64,
}
