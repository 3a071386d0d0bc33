use crate::application::{AuthService, LedgerService, PaymentEventAdapter, SubscriptionService};
use crate::infrastructure::{
    AppConfig, LoggingResetNotifier, PasswordHasher, PostgresAccountRepository,
    PostgresLedgerRepository, PostgresPaymentRepository, PostgresProcessedEventRepository,
    TokenService, WebhookSignatureVerifier,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

pub type LedgerServiceType = LedgerService<PostgresAccountRepository, PostgresLedgerRepository>;

pub type SubscriptionServiceType = SubscriptionService<PostgresAccountRepository>;

pub type PaymentEventAdapterType = PaymentEventAdapter<
    PostgresAccountRepository,
    PostgresLedgerRepository,
    PostgresProcessedEventRepository,
>;

pub type AuthServiceType = AuthService<PostgresAccountRepository, LoggingResetNotifier>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub payment_repo: Arc<PostgresPaymentRepository>,
    pub auth: Arc<AuthServiceType>,
    pub ledger: Arc<LedgerServiceType>,
    pub subscriptions: Arc<SubscriptionServiceType>,
    pub webhooks: Arc<PaymentEventAdapterType>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    anyhow::ensure!(!config.jwt_secret.is_empty(), "jwt_secret must be set");
    anyhow::ensure!(!config.webhook_secret.is_empty(), "webhook_secret must be set");

    let catalog = Arc::new(config.plan_catalog());
    let tokens = Arc::new(TokenService::new(&config.jwt_secret, config.token_ttl_days));
    let verifier = Arc::new(WebhookSignatureVerifier::new(
        config.webhook_secret.as_bytes(),
        config.webhook_tolerance_secs,
    ));

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let ledger_repo = Arc::new(PostgresLedgerRepository::new(pool.clone()));
    let payment_repo = Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let event_repo = Arc::new(PostgresProcessedEventRepository::new(pool.clone()));

    let auth = Arc::new(AuthService::new(
        account_repo.clone(),
        Arc::new(LoggingResetNotifier),
        tokens,
        PasswordHasher::new(config.bcrypt_cost),
        config.signup_credits,
        config.password_reset_ttl_minutes,
    ));

    let ledger = Arc::new(LedgerService::new(account_repo.clone(), ledger_repo.clone()));
    let subscriptions = Arc::new(SubscriptionService::new(account_repo.clone(), catalog));

    let webhooks = Arc::new(PaymentEventAdapter::new(
        verifier,
        account_repo,
        ledger_repo,
        event_repo,
        subscriptions.clone(),
    ));

    Ok(AppState {
        pool,
        payment_repo,
        auth,
        ledger,
        subscriptions,
        webhooks,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
