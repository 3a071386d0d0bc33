use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::{PlanCatalog, SubscriptionTier};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,

    // Auth
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub password_reset_ttl_minutes: i64,
    pub signup_credits: i64,

    // Payment provider webhooks
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub starter_price_id: Option<String>,
    pub pro_price_id: Option<String>,
    pub business_price_id: Option<String>,
    pub enterprise_price_id: Option<String>,
}

impl AppConfig {
    /// Loads `config/default`, `config/local` and `VIDCRAFT_*` variables.
    ///
    /// Keys containing underscores map directly, e.g. `VIDCRAFT_JWT_SECRET`
    /// sets `jwt_secret`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("VIDCRAFT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("token_ttl_days", 7)?
            .set_default("bcrypt_cost", 12)?
            .set_default("password_reset_ttl_minutes", 60)?
            .set_default("signup_credits", 10)?
            .set_default("webhook_tolerance_secs", 300)?
            .build()?;

        config.try_deserialize()
    }

    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::standard()
            .with_price_id(SubscriptionTier::Starter, self.starter_price_id.clone())
            .with_price_id(SubscriptionTier::Pro, self.pro_price_id.clone())
            .with_price_id(SubscriptionTier::Business, self.business_price_id.clone())
            .with_price_id(SubscriptionTier::Enterprise, self.enterprise_price_id.clone())
    }
}
