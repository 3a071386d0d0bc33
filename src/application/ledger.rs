use crate::domain::generation::{self, PricingError};
use crate::domain::{CreditGrant, LedgerEntry};
use crate::infrastructure::{AccountRepository, LedgerRepository, RepositoryError};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_HISTORY_PAGE: i64 = 100;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Result of a conditional deduction. A refused deduction is not an error:
/// the balance is simply left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied { balance: i64 },
    Insufficient { required: i64, available: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCharge {
    pub model_id: String,
    pub credits_charged: i64,
    pub balance: i64,
}

pub struct LedgerService<A, L>
where
    A: AccountRepository,
    L: LedgerRepository,
{
    account_repo: Arc<A>,
    ledger_repo: Arc<L>,
}

impl<A, L> LedgerService<A, L>
where
    A: AccountRepository,
    L: LedgerRepository,
{
    pub fn new(account_repo: Arc<A>, ledger_repo: Arc<L>) -> Self {
        Self {
            account_repo,
            ledger_repo,
        }
    }

    pub async fn balance(&self, account_id: Uuid) -> Result<i64, LedgerError> {
        Ok(self.account_repo.get_by_id(account_id).await?.credits_remaining)
    }

    pub async fn can_afford(&self, account_id: Uuid, amount: i64) -> Result<bool, LedgerError> {
        let account = self.account_repo.get_by_id(account_id).await?;
        Ok(account.can_afford(amount))
    }

    pub async fn deduct(
        &self,
        account_id: Uuid,
        amount: i64,
        metadata: serde_json::Value,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        match self.ledger_repo.debit(account_id, amount, metadata).await? {
            Some(balance) => {
                info!(account_id = %account_id, amount, balance, "Credits deducted");
                Ok(DebitOutcome::Applied { balance })
            }
            None => {
                let available = self.balance(account_id).await?;
                warn!(
                    account_id = %account_id,
                    required = amount,
                    available,
                    "Deduction refused: insufficient credits"
                );
                Ok(DebitOutcome::Insufficient {
                    required: amount,
                    available,
                })
            }
        }
    }

    pub async fn grant(&self, account_id: Uuid, grant: &CreditGrant) -> Result<i64, LedgerError> {
        if grant.amount <= 0 {
            return Err(LedgerError::InvalidAmount(grant.amount));
        }
        if grant.amount_paid_cents < 0 {
            return Err(LedgerError::InvalidAmount(grant.amount_paid_cents));
        }

        let balance = self.ledger_repo.credit(account_id, grant).await?;
        info!(
            account_id = %account_id,
            amount = grant.amount,
            source = %grant.source,
            balance,
            "Credits granted"
        );
        Ok(balance)
    }

    /// Prices a generation request and deducts it in one step.
    pub async fn charge_generation(
        &self,
        account_id: Uuid,
        model_id: &str,
        duration_seconds: u32,
        variations: u32,
    ) -> Result<GenerationCharge, LedgerError> {
        let cost = generation::quote(model_id, duration_seconds, variations)?;
        let metadata = json!({
            "model_id": model_id,
            "duration_seconds": duration_seconds,
            "variations": variations,
        });

        match self.deduct(account_id, cost, metadata).await? {
            DebitOutcome::Applied { balance } => Ok(GenerationCharge {
                model_id: model_id.to_string(),
                credits_charged: cost,
                balance,
            }),
            DebitOutcome::Insufficient {
                required,
                available,
            } => Err(LedgerError::InsufficientCredits {
                required,
                available,
            }),
        }
    }

    pub async fn history(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        let offset = offset.max(0);
        Ok(self
            .ledger_repo
            .list_entries(account_id, limit, offset)
            .await?)
    }
}
