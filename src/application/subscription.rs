use crate::domain::event::{SubscriptionChange, SubscriptionEnded, SubscriptionInvoice};
use crate::domain::{
    Account, PlanCatalog, SubscriptionPlan, SubscriptionStateError, SubscriptionTransition,
    TransitionEffect,
};
use crate::infrastructure::{AccountRepository, RepositoryError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    State(#[from] SubscriptionStateError),
}

/// How a paid invoice changed the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceEffect {
    /// A new plan took effect.
    Purchased,
    /// The current plan renewed.
    Renewed,
    /// No plan could be matched; only the status, period and spend were updated.
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct InvoiceApplied {
    pub account: Account,
    pub effect: InvoiceEffect,
    pub plan: Option<SubscriptionPlan>,
    pub credits_granted: i64,
}

/// Drives the per-account subscription state machine and persists each
/// transition together with any credit allotment it carries.
pub struct SubscriptionService<A>
where
    A: AccountRepository,
{
    account_repo: Arc<A>,
    catalog: Arc<PlanCatalog>,
}

impl<A> SubscriptionService<A>
where
    A: AccountRepository,
{
    pub fn new(account_repo: Arc<A>, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            account_repo,
            catalog,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub async fn status(&self, account_id: Uuid) -> Result<Account, SubscriptionError> {
        Ok(self.account_repo.get_by_id(account_id).await?)
    }

    /// Soft cancel. The plan stays in force until the provider ends it.
    pub async fn request_cancellation(&self, account_id: Uuid) -> Result<Account, SubscriptionError> {
        let applied = self
            .account_repo
            .apply_subscription(account_id, &SubscriptionTransition::CancellationRequested)
            .await?;
        if let TransitionEffect::Rejected(e) = applied.effect {
            return Err(e.into());
        }
        info!(account_id = %account_id, tier = %applied.account.subscription.tier, "Cancellation requested");
        Ok(applied.account)
    }

    /// Invoice paid: either a new plan took effect or the current one renewed.
    /// The plan's monthly credits, the amount paid and the payment row are
    /// written together with the new state.
    pub async fn apply_invoice(
        &self,
        account: &Account,
        invoice: &SubscriptionInvoice,
    ) -> Result<InvoiceApplied, SubscriptionError> {
        let transition = SubscriptionTransition::InvoicePaid {
            invoice: invoice.clone(),
            catalog: Arc::clone(&self.catalog),
        };
        let applied = self.account_repo.apply_subscription(account.id, &transition).await?;

        let effect = match applied.effect {
            TransitionEffect::Purchased => InvoiceEffect::Purchased,
            TransitionEffect::Renewed => InvoiceEffect::Renewed,
            _ => {
                warn!(
                    account_id = %account.id,
                    invoice_id = %invoice.invoice_id,
                    price_id = ?invoice.price_id,
                    "Invoice does not match any plan; no credits granted"
                );
                InvoiceEffect::Unmatched
            }
        };

        info!(
            account_id = %account.id,
            tier = %applied.account.subscription.tier,
            effect = ?effect,
            credits_granted = applied.credits_granted,
            "Subscription invoice applied"
        );

        Ok(InvoiceApplied {
            account: applied.account,
            effect,
            plan: applied.plan,
            credits_granted: applied.credits_granted,
        })
    }

    /// Mirrors a provider-side change. Changes to a subscription other than
    /// the one the account is bound to are stale and skipped.
    pub async fn mirror(
        &self,
        account: &Account,
        change: &SubscriptionChange,
    ) -> Result<Option<Account>, SubscriptionError> {
        let transition = SubscriptionTransition::ProviderChanged(change.clone());
        let Some(updated) = self.apply_provider(account, &transition, &change.subscription_id).await? else {
            return Ok(None);
        };

        info!(
            account_id = %account.id,
            status = %updated.subscription.status,
            cancel_at_period_end = change.cancel_at_period_end,
            "Subscription status mirrored"
        );
        Ok(Some(updated))
    }

    pub async fn end(
        &self,
        account: &Account,
        ended: &SubscriptionEnded,
    ) -> Result<Option<Account>, SubscriptionError> {
        let transition = SubscriptionTransition::ProviderEnded(ended.clone());
        let Some(updated) = self.apply_provider(account, &transition, &ended.subscription_id).await? else {
            return Ok(None);
        };

        info!(account_id = %account.id, "Subscription ended; account moved to free tier");
        Ok(Some(updated))
    }

    async fn apply_provider(
        &self,
        account: &Account,
        transition: &SubscriptionTransition,
        subscription_id: &str,
    ) -> Result<Option<Account>, SubscriptionError> {
        let applied = self.account_repo.apply_subscription(account.id, transition).await?;
        if applied.effect == TransitionEffect::Stale {
            warn!(
                account_id = %account.id,
                current = ?applied.account.subscription.provider_subscription_id,
                event_subscription = subscription_id,
                "Ignoring event for a subscription the account is no longer bound to"
            );
            return Ok(None);
        }
        Ok(Some(applied.account))
    }
}
