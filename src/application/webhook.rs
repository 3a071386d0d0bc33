use crate::application::subscription::{SubscriptionError, SubscriptionService};
use crate::domain::event::{CreditPurchase, SubscriptionInvoice};
use crate::domain::{
    Account, AccountRef, CreditGrant, EventParseError, Payment, PaymentEvent, RawEvent,
};
use crate::infrastructure::{
    AccountRepository, LedgerRepository, ProcessedEventRepository, RepositoryError, SignatureError, WebhookSignatureVerifier,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that reject a delivery outright. Anything that goes wrong after
/// the event has been claimed is reported as [`WebhookOutcome::Failed`].
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("Malformed event: {0}")]
    MalformedEnvelope(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    Ignored,
    Failed(String),
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("No account matches customer {customer:?} / user {account:?}")]
    UnknownAccount {
        customer: Option<String>,
        account: Option<String>,
    },
    #[error(transparent)]
    Parse(#[from] EventParseError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Translates verified provider webhooks into ledger and subscription
/// transitions. Each event id is applied at most once.
pub struct PaymentEventAdapter<A, L, E>
where
    A: AccountRepository,
    L: LedgerRepository,
    E: ProcessedEventRepository,
{
    verifier: Arc<WebhookSignatureVerifier>,
    account_repo: Arc<A>,
    ledger_repo: Arc<L>,
    event_repo: Arc<E>,
    subscriptions: Arc<SubscriptionService<A>>,
}

impl<A, L, E> PaymentEventAdapter<A, L, E>
where
    A: AccountRepository,
    L: LedgerRepository,
    E: ProcessedEventRepository,
{
    pub fn new(
        verifier: Arc<WebhookSignatureVerifier>,
        account_repo: Arc<A>,
        ledger_repo: Arc<L>,
            event_repo: Arc<E>,
        subscriptions: Arc<SubscriptionService<A>>,
    ) -> Self {
        Self {
            verifier,
            account_repo,
            ledger_repo,
            event_repo,
            subscriptions,
        }
    }

    /// Verifies, de-duplicates and applies one delivery.
    ///
    /// `now` is the current unix time, used for the signature tolerance check.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verifier.verify(payload, signature, now).map_err(|e| {
            warn!(error = %e, "Rejected webhook with bad signature");
            e
        })?;

        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedEnvelope(e.to_string()))?;

        if !self.event_repo.claim(&raw.id, &raw.event_type).await? {
            info!(event_id = %raw.id, event_type = %raw.event_type, "Duplicate webhook delivery ignored");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.dispatch(&raw).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    event_id = %raw.id,
                    event_type = %raw.event_type,
                    error = %e,
                    "Webhook handler failed"
                );
                WebhookOutcome::Failed(e.to_string())
            }
        };

        let detail = match &outcome {
            WebhookOutcome::Failed(msg) => Some(msg.as_str()),
            _ => None,
        };
        if let Err(e) = self
            .event_repo
            .record_outcome(&raw.id, outcome.as_str(), detail)
            .await
        {
            error!(event_id = %raw.id, error = %e, "Failed to record webhook outcome");
        }

        Ok(outcome)
    }

    async fn dispatch(&self, raw: &RawEvent) -> Result<WebhookOutcome, HandlerError> {
        match PaymentEvent::from_raw(raw)? {
            PaymentEvent::CreditPurchaseSucceeded(purchase) => {
                self.credit_purchase(&purchase).await?;
                Ok(WebhookOutcome::Applied)
            }
            PaymentEvent::SubscriptionPaymentSucceeded(invoice) => {
                self.subscription_invoice(&invoice).await?;
                Ok(WebhookOutcome::Applied)
            }
            PaymentEvent::SubscriptionUpdated(change) => {
                let account = self.resolve_account(&change.account).await?;
                match self.subscriptions.mirror(&account, &change).await? {
                    Some(_) => Ok(WebhookOutcome::Applied),
                    None => Ok(WebhookOutcome::Ignored),
                }
            }
            PaymentEvent::SubscriptionDeleted(ended) => {
                let account = self.resolve_account(&ended.account).await?;
                match self.subscriptions.end(&account, &ended).await? {
                    Some(_) => Ok(WebhookOutcome::Applied),
                    None => Ok(WebhookOutcome::Ignored),
                }
            }
            PaymentEvent::Unrecognized(event_type) => {
                info!(event_id = %raw.id, event_type = %event_type, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn credit_purchase(&self, purchase: &CreditPurchase) -> Result<(), HandlerError> {
        let account = self.resolve_account(&purchase.account).await?;
        let grant = CreditGrant::purchase(purchase.credits, purchase.amount_cents.max(0))
            .with_metadata(json!({ "payment_intent_id": purchase.payment_intent_id }));

        let payment = Payment::credit_purchase(
            account.id,
            purchase.amount_cents,
            purchase.currency.clone(),
            purchase.credits,
            purchase.payment_intent_id.clone(),
        );
        let balance = self
            .ledger_repo
            .credit_with_payment(account.id, &grant, &payment)
            .await?;

        info!(
            account_id = %account.id,
            credits = purchase.credits,
            amount_cents = purchase.amount_cents,
            balance,
            "Credit purchase applied"
        );
        Ok(())
    }

    async fn subscription_invoice(&self, invoice: &SubscriptionInvoice) -> Result<(), HandlerError> {
        let account = self.resolve_account(&invoice.account).await?;
        self.subscriptions.apply_invoice(&account, invoice).await?;
        Ok(())
    }

    /// Customer reference first, then the account id carried in metadata.
    /// A metadata match links the customer reference for next time.
    async fn resolve_account(&self, reference: &AccountRef) -> Result<Account, HandlerError> {
        if let Some(customer) = reference.customer_id.as_deref() {
            match self.account_repo.get_by_customer_ref(customer).await {
                Ok(account) => return Ok(account),
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(account_id) = reference.account_id {
            match self.account_repo.get_by_id(account_id).await {
                Ok(mut account) => {
                    if let Some(customer) = reference.customer_id.as_deref() {
                        if account.provider_customer_id.is_none() {
                            match self.account_repo.link_customer(account.id, customer).await {
                                Ok(()) => account.provider_customer_id = Some(customer.to_string()),
                                Err(e) => warn!(
                                    account_id = %account.id,
                                    error = %e,
                                    "Could not link provider customer"
                                ),
                            }
                        }
                    }
                    return Ok(account);
                }
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(HandlerError::UnknownAccount {
            customer: reference.customer_id.clone(),
            account: reference.account_id.map(|id| id.to_string()),
        })
    }
}
