use serde_json::json;
use std::sync::Arc;

use super::account::Account;
use super::event::{SubscriptionChange, SubscriptionEnded, SubscriptionInvoice};
use super::ledger::CreditGrant;
use super::payment::Payment;
use super::plan::{PlanCatalog, SubscriptionPlan};
use super::subscription::{Subscription, SubscriptionStateError};

/// A requested change to an account's subscription.
///
/// Storage decides it against the row it has locked for the write, so two
/// deliveries racing for the same account never act on a stale copy.
#[derive(Debug, Clone)]
pub enum SubscriptionTransition {
    InvoicePaid {
        invoice: SubscriptionInvoice,
        catalog: Arc<PlanCatalog>,
    },
    ProviderChanged(SubscriptionChange),
    ProviderEnded(SubscriptionEnded),
    CancellationRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEffect {
    /// A new plan took effect.
    Purchased,
    /// The current plan renewed.
    Renewed,
    /// No plan matched the invoice; status, period and spend were updated.
    Unmatched,
    Mirrored,
    Ended,
    CancellationRequested,
    /// The event names a subscription the account is no longer bound to.
    Stale,
    Rejected(SubscriptionStateError),
}

impl TransitionEffect {
    pub fn writes(&self) -> bool {
        !matches!(self, TransitionEffect::Stale | TransitionEffect::Rejected(_))
    }
}

/// Everything one transition writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub effect: TransitionEffect,
    pub subscription: Subscription,
    pub plan: Option<SubscriptionPlan>,
    pub grant: Option<CreditGrant>,
    /// Money paid that no grant carries into `total_spent_cents`.
    pub spend_cents: i64,
    pub payment: Option<Payment>,
}

impl TransitionWrite {
    fn only(effect: TransitionEffect, subscription: Subscription) -> Self {
        Self {
            effect,
            subscription,
            plan: None,
            grant: None,
            spend_cents: 0,
            payment: None,
        }
    }

    pub fn credits_granted(&self) -> i64 {
        self.grant.as_ref().map_or(0, |g| g.amount)
    }
}

/// What storage reports back after a transition.
#[derive(Debug, Clone)]
pub struct SubscriptionApplied {
    pub account: Account,
    pub effect: TransitionEffect,
    pub plan: Option<SubscriptionPlan>,
    pub credits_granted: i64,
}

impl SubscriptionTransition {
    pub fn decide(&self, account: &Account) -> TransitionWrite {
        let current = &account.subscription;
        match self {
            SubscriptionTransition::InvoicePaid { invoice, catalog } => {
                invoice_paid(account, invoice, catalog)
            }
            SubscriptionTransition::ProviderChanged(change) => {
                if is_stale(current, &change.subscription_id) {
                    return TransitionWrite::only(TransitionEffect::Stale, current.clone());
                }
                let mut subscription = current.clone();
                subscription.mirror_provider(change.status, change.cancel_at_period_end);
                TransitionWrite::only(TransitionEffect::Mirrored, subscription)
            }
            SubscriptionTransition::ProviderEnded(ended) => {
                if is_stale(current, &ended.subscription_id) {
                    return TransitionWrite::only(TransitionEffect::Stale, current.clone());
                }
                let mut subscription = current.clone();
                subscription.end();
                TransitionWrite::only(TransitionEffect::Ended, subscription)
            }
            SubscriptionTransition::CancellationRequested => {
                let mut subscription = current.clone();
                match subscription.request_cancellation() {
                    Ok(()) => {
                        TransitionWrite::only(TransitionEffect::CancellationRequested, subscription)
                    }
                    Err(e) => {
                        TransitionWrite::only(TransitionEffect::Rejected(e), current.clone())
                    }
                }
            }
        }
    }
}

fn is_stale(current: &Subscription, subscription_ref: &str) -> bool {
    matches!(current.provider_subscription_id.as_deref(), Some(bound) if bound != subscription_ref)
}

/// Price reference first; a paid account with an unknown price renews the
/// plan it is on.
fn resolve_plan<'a>(
    current: &Subscription,
    invoice: &SubscriptionInvoice,
    catalog: &'a PlanCatalog,
) -> Option<&'a SubscriptionPlan> {
    invoice
        .price_id
        .as_deref()
        .and_then(|price| catalog.by_price_ref(price))
        .or_else(|| {
            if current.tier.is_paid() {
                catalog.by_tier(current.tier)
            } else {
                None
            }
        })
}

fn invoice_paid(
    account: &Account,
    invoice: &SubscriptionInvoice,
    catalog: &PlanCatalog,
) -> TransitionWrite {
    let plan = resolve_plan(&account.subscription, invoice, catalog).cloned();
    let mut subscription = account.subscription.clone();

    let effect = match &plan {
        None => {
            subscription.renew(invoice.period_end);
            TransitionEffect::Unmatched
        }
        Some(plan) => {
            let new_subscription = invoice
                .subscription_id
                .as_deref()
                .map(|s| !subscription.is_current(s))
                .unwrap_or(false);
            if new_subscription || plan.tier != subscription.tier {
                subscription.activate(plan.tier, invoice.subscription_id.clone(), invoice.period_end);
                TransitionEffect::Purchased
            } else {
                subscription.renew(invoice.period_end);
                TransitionEffect::Renewed
            }
        }
    };

    let paid = invoice.amount_paid_cents.max(0);
    let grant = plan.as_ref().filter(|p| p.credits_included > 0).map(|p| {
        CreditGrant::plan_allotment(p.credits_included, paid).with_metadata(json!({
            "invoice_id": invoice.invoice_id,
            "tier": p.tier.to_string(),
        }))
    });
    let spend_cents = if grant.is_some() { 0 } else { paid };

    let payment = Payment::subscription_invoice(
        account.id,
        invoice.amount_paid_cents,
        invoice.currency.clone(),
        grant.as_ref().map_or(0, |g| g.amount),
        invoice.invoice_id.clone(),
        plan.as_ref().map_or("Unmatched", |p| p.name.as_str()),
    );

    TransitionWrite {
        effect,
        subscription,
        plan,
        grant,
        spend_cents,
        payment: Some(payment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::AccountRef;
    use crate::domain::{SubscriptionStatus, SubscriptionTier};
    use chrono::{Duration, Utc};

    fn catalog() -> Arc<PlanCatalog> {
        Arc::new(
            PlanCatalog::standard()
                .with_price_id(SubscriptionTier::Pro, Some("price_pro".to_string())),
        )
    }

    fn account() -> Account {
        Account::new("a@b.co".into(), "hash".into(), "A".into(), 10)
    }

    fn invoice(price: &str, subscription: &str, cents: i64) -> SubscriptionTransition {
        SubscriptionTransition::InvoicePaid {
            invoice: SubscriptionInvoice {
                invoice_id: "in_1".to_string(),
                account: AccountRef::default(),
                subscription_id: Some(subscription.to_string()),
                price_id: Some(price.to_string()),
                amount_paid_cents: cents,
                currency: "usd".to_string(),
                period_end: Some(Utc::now() + Duration::days(30)),
            },
            catalog: catalog(),
        }
    }

    #[test]
    fn first_paid_invoice_is_a_purchase_with_grant_and_payment() {
        let write = invoice("price_pro", "sub_1", 8_900).decide(&account());

        assert_eq!(write.effect, TransitionEffect::Purchased);
        assert_eq!(write.subscription.tier, SubscriptionTier::Pro);
        assert_eq!(write.credits_granted(), 100);
        assert_eq!(write.spend_cents, 0);
        let payment = write.payment.unwrap();
        assert_eq!(payment.credits, 100);
        assert_eq!(payment.description, "Pro subscription");
    }

    #[test]
    fn same_subscription_and_tier_renews() {
        let mut account = account();
        account.subscription.activate(SubscriptionTier::Pro, Some("sub_1".into()), None);

        let write = invoice("price_pro", "sub_1", 8_900).decide(&account);
        assert_eq!(write.effect, TransitionEffect::Renewed);
        assert_eq!(write.credits_granted(), 100);
    }

    #[test]
    fn unmatched_invoice_keeps_the_money_without_credits() {
        let write = invoice("price_unknown", "sub_9", 3_900).decide(&account());

        assert_eq!(write.effect, TransitionEffect::Unmatched);
        assert!(write.grant.is_none());
        assert_eq!(write.spend_cents, 3_900);
        assert_eq!(write.subscription.tier, SubscriptionTier::Free);
        assert_eq!(write.payment.unwrap().description, "Unmatched subscription");
    }

    #[test]
    fn provider_change_is_decided_against_the_current_binding() {
        let mut account = account();
        account.subscription.activate(SubscriptionTier::Pro, Some("sub_1".into()), None);
        let change = |id: &str| {
            SubscriptionTransition::ProviderChanged(SubscriptionChange {
                subscription_id: id.to_string(),
                account: AccountRef::default(),
                status: SubscriptionStatus::PastDue,
                cancel_at_period_end: false,
            })
        };

        let write = change("sub_1").decide(&account);
        assert_eq!(write.effect, TransitionEffect::Mirrored);
        assert_eq!(write.subscription.tier, SubscriptionTier::Pro);
        assert_eq!(write.subscription.status, SubscriptionStatus::PastDue);

        let write = change("sub_0").decide(&account);
        assert_eq!(write.effect, TransitionEffect::Stale);
        assert!(!write.effect.writes());
    }

    #[test]
    fn cancellation_without_subscription_is_rejected() {
        let write = SubscriptionTransition::CancellationRequested.decide(&account());
        assert_eq!(
            write.effect,
            TransitionEffect::Rejected(SubscriptionStateError::NoActiveSubscription)
        );
        assert!(!write.effect.writes());
    }
}
