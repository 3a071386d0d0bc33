use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Starter,
    Pro,
    Business,
    Enterprise,
}

impl SubscriptionTier {
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

/// Provider-reported subscription status.
///
/// The provider spells the terminal state `canceled`; both spellings parse to
/// [`SubscriptionStatus::Cancelled`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    #[strum(to_string = "cancelled", serialize = "canceled")]
    #[serde(alias = "canceled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionStateError {
    #[error("No active subscription found")]
    NoActiveSubscription,
}

/// Subscription state carried on every account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub provider_subscription_id: Option<String>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            tier: SubscriptionTier::Free,
            status: SubscriptionStatus::Active,
            expires_at: None,
            cancel_at_period_end: false,
            provider_subscription_id: None,
        }
    }
}

impl Subscription {
    /// True when `subscription_ref` is the provider subscription this account
    /// is currently bound to.
    pub fn is_current(&self, subscription_ref: &str) -> bool {
        self.provider_subscription_id.as_deref() == Some(subscription_ref)
    }

    /// Checkout of a (new) plan succeeded.
    pub fn activate(
        &mut self,
        tier: SubscriptionTier,
        subscription_ref: Option<String>,
        period_end: Option<DateTime<Utc>>,
    ) {
        self.tier = tier;
        self.status = SubscriptionStatus::Active;
        self.cancel_at_period_end = false;
        if subscription_ref.is_some() {
            self.provider_subscription_id = subscription_ref;
        }
        if period_end.is_some() {
            self.expires_at = period_end;
        }
    }

    /// Recurring payment succeeded. The renewal date only moves forward.
    pub fn renew(&mut self, period_end: Option<DateTime<Utc>>) {
        self.status = SubscriptionStatus::Active;
        if let Some(end) = period_end {
            self.expires_at = Some(match self.expires_at {
                Some(current) if current > end => current,
                _ => end,
            });
        }
    }

    /// Provider changed the subscription on its side.
    pub fn mirror_provider(&mut self, status: SubscriptionStatus, cancel_at_period_end: bool) {
        self.status = status;
        self.cancel_at_period_end = cancel_at_period_end;
    }

    /// User asked to cancel; takes effect when the provider ends the period.
    pub fn request_cancellation(&mut self) -> Result<(), SubscriptionStateError> {
        if self.provider_subscription_id.is_none() {
            return Err(SubscriptionStateError::NoActiveSubscription);
        }
        self.cancel_at_period_end = true;
        Ok(())
    }

    /// Provider confirmed the subscription is gone.
    pub fn end(&mut self) {
        self.tier = SubscriptionTier::Free;
        self.status = SubscriptionStatus::Cancelled;
        self.provider_subscription_id = None;
        self.cancel_at_period_end = false;
        self.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn paid(tier: SubscriptionTier) -> Subscription {
        let mut sub = Subscription::default();
        sub.activate(tier, Some("sub_123".to_string()), Some(Utc::now() + Duration::days(30)));
        sub
    }

    #[test]
    fn status_parses_both_spellings_of_cancelled() {
        assert_eq!(SubscriptionStatus::from_str("canceled").unwrap(), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::from_str("cancelled").unwrap(), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(SubscriptionStatus::from_str("past_due").unwrap(), SubscriptionStatus::PastDue);
        assert!(SubscriptionStatus::from_str("bogus").is_err());
    }

    #[test]
    fn activate_sets_tier_status_and_reference() {
        let end = Utc::now() + Duration::days(30);
        let mut sub = Subscription::default();
        sub.cancel_at_period_end = true;
        sub.activate(SubscriptionTier::Pro, Some("sub_1".to_string()), Some(end));

        assert_eq!(sub.tier, SubscriptionTier::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, Some(end));
        assert!(sub.is_current("sub_1"));
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn renew_never_moves_expiry_backwards() {
        let mut sub = paid(SubscriptionTier::Starter);
        let current = sub.expires_at.unwrap();

        sub.renew(Some(current - Duration::days(5)));
        assert_eq!(sub.expires_at, Some(current));

        let later = current + Duration::days(30);
        sub.status = SubscriptionStatus::PastDue;
        sub.renew(Some(later));
        assert_eq!(sub.expires_at, Some(later));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn user_cancellation_is_soft() {
        let mut sub = paid(SubscriptionTier::Business);
        sub.request_cancellation().unwrap();

        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.tier, SubscriptionTier::Business);
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn cancellation_without_provider_subscription_fails() {
        let mut sub = Subscription::default();
        assert_eq!(
            sub.request_cancellation(),
            Err(SubscriptionStateError::NoActiveSubscription)
        );
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn end_resets_to_free_and_clears_reference() {
        let mut sub = paid(SubscriptionTier::Enterprise);
        sub.end();

        assert_eq!(sub.tier, SubscriptionTier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(sub.provider_subscription_id.is_none());
        assert!(sub.expires_at.is_none());
    }

    #[test]
    fn mirror_provider_copies_status_verbatim() {
        let mut sub = paid(SubscriptionTier::Pro);
        sub.mirror_provider(SubscriptionStatus::PastDue, true);
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.tier, SubscriptionTier::Pro);
    }
}
