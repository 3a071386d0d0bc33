use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::ledger::CreditGrant;
use super::subscription::Subscription;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub role: AccountRole,
    pub credits_remaining: i64,
    pub credits_purchased: i64,
    pub total_spent_cents: i64,
    pub subscription: Subscription,
    pub provider_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountRole {
    User,
    Admin,
}

impl Account {
    pub fn new(email: String, password_hash: String, first_name: String, signup_credits: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email),
            password_hash,
            first_name,
            last_name: None,
            company: None,
            role: AccountRole::User,
            credits_remaining: signup_credits.max(0),
            credits_purchased: 0,
            total_spent_cents: 0,
            subscription: Subscription::default(),
            provider_customer_id: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }

    /// A deduction of `amount` would leave the balance non-negative.
    pub fn can_afford(&self, amount: i64) -> bool {
        amount > 0 && self.credits_remaining >= amount
    }

    /// Returns `false` and leaves the balance untouched when the account
    /// cannot cover `amount`.
    pub fn deduct(&mut self, amount: i64) -> bool {
        if !self.can_afford(amount) {
            return false;
        }
        self.credits_remaining -= amount;
        self.updated_at = Utc::now();
        true
    }

    pub fn grant(&mut self, grant: &CreditGrant) {
        let amount = grant.amount.max(0);
        self.credits_remaining += amount;
        if grant.counts_as_purchase() {
            self.credits_purchased += amount;
        }
        self.total_spent_cents += grant.amount_paid_cents.max(0);
        self.updated_at = Utc::now();
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(credits: i64) -> Account {
        Account::new(
            "Maker@Example.com ".to_string(),
            "hash".to_string(),
            "Ada".to_string(),
            credits,
        )
    }

    #[test]
    fn new_account_starts_on_free_tier_with_signup_credits() {
        let acct = account(10);
        assert_eq!(acct.email, "maker@example.com");
        assert_eq!(acct.credits_remaining, 10);
        assert_eq!(acct.credits_purchased, 0);
        assert_eq!(acct.role, AccountRole::User);
        assert!(!acct.subscription.tier.is_paid());
    }

    #[test]
    fn over_deduction_leaves_balance_unchanged() {
        let mut acct = account(10);
        assert!(acct.deduct(5));
        assert_eq!(acct.credits_remaining, 5);

        assert!(!acct.deduct(10));
        assert_eq!(acct.credits_remaining, 5);
    }

    #[test]
    fn non_positive_amounts_are_not_deductible() {
        let mut acct = account(10);
        assert!(!acct.can_afford(0));
        assert!(!acct.deduct(-3));
        assert_eq!(acct.credits_remaining, 10);
    }

    #[test]
    fn grants_commute() {
        let a = CreditGrant::purchase(25, 250);
        let b = CreditGrant::plan_allotment(100, 8900);

        let mut first = account(10);
        first.grant(&a);
        first.grant(&b);

        let mut second = account(10);
        second.grant(&b);
        second.grant(&a);

        assert_eq!(first.credits_remaining, second.credits_remaining);
        assert_eq!(first.credits_purchased, second.credits_purchased);
        assert_eq!(first.total_spent_cents, second.total_spent_cents);
        assert_eq!(first.credits_remaining, 135);
        assert_eq!(first.credits_purchased, 25);
        assert_eq!(first.total_spent_cents, 9150);
    }

    #[test]
    fn full_name_skips_missing_last_name() {
        let mut acct = account(0);
        assert_eq!(acct.full_name(), "Ada");
        acct.last_name = Some("Lovelace".to_string());
        assert_eq!(acct.full_name(), "Ada Lovelace");
    }
}
