use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LedgerAction {
    Generate,
    Purchase,
    SubscriptionGrant,
    Promotional,
    Signup,
}

/// Where granted credits come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GrantSource {
    /// Paid credit pack. The only source counted in `credits_purchased`.
    Purchase,
    /// Monthly credits included with a plan.
    PlanAllotment,
    Promotional,
    Signup,
}

impl GrantSource {
    pub fn ledger_action(&self) -> LedgerAction {
        match self {
            GrantSource::Purchase => LedgerAction::Purchase,
            GrantSource::PlanAllotment => LedgerAction::SubscriptionGrant,
            GrantSource::Promotional => LedgerAction::Promotional,
            GrantSource::Signup => LedgerAction::Signup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditGrant {
    pub amount: i64,
    pub source: GrantSource,
    pub amount_paid_cents: i64,
    pub metadata: serde_json::Value,
}

impl CreditGrant {
    pub fn purchase(amount: i64, amount_paid_cents: i64) -> Self {
        Self {
            amount,
            source: GrantSource::Purchase,
            amount_paid_cents,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn plan_allotment(amount: i64, amount_paid_cents: i64) -> Self {
        Self {
            amount,
            source: GrantSource::PlanAllotment,
            amount_paid_cents,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn promotional(amount: i64) -> Self {
        Self {
            amount,
            source: GrantSource::Promotional,
            amount_paid_cents: 0,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn signup(amount: i64) -> Self {
        Self {
            amount,
            source: GrantSource::Signup,
            amount_paid_cents: 0,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn counts_as_purchase(&self) -> bool {
        self.source == GrantSource::Purchase
    }
}

/// One row of the credit audit trail. `delta` is negative for debits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub action: LedgerAction,
    pub delta: i64,
    pub balance_after: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn debit(
        account_id: Uuid,
        amount: i64,
        balance_after: i64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            action: LedgerAction::Generate,
            delta: -amount.abs(),
            balance_after,
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn grant(account_id: Uuid, grant: &CreditGrant, balance_after: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            action: grant.source.ledger_action(),
            delta: grant.amount,
            balance_after,
            metadata: grant.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}
