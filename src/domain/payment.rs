use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentKind {
    Credits,
    Subscription,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: PaymentKind,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub credits: i64,
    pub provider_payment_intent_id: Option<String>,
    pub provider_invoice_id: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn credit_purchase(
        account_id: Uuid,
        amount_cents: i64,
        currency: String,
        credits: i64,
        payment_intent_id: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind: PaymentKind::Credits,
            status: PaymentStatus::Succeeded,
            amount_cents,
            currency,
            credits,
            provider_payment_intent_id: Some(payment_intent_id),
            provider_invoice_id: None,
            description: format!("Purchase of {} credits", credits),
            created_at: Utc::now(),
        }
    }

    pub fn subscription_invoice(
        account_id: Uuid,
        amount_cents: i64,
        currency: String,
        credits: i64,
        invoice_id: String,
        plan_name: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind: PaymentKind::Subscription,
            status: PaymentStatus::Succeeded,
            amount_cents,
            currency,
            credits,
            provider_payment_intent_id: None,
            provider_invoice_id: Some(invoice_id),
            description: format!("{} subscription", plan_name),
            created_at: Utc::now(),
        }
    }
}
