use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::subscription::SubscriptionStatus;

pub const CREDIT_PURCHASE_SUCCEEDED: &str = "payment_intent.succeeded";
pub const SUBSCRIPTION_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Outer envelope of a provider webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: RawEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEventData {
    pub object: Value,
}

#[derive(Error, Debug, PartialEq)]
pub enum EventParseError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid field: {0}")]
    InvalidField(&'static str),
}

/// How a provider object points back at one of our accounts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountRef {
    pub customer_id: Option<String>,
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditPurchase {
    pub payment_intent_id: String,
    pub account: AccountRef,
    pub credits: i64,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInvoice {
    pub invoice_id: String,
    pub account: AccountRef,
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub account: AccountRef,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEnded {
    pub subscription_id: String,
    pub account: AccountRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    CreditPurchaseSucceeded(CreditPurchase),
    SubscriptionPaymentSucceeded(SubscriptionInvoice),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionEnded),
    Unrecognized(String),
}

impl PaymentEvent {
    pub fn from_raw(raw: &RawEvent) -> Result<Self, EventParseError> {
        let obj = &raw.data.object;
        match raw.event_type.as_str() {
            CREDIT_PURCHASE_SUCCEEDED => Ok(Self::CreditPurchaseSucceeded(CreditPurchase {
                payment_intent_id: required_id(obj, "id")?,
                account: account_ref(obj),
                credits: metadata_int(obj, "credits_amount")?,
                amount_cents: int_at(obj, &["amount"]).unwrap_or(0),
                currency: currency(obj),
            })),
            SUBSCRIPTION_PAYMENT_SUCCEEDED => {
                let line = jget(obj, &["lines", "data", "0"]);
                let period_end = line
                    .and_then(|l| int_at(l, &["period", "end"]))
                    .or_else(|| int_at(obj, &["period_end"]))
                    .map(timestamp)
                    .transpose()?;
                Ok(Self::SubscriptionPaymentSucceeded(SubscriptionInvoice {
                    invoice_id: required_id(obj, "id")?,
                    account: account_ref(obj),
                    subscription_id: obj.get("subscription").and_then(id_of),
                    price_id: line
                        .and_then(|l| jget(l, &["price", "id"]))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    amount_paid_cents: int_at(obj, &["amount_paid"]).unwrap_or(0),
                    currency: currency(obj),
                    period_end,
                }))
            }
            SUBSCRIPTION_UPDATED => {
                let status = obj
                    .get("status")
                    .and_then(Value::as_str)
                    .ok_or(EventParseError::MissingField("status"))?;
                Ok(Self::SubscriptionUpdated(SubscriptionChange {
                    subscription_id: required_id(obj, "id")?,
                    account: account_ref(obj),
                    status: SubscriptionStatus::from_str(status)
                        .map_err(|_| EventParseError::InvalidField("status"))?,
                    cancel_at_period_end: obj
                        .get("cancel_at_period_end")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }))
            }
            SUBSCRIPTION_DELETED => Ok(Self::SubscriptionDeleted(SubscriptionEnded {
                subscription_id: required_id(obj, "id")?,
                account: account_ref(obj),
            })),
            other => Ok(Self::Unrecognized(other.to_string())),
        }
    }
}

// Nested lookup; numeric segments index into arrays.
fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = match cur {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => cur.get(*key)?,
        };
    }
    Some(cur)
}

fn int_at(val: &Value, path: &[&str]) -> Option<i64> {
    jget(val, path)?.as_i64()
}

/// Reference fields arrive either as a bare id or as an expanded object.
fn id_of(val: &Value) -> Option<String> {
    match val {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn required_id(obj: &Value, field: &'static str) -> Result<String, EventParseError> {
    obj.get(field)
        .and_then(id_of)
        .ok_or(EventParseError::MissingField(field))
}

fn currency(obj: &Value) -> String {
    obj.get("currency")
        .and_then(Value::as_str)
        .unwrap_or("usd")
        .to_lowercase()
}

fn account_ref(obj: &Value) -> AccountRef {
    let user_id = jget(obj, &["metadata", "user_id"])
        .or_else(|| jget(obj, &["subscription_details", "metadata", "user_id"]))
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());
    AccountRef {
        customer_id: obj.get("customer").and_then(id_of),
        account_id: user_id,
    }
}

// Metadata values are strings on the wire; tolerate numbers too.
fn metadata_int(obj: &Value, key: &'static str) -> Result<i64, EventParseError> {
    let raw = jget(obj, &["metadata", key]).ok_or(EventParseError::MissingField(key))?;
    let parsed = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(EventParseError::InvalidField(key)),
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, EventParseError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(EventParseError::InvalidField("period_end"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event_type: &str, object: Value) -> RawEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_700_000_000,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn parses_credit_purchase_with_string_metadata() {
        let user = Uuid::new_v4();
        let event = raw(
            CREDIT_PURCHASE_SUCCEEDED,
            json!({
                "id": "pi_1",
                "amount": 500,
                "currency": "USD",
                "customer": "cus_1",
                "metadata": { "user_id": user.to_string(), "credits_amount": "50" }
            }),
        );

        match PaymentEvent::from_raw(&event).unwrap() {
            PaymentEvent::CreditPurchaseSucceeded(p) => {
                assert_eq!(p.credits, 50);
                assert_eq!(p.amount_cents, 500);
                assert_eq!(p.currency, "usd");
                assert_eq!(p.account.account_id, Some(user));
                assert_eq!(p.account.customer_id.as_deref(), Some("cus_1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn credit_purchase_requires_positive_amount() {
        let event = raw(
            CREDIT_PURCHASE_SUCCEEDED,
            json!({ "id": "pi_1", "amount": 0, "metadata": { "credits_amount": "0" } }),
        );
        assert_eq!(
            PaymentEvent::from_raw(&event),
            Err(EventParseError::InvalidField("credits_amount"))
        );
    }

    #[test]
    fn parses_invoice_line_period_and_price() {
        let event = raw(
            SUBSCRIPTION_PAYMENT_SUCCEEDED,
            json!({
                "id": "in_1",
                "customer": { "id": "cus_9" },
                "subscription": "sub_9",
                "amount_paid": 8900,
                "lines": { "data": [
                    { "period": { "end": 1_800_000_000 }, "price": { "id": "price_pro" } }
                ]}
            }),
        );

        match PaymentEvent::from_raw(&event).unwrap() {
            PaymentEvent::SubscriptionPaymentSucceeded(inv) => {
                assert_eq!(inv.subscription_id.as_deref(), Some("sub_9"));
                assert_eq!(inv.price_id.as_deref(), Some("price_pro"));
                assert_eq!(inv.account.customer_id.as_deref(), Some("cus_9"));
                assert_eq!(inv.period_end.unwrap().timestamp(), 1_800_000_000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn subscription_update_maps_provider_spelling() {
        let event = raw(
            SUBSCRIPTION_UPDATED,
            json!({ "id": "sub_1", "customer": "cus_1", "status": "canceled", "cancel_at_period_end": true }),
        );
        match PaymentEvent::from_raw(&event).unwrap() {
            PaymentEvent::SubscriptionUpdated(change) => {
                assert_eq!(change.status, SubscriptionStatus::Cancelled);
                assert!(change.cancel_at_period_end);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let bad = raw(SUBSCRIPTION_UPDATED, json!({ "id": "sub_1", "status": "weird" }));
        assert_eq!(
            PaymentEvent::from_raw(&bad),
            Err(EventParseError::InvalidField("status"))
        );
    }

    #[test]
    fn unknown_types_are_unrecognized() {
        let event = raw("charge.refunded", json!({ "id": "ch_1" }));
        assert_eq!(
            PaymentEvent::from_raw(&event).unwrap(),
            PaymentEvent::Unrecognized("charge.refunded".to_string())
        );
    }
}
