use async_trait::async_trait;
use crate::domain::{Payment, PaymentKind, PaymentStatus};
use crate::infrastructure::repository::parse_column;
use crate::infrastructure::{PaymentRepository, ProcessedEventRepository, RepositoryError};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, kind, status, amount_cents, currency, credits,
                   provider_payment_intent_id, provider_invoice_id, description, created_at
            FROM payments
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_payment).collect()
    }
}

/// Re-recording the same provider payment is a no-op.
pub(crate) async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, account_id, kind, status, amount_cents, currency, credits,
                              provider_payment_intent_id, provider_invoice_id, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(payment.id)
    .bind(payment.account_id)
    .bind(payment.kind.to_string())
    .bind(payment.status.to_string())
    .bind(payment.amount_cents)
    .bind(&payment.currency)
    .bind(payment.credits)
    .bind(&payment.provider_payment_intent_id)
    .bind(&payment.provider_invoice_id)
    .bind(&payment.description)
    .bind(payment.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Result<Payment, RepositoryError> {
    let kind: PaymentKind = parse_column(row, "kind")?;
    let status: PaymentStatus = parse_column(row, "status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        kind,
        status,
        amount_cents: row.try_get("amount_cents")?,
        currency: row.try_get("currency")?,
        credits: row.try_get("credits")?,
        provider_payment_intent_id: row.try_get("provider_payment_intent_id")?,
        provider_invoice_id: row.try_get("provider_invoice_id")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresProcessedEventRepository {
    pool: PgPool,
}

impl PostgresProcessedEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventRepository for PostgresProcessedEventRepository {
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcome(
        &self,
        event_id: &str,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE processed_events
            SET outcome = $1, error = $2, processed_at = $3
            WHERE event_id = $4
            "#,
        )
        .bind(outcome)
        .bind(error)
        .bind(Utc::now())
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
