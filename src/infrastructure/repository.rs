use crate::domain::{
    Account, AccountRole, CreditGrant, LedgerAction, LedgerEntry, Payment, Subscription,
    SubscriptionApplied, SubscriptionStatus, SubscriptionTier, SubscriptionTransition,
};
use crate::infrastructure::postgres_payment_repo::insert_payment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Profile fields a user may change on their own account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts the account together with its signup ledger entry.
    /// A taken email yields [`RepositoryError::Conflict`].
    #[must_use]
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_email(&self, email: &str) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_customer_ref(&self, customer_id: &str) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<(), RepositoryError>;
    #[must_use]
    async fn record_login(&self, id: Uuid) -> Result<(), RepositoryError>;
    #[must_use]
    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Only returns the account while the token is unexpired.
    #[must_use]
    async fn get_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError>;
    /// Replaces the password hash and clears any outstanding reset token.
    #[must_use]
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError>;
    /// Locks the account, decides `transition` against the row as stored and
    /// writes the resulting subscription state, grant, spend and payment row
    /// in one transaction. Stale or rejected transitions write nothing.
    #[must_use]
    async fn apply_subscription(
        &self,
        id: Uuid,
        transition: &SubscriptionTransition,
    ) -> Result<SubscriptionApplied, RepositoryError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Conditionally removes `amount` credits.
    ///
    /// Returns the new balance, or `None` when the balance could not cover
    /// the amount (in which case nothing changed).
    #[must_use]
    async fn debit(
        &self,
        account_id: Uuid,
        amount: i64,
        metadata: serde_json::Value,
    ) -> Result<Option<i64>, RepositoryError>;
    /// Applies a grant and returns the new balance.
    #[must_use]
    async fn credit(&self, account_id: Uuid, grant: &CreditGrant) -> Result<i64, RepositoryError>;
    /// Applies a paid grant and stores its payment row in the same
    /// transaction. Returns the new balance.
    #[must_use]
    async fn credit_with_payment(
        &self,
        account_id: Uuid,
        grant: &CreditGrant,
        payment: &Payment,
    ) -> Result<i64, RepositoryError>;
    #[must_use]
    async fn list_entries(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, RepositoryError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Payments are written alongside the grant or subscription change they
    /// pay for; see [`LedgerRepository::credit_with_payment`] and
    /// [`AccountRepository::apply_subscription`].
    #[must_use]
    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, RepositoryError>;
}

#[async_trait]
pub trait ProcessedEventRepository: Send + Sync {
    /// Insert-if-absent on the provider event id. `false` means some earlier
    /// delivery already claimed it.
    #[must_use]
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn record_outcome(
        &self,
        event_id: &str,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;
}

const ACCOUNT_COLUMNS: &str = r#"
    id, email, password_hash, first_name, last_name, company, role,
    credits_remaining, credits_purchased, total_spent_cents,
    subscription_tier, subscription_status, subscription_expires_at,
    cancel_at_period_end, provider_subscription_id, provider_customer_id,
    created_at, updated_at, last_login_at
"#;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
        label: String,
    ) -> Result<Account, RepositoryError> {
        let sql = format!("SELECT {} FROM accounts WHERE {}", ACCOUNT_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, label))?;

        row_to_account(&row)
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, password_hash, first_name, last_name, company, role,
                                  credits_remaining, credits_purchased, total_spent_cents,
                                  subscription_tier, subscription_status, subscription_expires_at,
                                  cancel_at_period_end, provider_subscription_id, provider_customer_id,
                                  created_at, updated_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.company)
        .bind(account.role.to_string())
        .bind(account.credits_remaining)
        .bind(account.credits_purchased)
        .bind(account.total_spent_cents)
        .bind(account.subscription.tier.to_string())
        .bind(account.subscription.status.to_string())
        .bind(account.subscription.expires_at)
        .bind(account.subscription.cancel_at_period_end)
        .bind(&account.subscription.provider_subscription_id)
        .bind(&account.provider_customer_id)
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(account.last_login_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("Account {}", account.email))
            } else {
                RepositoryError::DatabaseError(e)
            }
        })?;

        if account.credits_remaining > 0 {
            let entry = LedgerEntry::grant(
                account.id,
                &CreditGrant::signup(account.credits_remaining),
                account.credits_remaining,
            );
            insert_entry(&mut tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Account {}", id)))?;

        row_to_account(&row)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, RepositoryError> {
        self.fetch_one_where("email = $1", email, "Account by email".to_string())
            .await
    }

    async fn get_by_customer_ref(&self, customer_id: &str) -> Result<Account, RepositoryError> {
        self.fetch_one_where(
            "provider_customer_id = $1",
            customer_id,
            format!("Account for customer {}", customer_id),
        )
        .await
    }

    async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET provider_customer_id = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(customer_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("Customer {} already linked", customer_id))
            } else {
                RepositoryError::DatabaseError(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Account {}", id)));
        }
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE accounts SET last_login_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Account, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE accounts
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                company = COALESCE($3, company),
                updated_at = $4
            WHERE id = $5
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.company)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Account {}", id)))?;

        row_to_account(&row)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET reset_token_hash = $1, reset_token_expires_at = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE reset_token_hash = $1 AND reset_token_expires_at > $2",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "Reset token".to_string()))?;

        row_to_account(&row)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET password_hash = $1, reset_token_hash = NULL, reset_token_expires_at = NULL,
                updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_subscription(
        &self,
        id: Uuid,
        transition: &SubscriptionTransition,
    ) -> Result<SubscriptionApplied, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM accounts WHERE id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| not_found_or(e, format!("Account {}", id)))?;
        let current = row_to_account(&row)?;

        let write = transition.decide(&current);
        let credits_granted = write.credits_granted();
        if !write.effect.writes() {
            tx.rollback().await?;
            return Ok(SubscriptionApplied {
                account: current,
                effect: write.effect,
                plan: write.plan,
                credits_granted: 0,
            });
        }

        let subscription = &write.subscription;
        sqlx::query(
            r#"
            UPDATE accounts
            SET subscription_tier = $1, subscription_status = $2, subscription_expires_at = $3,
                cancel_at_period_end = $4, provider_subscription_id = $5,
                total_spent_cents = total_spent_cents + $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(subscription.tier.to_string())
        .bind(subscription.status.to_string())
        .bind(subscription.expires_at)
        .bind(subscription.cancel_at_period_end)
        .bind(&subscription.provider_subscription_id)
        .bind(write.spend_cents)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(grant) = &write.grant {
            apply_grant(&mut tx, id, grant).await?;
        }
        if let Some(payment) = &write.payment {
            insert_payment(&mut tx, payment).await?;
        }

        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_one(&mut *tx).await?;
        let account = row_to_account(&row)?;

        tx.commit().await?;
        Ok(SubscriptionApplied {
            account,
            effect: write.effect,
            plan: write.plan,
            credits_granted,
        })
    }
}

pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn debit(
        &self,
        account_id: Uuid,
        amount: i64,
        metadata: serde_json::Value,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap: the guard and the decrement are one statement.
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET credits_remaining = credits_remaining - $1, updated_at = $2
            WHERE id = $3 AND credits_remaining >= $1
            RETURNING credits_remaining
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(RepositoryError::NotFound(format!("Account {}", account_id)));
            }
            return Ok(None);
        };

        let balance: i64 = row.try_get("credits_remaining")?;
        let entry = LedgerEntry::debit(account_id, amount, balance, metadata);
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn credit(&self, account_id: Uuid, grant: &CreditGrant) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let balance = apply_grant(&mut tx, account_id, grant).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn credit_with_payment(
        &self,
        account_id: Uuid,
        grant: &CreditGrant,
        payment: &Payment,
    ) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let balance = apply_grant(&mut tx, account_id, grant).await?;
        insert_payment(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn list_entries(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, action, delta, balance_after, metadata, created_at
            FROM credit_ledger
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

async fn apply_grant(
    tx: &mut Transaction<'_, Postgres>,
    account_id: Uuid,
    grant: &CreditGrant,
) -> Result<i64, RepositoryError> {
    if grant.amount <= 0 {
        return Err(RepositoryError::InvalidData(format!(
            "Grant amount must be positive, got {}",
            grant.amount
        )));
    }
    let purchased = if grant.counts_as_purchase() {
        grant.amount
    } else {
        0
    };

    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET credits_remaining = credits_remaining + $1,
            credits_purchased = credits_purchased + $2,
            total_spent_cents = total_spent_cents + $3,
            updated_at = $4
        WHERE id = $5
        RETURNING credits_remaining
        "#,
    )
    .bind(grant.amount)
    .bind(purchased)
    .bind(grant.amount_paid_cents.max(0))
    .bind(Utc::now())
    .bind(account_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| not_found_or(e, format!("Account {}", account_id)))?;

    let balance: i64 = row.try_get("credits_remaining")?;
    insert_entry(tx, &LedgerEntry::grant(account_id, grant, balance)).await?;
    Ok(balance)
}

async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO credit_ledger (id, account_id, action, delta, balance_after, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.account_id)
    .bind(entry.action.to_string())
    .bind(entry.delta)
    .bind(entry.balance_after)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub(crate) fn not_found_or(e: sqlx::Error, what: String) -> RepositoryError {
    match e {
        sqlx::Error::RowNotFound => RepositoryError::NotFound(what),
        _ => RepositoryError::DatabaseError(e),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn parse_column<T: FromStr>(row: &sqlx::postgres::PgRow, column: &str) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column)?;
    T::from_str(&raw)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown {}: {}", column, raw)))
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let role: AccountRole = parse_column(row, "role")?;
    let tier: SubscriptionTier = parse_column(row, "subscription_tier")?;
    let status: SubscriptionStatus = parse_column(row, "subscription_status")?;

    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        company: row.try_get("company")?,
        role,
        credits_remaining: row.try_get("credits_remaining")?,
        credits_purchased: row.try_get("credits_purchased")?,
        total_spent_cents: row.try_get("total_spent_cents")?,
        subscription: Subscription {
            tier,
            status,
            expires_at: row.try_get("subscription_expires_at")?,
            cancel_at_period_end: row.try_get("cancel_at_period_end")?,
            provider_subscription_id: row.try_get("provider_subscription_id")?,
        },
        provider_customer_id: row.try_get("provider_customer_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, RepositoryError> {
    let action: LedgerAction = parse_column(row, "action")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        action,
        delta: row.try_get("delta")?,
        balance_after: row.try_get("balance_after")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = not_found_or(sqlx::Error::RowNotFound, "Account 1".to_string());
        assert!(matches!(err, RepositoryError::NotFound(ref what) if what == "Account 1"));

        let err = not_found_or(sqlx::Error::PoolTimedOut, "Account 1".to_string());
        assert!(matches!(err, RepositoryError::DatabaseError(_)));
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
