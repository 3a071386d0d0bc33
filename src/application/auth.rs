use crate::domain::{normalize_email, Account};
use crate::infrastructure::{
    generate_reset_token, hash_reset_token, AccountRepository, Claims, PasswordHasher,
    ProfileUpdate, RepositoryError, ResetNotifier, TokenError, TokenService,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("User with this email already exists")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid or expired reset token")]
    InvalidResetToken,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AuthError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => AuthError::AccountNotFound,
            RepositoryError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Repository(other),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => AuthError::InvalidToken,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RegisterInput {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Validate)]
struct NewPassword {
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    password: String,
}

/// A signed-in account and its bearer token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub account: Account,
    pub token: String,
}

pub struct AuthService<A, N>
where
    A: AccountRepository,
    N: ResetNotifier,
{
    account_repo: Arc<A>,
    notifier: Arc<N>,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
    /// Verified against when the email is unknown so both login failures
    /// cost one bcrypt check.
    decoy_hash: String,
    signup_credits: i64,
    reset_ttl: Duration,
}

impl<A, N> AuthService<A, N>
where
    A: AccountRepository,
    N: ResetNotifier,
{
    pub fn new(
        account_repo: Arc<A>,
        notifier: Arc<N>,
        tokens: Arc<TokenService>,
        hasher: PasswordHasher,
        signup_credits: i64,
        reset_ttl_minutes: i64,
    ) -> Self {
        let decoy_hash = hasher.hash(&generate_reset_token()).unwrap_or_else(|e| {
            warn!(error = %e, "Could not prepare login decoy hash");
            String::new()
        });
        Self {
            account_repo,
            notifier,
            tokens,
            hasher,
            decoy_hash,
            signup_credits,
            reset_ttl: Duration::minutes(reset_ttl_minutes),
        }
    }

    pub async fn register(&self, mut input: RegisterInput) -> Result<AuthSession, AuthError> {
        input.email = normalize_email(&input.email);
        input.first_name = input.first_name.trim().to_string();
        input.last_name = non_blank(input.last_name);
        input.company = non_blank(input.company);
        input.validate().map_err(|e| AuthError::Validation(validation_message(&e)))?;

        match self.account_repo.get_by_email(&input.email).await {
            Ok(_) => return Err(AuthError::EmailTaken),
            Err(RepositoryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = self.hash_password(input.password).await?;
        let mut account = Account::new(
            input.email,
            password_hash,
            input.first_name,
            self.signup_credits,
        );
        account.last_name = input.last_name;
        account.company = input.company;

        // A concurrent registration can still win the race; the unique
        // index turns that into a conflict here.
        self.account_repo.create(&account).await?;
        info!(account_id = %account.id, "Account registered");

        let token = self.tokens.issue(account.id, account.role)?;
        Ok(AuthSession { account, token })
    }

    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let mut account = match self.account_repo.get_by_email(&normalize_email(email)).await {
            Ok(account) => account,
            Err(RepositoryError::NotFound(_)) => {
                self.verify_password(password.to_string(), self.decoy_hash.clone())
                    .await?;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        if !self
            .verify_password(password.to_string(), account.password_hash.clone())
            .await?
        {
            warn!(account_id = %account.id, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        self.account_repo.record_login(account.id).await?;
        account.last_login_at = Some(Utc::now());

        let token = self.tokens.issue(account.id, account.role)?;
        info!(account_id = %account.id, "Login succeeded");
        Ok(AuthSession { account, token })
    }

    /// Always succeeds for well-formed input so callers cannot learn which
    /// addresses are registered.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }

        let account = match self.account_repo.get_by_email(&normalize_email(email)).await {
            Ok(account) => account,
            Err(RepositoryError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + self.reset_ttl;
        self.account_repo
            .set_reset_token(account.id, &hash_reset_token(&token), expires_at)
            .await?;

        if let Err(e) = self
            .notifier
            .send_reset(account.id, &account.email, &token, expires_at)
            .await
        {
            error!(account_id = %account.id, error = %e, "Failed to deliver password reset");
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::Validation(
                "Token and new password are required".to_string(),
            ));
        }
        NewPassword {
            password: new_password.to_string(),
        }
        .validate()
        .map_err(|e| AuthError::Validation(validation_message(&e)))?;

        let account = match self
            .account_repo
            .get_by_reset_token(&hash_reset_token(token), Utc::now())
            .await
        {
            Ok(account) => account,
            Err(RepositoryError::NotFound(_)) => return Err(AuthError::InvalidResetToken),
            Err(e) => return Err(e.into()),
        };

        let password_hash = self.hash_password(new_password.to_string()).await?;
        self.account_repo
            .update_password(account.id, &password_hash)
            .await?;
        info!(account_id = %account.id, "Password reset");
        Ok(())
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(self.tokens.verify(token)?)
    }

    /// Resolves a bearer token to the live account it names.
    pub async fn verify_token(&self, token: &str) -> Result<Account, AuthError> {
        let claims = self.decode_token(token)?;
        let id = claims.account_id()?;
        Ok(self.account_repo.get_by_id(id).await?)
    }

    pub async fn profile(&self, account_id: Uuid) -> Result<Account, AuthError> {
        Ok(self.account_repo.get_by_id(account_id).await?)
    }

    pub async fn update_profile(
        &self,
        account_id: Uuid,
        mut update: ProfileUpdate,
    ) -> Result<Account, AuthError> {
        if let Some(first) = update.first_name.as_mut() {
            *first = first.trim().to_string();
            if first.is_empty() {
                return Err(AuthError::Validation("First name cannot be empty".to_string()));
            }
        }
        update.last_name = update.last_name.map(|s| s.trim().to_string());
        update.company = update.company.map(|s| s.trim().to_string());

        Ok(self.account_repo.update_profile(account_id, &update).await?)
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn validation_message(errors: &ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    fields
        .into_iter()
        .filter_map(|field| {
            let first = field_errors.get(field)?.first()?;
            Some(
                first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field.replace('_', " "))),
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SubscriptionApplied, SubscriptionTransition};
    use async_trait::async_trait;
    use chrono::DateTime;
    use mockall::mock;

    mock! {
        pub Accounts {}
        #[async_trait]
        impl AccountRepository for Accounts {
            async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
            async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
            async fn get_by_email(&self, email: &str) -> Result<Account, RepositoryError>;
            async fn get_by_customer_ref(&self, customer_id: &str) -> Result<Account, RepositoryError>;
            async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<(), RepositoryError>;
            async fn record_login(&self, id: Uuid) -> Result<(), RepositoryError>;
            async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Account, RepositoryError>;
            async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), RepositoryError>;
            async fn get_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Account, RepositoryError>;
            async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError>;
            async fn apply_subscription(&self, id: Uuid, transition: &SubscriptionTransition) -> Result<SubscriptionApplied, RepositoryError>;
        }
    }

    mock! {
        pub Notifier {}
        #[async_trait]
        impl ResetNotifier for Notifier {
            async fn send_reset(&self, account_id: Uuid, email: &str, token: &str, expires_at: DateTime<Utc>) -> anyhow::Result<()>;
        }
    }

    fn service(accounts: MockAccounts) -> AuthService<MockAccounts, MockNotifier> {
        AuthService::new(
            Arc::new(accounts),
            Arc::new(MockNotifier::new()),
            Arc::new(TokenService::new("a-test-secret-that-is-long-enough-123", 1)),
            PasswordHasher::new(4),
            10,
            60,
        )
    }

    fn input(email: &str, password: &str, first_name: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
            first_name: first_name.to_string(),
            last_name: None,
            company: None,
        }
    }

    #[test]
    fn register_input_validation_messages() {
        let err = input("not-an-email", "short", "").validate().unwrap_err();
        let message = validation_message(&err);
        assert!(message.contains("A valid email is required"));
        assert!(message.contains("First name is required"));
        assert!(message.contains("at least 8 characters"));

        assert!(input("a@b.co", "longenough", "Ada").validate().is_ok());
    }

    #[test]
    fn repository_errors_map_to_auth_errors() {
        assert!(matches!(
            AuthError::from(RepositoryError::Conflict("x".into())),
            AuthError::EmailTaken
        ));
        assert!(matches!(
            AuthError::from(RepositoryError::NotFound("x".into())),
            AuthError::AccountNotFound
        ));
        assert!(matches!(
            AuthError::from(TokenError::Invalid),
            AuthError::InvalidToken
        ));
    }

    #[test]
    fn blank_optional_fields_are_dropped() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" Acme ".to_string())), Some("Acme".to_string()));
        assert_eq!(non_blank(None), None);
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_hash_check() {
        let mut accounts = MockAccounts::new();
        accounts
            .expect_get_by_email()
            .returning(|email| Err(RepositoryError::NotFound(email.to_string())));
        accounts.expect_record_login().never();
        let service = service(accounts);

        assert!(service.decoy_hash.starts_with("$2b$04$"));
        let err = service.login("nobody@example.com", "whatever1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn wrong_password_for_known_email_is_indistinguishable() {
        let hash = PasswordHasher::new(4).hash("the-right-one").unwrap();
        let account = Account::new("known@example.com".into(), hash, "Known".into(), 0);
        let mut accounts = MockAccounts::new();
        accounts
            .expect_get_by_email()
            .returning(move |_| Ok(account.clone()));
        accounts.expect_record_login().never();
        let service = service(accounts);

        let err = service.login("known@example.com", "the-wrong-one").await.unwrap_err();
        assert_eq!(err.to_string(), AuthError::InvalidCredentials.to_string());
    }
}
