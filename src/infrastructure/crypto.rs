use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::AccountRole;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to issue token: {0}")]
    Issue(String),
    #[error("Invalid or expired token")]
    Invalid,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// bcrypt with a configurable work factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        if cost < bcrypt::DEFAULT_COST {
            warn!(cost, "bcrypt cost below default; only acceptable in tests");
        }
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, TokenError> {
        bcrypt::hash(password, self.cost).map_err(|e| TokenError::Hashing(e.to_string()))
    }

    /// A malformed stored hash verifies as `false` rather than erroring.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: AccountRole,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

/// Issues and checks HS256 bearer tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        if secret.len() < 32 {
            warn!("JWT secret is shorter than 32 bytes");
        }
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, account_id: Uuid, role: AccountRole) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            role,
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Issue(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

/// Random single-use token for password resets. Only its hash is stored.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_reset_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("sha256:{:x}", digest)
}
