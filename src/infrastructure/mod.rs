pub mod config;
pub mod crypto;
pub mod notifier;
pub mod postgres_payment_repo;
pub mod repository;
pub mod signature;

pub use config::*;
pub use crypto::*;
pub use notifier::*;
pub use postgres_payment_repo::*;
pub use repository::*;
pub use signature::*;
