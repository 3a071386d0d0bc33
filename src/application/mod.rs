pub mod auth;
pub mod ledger;
pub mod subscription;
pub mod webhook;

pub use auth::*;
pub use ledger::*;
pub use subscription::*;
pub use webhook::*;
