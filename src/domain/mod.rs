pub mod account;
pub mod event;
pub mod generation;
pub mod ledger;
pub mod payment;
pub mod plan;
pub mod subscription;
pub mod transition;

pub use account::*;
pub use event::{AccountRef, EventParseError, PaymentEvent, RawEvent};
pub use generation::{GenerationModel, PricingError, GENERATION_MODELS};
pub use ledger::*;
pub use payment::*;
pub use plan::*;
pub use subscription::*;
pub use transition::*;
