pub mod amount;
pub mod api;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod store;

pub use amount::{Amount, Discount};
pub use engine::Orchestrator;
pub use model::{CreditTransaction, ItemId, MarketItem, PurchaseRecord, User, UserId};
