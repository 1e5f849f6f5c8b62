pub mod cache;
pub mod config;
pub mod engine;
mod error;
pub mod model;
pub mod session;
pub mod store;

pub use cache::Cache;
pub use config::Config;
pub use engine::{Reconciler, View};
pub use error::{Result, StoreError, ValidationError};
pub use model::{Amount, Category, Expense, Payment, Period};
pub use session::{Identity, SessionGate, StaticSession};
pub use store::{ChangeEvent, ChangeFeed, ExpenseStore, MemoryStore, PollFeed, RestStore};
