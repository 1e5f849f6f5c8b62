//! Types that represent the core data model, such as `Expense` and `Period`.
mod amount;
mod expense;
mod period;
pub mod summary;

pub use amount::{Amount, AmountError};
pub use expense::{Category, Expense, Payment};
pub use period::{Period, PeriodError};
