//! The expense record and its closed enumerations.

use crate::model::Amount;
use crate::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of spending categories.
///
/// The wire representation matches the display name, so these round-trip
/// through the hosted backend's `category` column unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Gym,
    Supplements,
    Skincare,
    Food,
    Commute,
    Fun,
    Savings,
    Misc,
}

serde_plain::derive_display_from_serialize!(Category);
serde_plain::derive_fromstr_from_deserialize!(Category);

impl Category {
    /// All categories in form-display order.
    pub const ALL: [Category; 8] = [
        Category::Gym,
        Category::Supplements,
        Category::Skincare,
        Category::Food,
        Category::Commute,
        Category::Fun,
        Category::Savings,
        Category::Misc,
    ];
}

/// The fixed set of payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Payment {
    Cash,
    #[serde(rename = "UPI")]
    Upi,
    Card,
}

serde_plain::derive_display_from_serialize!(Payment);
serde_plain::derive_fromstr_from_deserialize!(Payment);

impl Payment {
    /// All payment methods in form-display order.
    pub const ALL: [Payment; 3] = [Payment::Cash, Payment::Upi, Payment::Card];
}

/// A single expense record.
///
/// The `id` is generated client-side at creation time and is immutable
/// thereafter; it is the sole key used for lookup and de-duplication
/// everywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    /// Instant the expense occurred, also the period-membership key.
    pub date: DateTime<Utc>,
    pub category: Category,
    pub amount: Amount,
    pub payment: Payment,
    /// Optional free-text annotation; empty when absent.
    #[serde(default)]
    pub notes: String,
}

impl Expense {
    /// Builds a new expense from form input, generating the `id` and
    /// defaulting `date` to now when the form leaves it blank.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveAmount`] unless `amount > 0`.
    /// This runs in the input layer, before the record reaches the engine.
    pub fn new(
        date: Option<DateTime<Utc>>,
        category: Category,
        amount: Amount,
        payment: Payment,
        notes: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount.to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            date: date.unwrap_or_else(Utc::now),
            category,
            amount,
            payment,
            notes: notes.into().trim().to_string(),
        })
    }
}
