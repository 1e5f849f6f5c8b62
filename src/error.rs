//! Error types for the store boundary and input validation.

/// Failures raised by the remote expense store or its change feed.
///
/// Every remote round trip (`list_by_period`, `insert`, `delete`) resolves to
/// either success or one of these variants. None of them is fatal: the engine
/// has already restored a consistent collection by the time an error reaches
/// the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached at all.
    #[error("the expense store could not be reached: {0}")]
    Connection(String),

    /// The backend answered with a non-success status.
    #[error("the expense store rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A row could not be converted between its wire shape and [`Expense`].
    ///
    /// [`Expense`]: crate::model::Expense
    #[error("malformed row from the expense store: {0}")]
    Malformed(String),

    /// The change-feed subscription could not be established.
    #[error("the change feed is unavailable: {0}")]
    Feed(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Connection(e.to_string())
    }
}

/// Rejections raised by the input layer before any state is mutated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Expense amounts must be strictly positive.
    #[error("expense amount must be greater than zero, got {0}")]
    NonPositiveAmount(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
