//! The remote record-store seam: repository functions and the change feed.

mod memory;
mod poll;
mod rest;

use crate::model::{Expense, Period};
use crate::session::Identity;
use crate::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use poll::PollFeed;
pub use rest::RestStore;

/// Buffer size for change-feed subscription channels.
const FEED_BUFFER: usize = 64;

/// Repository functions against the hosted record store.
///
/// Implementations own the wire format and authorization; callers see plain
/// [`Expense`] values. Every operation is a single round trip and either fully
/// succeeds or fails with a [`StoreError`] — there are no partial results.
///
/// [`StoreError`]: crate::StoreError
#[async_trait::async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Fetches every record owned by `owner` whose date falls within
    /// `[period.start(), period.end())`, newest first.
    async fn list_by_period(&self, owner: &Identity, period: Period) -> Result<Vec<Expense>>;

    /// Persists a single record. Not idempotent by id: inserting a record
    /// whose id already exists is a caller error.
    async fn insert(&self, owner: &Identity, expense: &Expense) -> Result<()>;

    /// Deletes by id, scoped to `owner`. Deleting a nonexistent id is not
    /// distinguished from success.
    async fn delete(&self, owner: &Identity, id: Uuid) -> Result<()>;
}

/// One notification from the watched table's change feed.
///
/// Events describe changes made by *anyone* — another device, another tab, or
/// this session's own round trip echoing back.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A row was inserted; carries the new row.
    Inserted(Expense),
    /// A row was updated; carries the new row state.
    Updated(Expense),
    /// A row was deleted; carries the prior row's id.
    Deleted { id: Uuid },
}

/// An asynchronous stream of [`ChangeEvent`]s for a watched `(owner, period)`.
///
/// One logical subscription per pair. Implementations may deliver events for
/// records outside `period` (the hosted backend filters by owner only); the
/// engine re-validates period membership, so broader delivery is harmless.
/// Dropping the receiver tears the subscription down.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        owner: &Identity,
        period: Period,
    ) -> Result<mpsc::Receiver<ChangeEvent>>;
}
