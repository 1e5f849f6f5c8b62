//! The reconciliation engine.
//!
//! `Reconciler` owns the in-memory expense collection for the currently
//! selected period and is the only writer to it. Local mutations are applied
//! optimistically and rolled back from a captured pre-image if the remote
//! call fails; pushed change events are merged through the same single-writer
//! path. Presentation layers observe read-only [`View`] snapshots through a
//! watch channel and never touch the collection itself.

use crate::cache::Cache;
use crate::model::{Expense, Period};
use crate::session::{Identity, SessionGate};
use crate::store::{ChangeEvent, ChangeFeed, ExpenseStore};
use crate::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

/// A read-only snapshot of the engine's state, published after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    /// The active period's records, newest first.
    pub expenses: Vec<Expense>,
    /// True while an authoritative load is in flight.
    pub loading: bool,
}

struct State {
    identity: Option<Identity>,
    period: Period,
    expenses: Vec<Expense>,
    loading: bool,
    /// Bumped on every period or identity change. A load response or feed
    /// event carrying an older epoch is discarded instead of applied.
    epoch: u64,
}

/// Keeps the local expense collection consistent with the remote store.
pub struct Reconciler {
    store: Arc<dyn ExpenseStore>,
    feed: Arc<dyn ChangeFeed>,
    cache: Option<Cache>,
    state: Mutex<State>,
    views: watch::Sender<View>,
}

impl Reconciler {
    /// Creates an engine over `store` and `feed`, scoped to `identity` and
    /// showing `period`. Performs no IO; call [`start`](Self::start) next.
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        feed: Arc<dyn ChangeFeed>,
        identity: Option<Identity>,
        period: Period,
    ) -> Arc<Self> {
        Self::build(store, feed, identity, period, None)
    }

    /// Like [`new`](Self::new), but also writes each authoritative snapshot
    /// to a best-effort local cache for warm starts.
    pub fn with_cache(
        store: Arc<dyn ExpenseStore>,
        feed: Arc<dyn ChangeFeed>,
        identity: Option<Identity>,
        period: Period,
        cache: Cache,
    ) -> Arc<Self> {
        Self::build(store, feed, identity, period, Some(cache))
    }

    fn build(
        store: Arc<dyn ExpenseStore>,
        feed: Arc<dyn ChangeFeed>,
        identity: Option<Identity>,
        period: Period,
        cache: Option<Cache>,
    ) -> Arc<Self> {
        let (views, _) = watch::channel(View::default());
        Arc::new(Self {
            store,
            feed,
            cache,
            state: Mutex::new(State {
                identity,
                period,
                expenses: Vec::new(),
                loading: false,
                epoch: 0,
            }),
            views,
        })
    }

    /// Subscribes the change feed and performs the initial load.
    ///
    /// A feed that cannot be established is logged and tolerated — the engine
    /// still serves loads and mutations, it just won't see remote pushes. A
    /// failed initial load is returned to the caller and is non-fatal.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.resubscribe().await;
        self.reload().await
    }

    /// Observes [`View`] snapshots; the receiver holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.views.subscribe()
    }

    /// The active period's records, newest first.
    pub fn snapshot(&self) -> Vec<Expense> {
        self.lock().expenses.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn period(&self) -> Period {
        self.lock().period
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    /// Replaces the selected period.
    ///
    /// There is no incremental transition: the collection is discarded, the
    /// feed is re-subscribed for the new window and a full reload runs.
    /// Selecting the period already shown is a no-op.
    pub async fn set_period(self: &Arc<Self>, period: Period) -> Result<()> {
        {
            let mut state = self.lock();
            if state.period == period {
                return Ok(());
            }
            debug!("switching period {} -> {period}", state.period);
            state.period = period;
            state.epoch += 1;
            state.expenses.clear();
            self.publish(&state);
        }
        self.resubscribe().await;
        self.reload().await
    }

    /// Applies a sign-in/sign-out notification.
    ///
    /// Signing out clears the collection and abandons the feed; signing in
    /// re-subscribes and reloads under the new identity.
    pub async fn set_identity(self: &Arc<Self>, identity: Option<Identity>) -> Result<()> {
        let signed_in = identity.is_some();
        {
            let mut state = self.lock();
            if state.identity == identity {
                return Ok(());
            }
            state.identity = identity;
            state.epoch += 1;
            state.expenses.clear();
            self.publish(&state);
        }
        if signed_in {
            self.resubscribe().await;
            self.reload().await
        } else {
            Ok(())
        }
    }

    /// Spawns a task that forwards `gate`'s identity changes into
    /// [`set_identity`](Self::set_identity).
    pub fn follow(self: &Arc<Self>, gate: &dyn SessionGate) -> tokio::task::JoinHandle<()> {
        let mut changes = gate.identity_changes();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let identity = changes.borrow_and_update().clone();
                if let Err(e) = engine.set_identity(identity).await {
                    warn!("load after identity change failed: {e}");
                }
            }
        })
    }

    /// Fetches the authoritative snapshot for the current identity and period
    /// and replaces the whole collection with it.
    ///
    /// On failure the previous collection stays in place and the error is
    /// returned. The loading flag clears on every path. A response that
    /// arrives after the period or identity changed underneath it is
    /// discarded.
    pub async fn reload(&self) -> Result<()> {
        let (identity, period, epoch) = {
            let mut state = self.lock();
            let Some(identity) = state.identity.clone() else {
                return Ok(());
            };
            state.loading = true;
            self.publish(&state);
            (identity, state.period, state.epoch)
        };

        let outcome = self.store.list_by_period(&identity, period).await;

        let loaded = {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!("discarding stale load response for {period}");
                return Ok(());
            }
            state.loading = false;
            match outcome {
                Ok(rows) => {
                    state.expenses = rows;
                    self.publish(&state);
                    state.expenses.clone()
                }
                Err(e) => {
                    self.publish(&state);
                    return Err(e);
                }
            }
        };

        if let Some(cache) = &self.cache {
            cache.save(&loaded).await;
        }
        Ok(())
    }

    /// Records a new expense: visible immediately, then persisted.
    ///
    /// The caller has already validated the record (`amount > 0`). On remote
    /// failure exactly the speculative record is removed again and the error
    /// is returned as the user-visible notice. Re-adding an id that is
    /// already present is ignored.
    pub async fn add(&self, expense: Expense) -> Result<()> {
        let (identity, epoch) = {
            let mut state = self.lock();
            let Some(identity) = state.identity.clone() else {
                return Ok(());
            };
            if state.expenses.iter().any(|e| e.id == expense.id) {
                return Ok(());
            }
            state.expenses.insert(0, expense.clone());
            self.publish(&state);
            (identity, state.epoch)
        };

        match self.store.insert(&identity, &expense).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("insert of {} failed, rolling back: {e}", expense.id);
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.expenses.retain(|x| x.id != expense.id);
                    self.publish(&state);
                }
                Err(e)
            }
        }
    }

    /// Deletes an expense: gone immediately, then deleted remotely.
    ///
    /// The full pre-removal collection is captured, and on remote failure it
    /// is restored wholesale. Removing an id that is not in the collection is
    /// a no-op; the remote layer is authoritative on "not found" anyway.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let (identity, epoch, snapshot) = {
            let mut state = self.lock();
            let Some(identity) = state.identity.clone() else {
                return Ok(());
            };
            if !state.expenses.iter().any(|e| e.id == id) {
                return Ok(());
            }
            let snapshot = state.expenses.clone();
            state.expenses.retain(|e| e.id != id);
            self.publish(&state);
            (identity, state.epoch, snapshot)
        };

        match self.store.delete(&identity, id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("delete of {id} failed, restoring snapshot: {e}");
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.expenses = snapshot;
                    self.publish(&state);
                }
                Err(e)
            }
        }
    }

    /// Merges one change-feed event into the collection.
    ///
    /// Feed pumps call this internally; hosts wiring their own realtime
    /// transport may inject events directly.
    pub async fn apply_event(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Inserted(expense) => {
                let mut state = self.lock();
                if !state.period.contains(&expense.date) {
                    return;
                }
                // De-dupe against this session's own optimistic insert
                // echoing back through the feed.
                if state.expenses.iter().any(|e| e.id == expense.id) {
                    return;
                }
                state.expenses.insert(0, expense);
                self.publish(&state);
            }
            ChangeEvent::Updated(_) => {
                // A date change can move the record across the period
                // boundary; only a fresh authoritative snapshot classifies
                // that correctly, so updates always force a full reload.
                if let Err(e) = self.reload().await {
                    warn!("reload after update event failed: {e}");
                }
            }
            ChangeEvent::Deleted { id } => {
                let mut state = self.lock();
                let before = state.expenses.len();
                state.expenses.retain(|e| e.id != id);
                if state.expenses.len() != before {
                    self.publish(&state);
                }
            }
        }
    }

    /// Opens a feed subscription for the current `(identity, period)` and
    /// spawns a pump for it. The previous pump is superseded by the epoch
    /// bump that preceded this call and exits on its next event.
    async fn resubscribe(self: &Arc<Self>) {
        let (identity, period, epoch) = {
            let state = self.lock();
            (state.identity.clone(), state.period, state.epoch)
        };
        let Some(identity) = identity else {
            return;
        };
        let rx = match self.feed.subscribe(&identity, period).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("change-feed subscription for {period} failed: {e}");
                return;
            }
        };
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.pump(rx, epoch).await;
        });
    }

    async fn pump(&self, mut rx: mpsc::Receiver<ChangeEvent>, epoch: u64) {
        while let Some(event) = rx.recv().await {
            if self.lock().epoch != epoch {
                debug!("feed pump superseded, exiting");
                break;
            }
            self.apply_event(event).await;
        }
    }

    fn publish(&self, state: &State) {
        self.views.send_replace(View {
            expenses: state.expenses.clone(),
            loading: state.loading,
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("reconciler state poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::summary::MonthSummary;
    use crate::model::{Amount, Category, Payment};
    use crate::session::StaticSession;
    use crate::store::MemoryStore;
    use crate::test::{expense_on, init_logging};
    use crate::StoreError;
    use std::time::Duration;

    const MARCH: &str = "2024-03";

    fn owner() -> Identity {
        Identity::from("user-1")
    }

    fn period() -> Period {
        MARCH.parse().unwrap()
    }

    async fn engine_over(store: Arc<MemoryStore>) -> Arc<Reconciler> {
        let engine = Reconciler::new(store.clone(), store, Some(owner()), period());
        engine.start().await.unwrap();
        engine
    }

    /// Polls until the engine's collection satisfies `predicate`, so tests do
    /// not race the feed pump.
    async fn wait_for(engine: &Reconciler, predicate: impl Fn(&[Expense]) -> bool) {
        for _ in 0..200 {
            if predicate(&engine.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never reached expected state: {:?}", engine.snapshot());
    }

    #[tokio::test]
    async fn test_add_records_and_summarizes() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone()).await;

        let e = Expense::new(
            Some("2024-03-05T00:00:00Z".parse().unwrap()),
            Category::Food,
            Amount::from(250),
            Payment::Upi,
            "",
        )
        .unwrap();
        engine.add(e.clone()).await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot, vec![e.clone()]);
        assert_eq!(store.rows(&owner()), vec![e]);

        let summary = MonthSummary::for_expenses(&snapshot, Amount::from(15_000));
        assert_eq!(summary.spent, Amount::from(250));
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_exactly() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        store.seed(&owner(), vec![expense_on("2024-03-01T00:00:00Z", 90)]);
        let engine = engine_over(store.clone()).await;
        let before = engine.snapshot();

        store.fail_inserts(true);
        let err = engine
            .add(expense_on("2024-03-05T00:00:00Z", 250))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(engine.snapshot(), before);
    }

    #[tokio::test]
    async fn test_remove_deletes_remotely() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 250);
        store.seed(&owner(), vec![e.clone()]);
        let engine = engine_over(store.clone()).await;

        engine.remove(e.id).await.unwrap();
        assert!(engine.snapshot().is_empty());
        assert!(store.rows(&owner()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_restores_snapshot() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 250);
        store.seed(&owner(), vec![e.clone()]);
        let engine = engine_over(store.clone()).await;
        let before = engine.snapshot();

        store.fail_deletes(true);
        let err = engine.remove(e.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(engine.snapshot(), before);
        assert_eq!(store.rows(&owner()), vec![e]);
    }

    #[tokio::test]
    async fn test_remove_of_unknown_id_is_noop() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store).await;
        assert!(engine.remove(Uuid::new_v4()).await.is_ok());
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_insert_merge_is_idempotent() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store).await;

        let e = expense_on("2024-03-05T00:00:00Z", 250);
        engine.add(e.clone()).await.unwrap();

        // The session's own insert echoing back must not double-count.
        engine.apply_event(ChangeEvent::Inserted(e.clone())).await;
        assert_eq!(engine.snapshot(), vec![e]);
    }

    #[tokio::test]
    async fn test_out_of_period_insert_event_is_ignored() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store).await;

        engine
            .apply_event(ChangeEvent::Inserted(expense_on("2024-04-01T00:00:00Z", 99)))
            .await;
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_update_event_forces_one_reload() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 250);
        store.seed(&owner(), vec![e.clone()]);
        let engine = engine_over(store.clone()).await;

        let loads_before = store.list_calls();
        let mut moved = e.clone();
        moved.date = "2024-04-02T00:00:00Z".parse().unwrap();
        store.update(&owner(), moved).await;

        // The reload is the only way a cross-boundary date change can be
        // classified; the collection ends up empty for March.
        wait_for(&engine, |expenses| expenses.is_empty()).await;
        assert_eq!(store.list_calls(), loads_before + 1);
    }

    #[tokio::test]
    async fn test_remote_insert_reaches_other_session() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let first = engine_over(store.clone()).await;
        let second = engine_over(store.clone()).await;

        let e = expense_on("2024-03-05T00:00:00Z", 250);
        first.add(e.clone()).await.unwrap();

        let want = e.clone();
        wait_for(&second, move |expenses| {
            expenses.len() == 1 && expenses[0] == want
        })
        .await;
        // The originating session saw its own echo and deduplicated it.
        assert_eq!(first.snapshot(), vec![e]);
    }

    #[tokio::test]
    async fn test_remote_delete_reaches_other_session() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 250);
        store.seed(&owner(), vec![e.clone()]);
        let first = engine_over(store.clone()).await;
        let second = engine_over(store.clone()).await;

        first.remove(e.id).await.unwrap();
        wait_for(&second, |expenses| expenses.is_empty()).await;
    }

    #[tokio::test]
    async fn test_set_period_discards_and_reloads() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let march = expense_on("2024-03-05T00:00:00Z", 100);
        let april = expense_on("2024-04-05T00:00:00Z", 200);
        store.seed(&owner(), vec![march, april.clone()]);
        let engine = engine_over(store.clone()).await;
        assert_eq!(engine.snapshot().len(), 1);

        engine.set_period("2024-04".parse().unwrap()).await.unwrap();
        assert_eq!(engine.snapshot(), vec![april]);
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_prior_collection() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 100);
        store.seed(&owner(), vec![e.clone()]);
        let engine = engine_over(store.clone()).await;

        store.fail_lists(true);
        let err = engine.reload().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert_eq!(engine.snapshot(), vec![e]);
        assert!(!engine.is_loading(), "loading flag must clear on failure");
    }

    #[tokio::test]
    async fn test_stale_load_response_is_discarded() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let march = expense_on("2024-03-05T00:00:00Z", 100);
        let april = expense_on("2024-04-05T00:00:00Z", 200);
        store.seed(&owner(), vec![march, april.clone()]);
        let engine = engine_over(store.clone()).await;

        // A March load left in flight while the user switches to April: the
        // late March response must not overwrite the April snapshot.
        store.delay_lists(Duration::from_millis(150));
        let slow = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.reload().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.delay_lists(Duration::ZERO);
        engine.set_period("2024-04".parse().unwrap()).await.unwrap();
        assert_eq!(engine.snapshot(), vec![april.clone()]);

        slow.await.unwrap().unwrap();
        assert_eq!(engine.snapshot(), vec![april]);
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_sign_in_reloads() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let e = expense_on("2024-03-05T00:00:00Z", 100);
        store.seed(&owner(), vec![e.clone()]);

        let gate = StaticSession::new(Some(owner()));
        let engine = engine_over(store.clone()).await;
        engine.follow(&gate);

        gate.sign_out();
        wait_for(&engine, |expenses| expenses.is_empty()).await;
        assert_eq!(engine.identity(), None);

        gate.sign_in(owner());
        let want = e.clone();
        wait_for(&engine, move |expenses| {
            expenses.len() == 1 && expenses[0] == want
        })
        .await;
    }

    #[tokio::test]
    async fn test_ids_stay_unique_under_mixed_operations() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store.clone()).await;

        let e = expense_on("2024-03-05T00:00:00Z", 250);
        engine.add(e.clone()).await.unwrap();
        engine.add(e.clone()).await.unwrap(); // duplicate add ignored
        engine.apply_event(ChangeEvent::Inserted(e.clone())).await;
        engine.reload().await.unwrap();
        engine.apply_event(ChangeEvent::Inserted(e.clone())).await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, e.id);
    }

    #[tokio::test]
    async fn test_views_publish_collection_and_loading() {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(store).await;
        let views = engine.subscribe();

        let e = expense_on("2024-03-05T00:00:00Z", 250);
        engine.add(e.clone()).await.unwrap();

        let view = views.borrow().clone();
        assert_eq!(view.expenses, vec![e]);
        assert!(!view.loading);
    }
}
