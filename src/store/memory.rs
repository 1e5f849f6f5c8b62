//! Implements the store traits using in-memory data.
//!
//! Note: this is compiled even in the "production" version of the crate so
//! that the whole system can run, top-to-bottom, without a hosted backend.
//! It is also the harness for every multi-device scenario: mutations made
//! through one handle are pushed to every subscribed feed, so two engines
//! sharing a `MemoryStore` observe each other the way two browser tabs
//! observe the same table.

use crate::model::{Expense, Period};
use crate::session::Identity;
use crate::store::{ChangeEvent, ChangeFeed, ExpenseStore, FEED_BUFFER};
use crate::{Result, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// An implementation of [`ExpenseStore`] and [`ChangeFeed`] that holds all
/// rows in memory, with per-operation failure injection.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Identity, Vec<Expense>>>,
    subscribers: Mutex<Vec<(Identity, mpsc::Sender<ChangeEvent>)>>,
    fail_lists: AtomicBool,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    list_delay: Mutex<Duration>,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows for `owner` without emitting change events.
    pub fn seed(&self, owner: &Identity, expenses: Vec<Expense>) {
        let mut rows = self.rows.lock().expect("memory store poisoned");
        rows.entry(owner.clone()).or_default().extend(expenses);
    }

    /// Makes subsequent `list_by_period` calls fail until cleared.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `insert` calls fail until cleared.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `delete` calls fail until cleared.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delays subsequent `list_by_period` responses, for exercising
    /// interleavings with in-flight loads.
    pub fn delay_lists(&self, delay: Duration) {
        *self.list_delay.lock().expect("memory store poisoned") = delay;
    }

    /// How many times `list_by_period` has been called.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// All rows currently held for `owner`, unordered.
    pub fn rows(&self, owner: &Identity) -> Vec<Expense> {
        let rows = self.rows.lock().expect("memory store poisoned");
        rows.get(owner).cloned().unwrap_or_default()
    }

    /// Replaces a row in place and pushes an `Updated` event, simulating an
    /// edit made by another device or session.
    pub async fn update(&self, owner: &Identity, expense: Expense) {
        {
            let mut rows = self.rows.lock().expect("memory store poisoned");
            let list = rows.entry(owner.clone()).or_default();
            match list.iter_mut().find(|e| e.id == expense.id) {
                Some(existing) => *existing = expense.clone(),
                None => list.push(expense.clone()),
            }
        }
        self.publish(owner, ChangeEvent::Updated(expense)).await;
    }

    async fn publish(&self, owner: &Identity, event: ChangeEvent) {
        let targets: Vec<mpsc::Sender<ChangeEvent>> = {
            let mut subscribers = self.subscribers.lock().expect("memory store poisoned");
            subscribers.retain(|(_, tx)| !tx.is_closed());
            subscribers
                .iter()
                .filter(|(subscribed, _)| subscribed == owner)
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        trace!("publishing {event:?} to {} subscribers", targets.len());
        for tx in targets {
            // A closed receiver means the subscription was torn down; that is
            // not an error for the publisher.
            let _ = tx.send(event.clone()).await;
        }
    }

    fn injected(&self, flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Connection(format!(
                "injected {operation} failure"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ExpenseStore for MemoryStore {
    async fn list_by_period(&self, owner: &Identity, period: Period) -> Result<Vec<Expense>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(&self.fail_lists, "list")?;
        let delay = *self.list_delay.lock().expect("memory store poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let rows = self.rows.lock().expect("memory store poisoned");
        let mut matched: Vec<Expense> = rows
            .get(owner)
            .map(|list| {
                list.iter()
                    .filter(|e| e.date >= period.start() && e.date < period.end())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(matched)
    }

    async fn insert(&self, owner: &Identity, expense: &Expense) -> Result<()> {
        self.injected(&self.fail_inserts, "insert")?;
        {
            let mut rows = self.rows.lock().expect("memory store poisoned");
            let list = rows.entry(owner.clone()).or_default();
            if list.iter().any(|e| e.id == expense.id) {
                return Err(StoreError::Rejected {
                    status: 409,
                    body: format!("duplicate id {}", expense.id),
                });
            }
            list.push(expense.clone());
        }
        self.publish(owner, ChangeEvent::Inserted(expense.clone()))
            .await;
        Ok(())
    }

    async fn delete(&self, owner: &Identity, id: Uuid) -> Result<()> {
        self.injected(&self.fail_deletes, "delete")?;
        let removed = {
            let mut rows = self.rows.lock().expect("memory store poisoned");
            match rows.get_mut(owner) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|e| e.id != id);
                    before != list.len()
                }
                None => false,
            }
        };
        // Deleting a row that was never there is benign and emits nothing.
        if removed {
            self.publish(owner, ChangeEvent::Deleted { id }).await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(
        &self,
        owner: &Identity,
        _period: Period,
    ) -> Result<mpsc::Receiver<ChangeEvent>> {
        // Delivery is scoped by owner only; the engine re-validates period
        // membership on every inserted row.
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let mut subscribers = self.subscribers.lock().expect("memory store poisoned");
        subscribers.push((owner.clone(), tx));
        Ok(rx)
    }
}
