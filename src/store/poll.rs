//! A change feed for stores without realtime push.
//!
//! `PollFeed` re-fetches the period window on an interval and diffs
//! consecutive snapshots by id into insert/update/delete events. The engine
//! consumes them exactly as it consumes pushed notifications; only latency
//! differs.

use crate::model::{Expense, Period};
use crate::session::Identity;
use crate::store::{ChangeEvent, ChangeFeed, ExpenseStore, FEED_BUFFER};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub struct PollFeed {
    store: Arc<dyn ExpenseStore>,
    interval: Duration,
}

impl PollFeed {
    pub fn new(store: Arc<dyn ExpenseStore>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

#[async_trait::async_trait]
impl ChangeFeed for PollFeed {
    async fn subscribe(
        &self,
        owner: &Identity,
        period: Period,
    ) -> Result<mpsc::Receiver<ChangeEvent>> {
        // The first snapshot is the baseline; only changes relative to it are
        // reported, so subscribing never replays the existing collection.
        let baseline = self
            .store
            .list_by_period(owner, period)
            .await
            .map_err(|e| crate::StoreError::Feed(e.to_string()))?;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let store = Arc::clone(&self.store);
        let owner = owner.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            poll_loop(store, owner, period, interval, by_id(baseline), tx).await;
        });
        Ok(rx)
    }
}

fn by_id(rows: Vec<Expense>) -> HashMap<Uuid, Expense> {
    rows.into_iter().map(|e| (e.id, e)).collect()
}

async fn poll_loop(
    store: Arc<dyn ExpenseStore>,
    owner: Identity,
    period: Period,
    interval: Duration,
    mut last: HashMap<Uuid, Expense>,
    tx: mpsc::Sender<ChangeEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The interval's first tick fires immediately; the baseline already
    // covers it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }
        let rows = match store.list_by_period(&owner, period).await {
            Ok(rows) => rows,
            Err(e) => {
                // Transient; keep the feed alive and try again next tick.
                debug!("poll of {period} failed: {e}");
                continue;
            }
        };
        let current = by_id(rows);
        let events = diff(&last, &current);
        last = current;
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Events that turn the `last` snapshot into the `current` one.
fn diff(last: &HashMap<Uuid, Expense>, current: &HashMap<Uuid, Expense>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    for (id, row) in current {
        match last.get(id) {
            None => events.push(ChangeEvent::Inserted(row.clone())),
            Some(prior) if prior != row => events.push(ChangeEvent::Updated(row.clone())),
            Some(_) => {}
        }
    }
    for id in last.keys() {
        if !current.contains_key(id) {
            events.push(ChangeEvent::Deleted { id: *id });
        }
    }
    events
}
