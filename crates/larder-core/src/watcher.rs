// Inventory watcher - turns store snapshots into classified lists and alerts
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::AlertDeduper;
use crate::clock::Clock;
use crate::freshness::{ClassifiedItem, ExpiryClassifier};
use crate::models::{FoodItem, OwnerId};
use crate::notifications::{NotificationEvent, NotificationSink};
use crate::store::{food_items_path, Record, SnapshotStream, Store, StoreEvent, SubscriptionHandle};
use crate::Result;

/// What processing one snapshot produced
#[derive(Debug, Clone, Default)]
pub struct SnapshotOutcome {
    /// Every readable item, in snapshot order
    pub items: Vec<ClassifiedItem>,
    /// Alerts that fired for the first time
    pub notifications: Vec<NotificationEvent>,
    /// Records skipped because they were malformed
    pub skipped: usize,
}

/// The per-snapshot logic of a watcher, minus the async plumbing
///
/// Owns the alert history for one owner's collection. Feed it complete
/// snapshots in order and it reports what to show and what to announce.
#[derive(Debug)]
pub struct SnapshotProcessor {
    owner_id: OwnerId,
    deduper: AlertDeduper,
    previous_ids: HashSet<String>,
}

impl SnapshotProcessor {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            deduper: AlertDeduper::new(),
            previous_ids: HashSet::new(),
        }
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn process(&mut self, records: &[Record], now: DateTime<Utc>) -> SnapshotOutcome {
        let mut items = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for record in records {
            match FoodItem::from_record(&self.owner_id, record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!("Skipping malformed item in {}'s inventory: {}", self.owner_id, e);
                    skipped += 1;
                }
            }
        }

        // Deleted items lose their alert history before anything new is announced,
        // so an item recreated under the same id starts from scratch
        let current_ids: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        for gone in self.previous_ids.difference(&current_ids) {
            self.deduper.forget(gone);
        }
        self.previous_ids = current_ids;

        let items: Vec<ClassifiedItem> = items
            .into_iter()
            .map(|item| ExpiryClassifier::classify_item(item, now))
            .collect();

        let deduper = &mut self.deduper;
        let notifications: Vec<NotificationEvent> = items
            .iter()
            .filter(|c| deduper.should_notify(&c.item.id, c.category))
            .filter_map(NotificationEvent::for_item)
            .collect();

        debug!(
            "Processed snapshot for {}: {} items, {} alerts, {} skipped",
            self.owner_id,
            items.len(),
            notifications.len(),
            skipped
        );

        SnapshotOutcome {
            items,
            notifications,
            skipped,
        }
    }
}

/// Events reported back to whoever started the watcher
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// A snapshot was processed
    Updated {
        items: Vec<ClassifiedItem>,
        notified: Vec<NotificationEvent>,
    },
    /// The store connection dropped. The watcher has stopped; restart it to resume.
    ConnectionLost { reason: String },
}

/// Starts inventory subscriptions
pub struct InventoryWatcher {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
}

impl InventoryWatcher {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, clock, sink }
    }

    /// Subscribe to an owner's items
    ///
    /// Every call gets its own alert history, so restarting after a
    /// connection loss or switching owners starts clean.
    pub async fn start(&self, owner_id: OwnerId) -> Result<WatchHandle> {
        let collection = food_items_path(&owner_id)?;
        let stream = self.store.subscribe(&collection).await?;
        let subscription = stream.handle();

        let (items_tx, items_rx) = watch::channel(Vec::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(()));

        let worker = Worker {
            processor: SnapshotProcessor::new(owner_id.clone()),
            clock: Arc::clone(&self.clock),
            sink: Arc::clone(&self.sink),
            items_tx,
            events_tx,
            stopped: Arc::clone(&stopped),
            gate: Arc::clone(&gate),
        };
        let task = tokio::spawn(worker.run(stream, shutdown_rx));

        info!("Watching inventory of {}", owner_id);
        Ok(WatchHandle {
            owner_id,
            store: Arc::clone(&self.store),
            subscription,
            stopped,
            gate,
            shutdown: Some(shutdown_tx),
            items: items_rx,
            events: events_rx,
            task: Some(task),
        })
    }
}

/// The task behind a running subscription
struct Worker {
    processor: SnapshotProcessor,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    items_tx: watch::Sender<Vec<ClassifiedItem>>,
    events_tx: mpsc::UnboundedSender<WatcherEvent>,
    stopped: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
}

impl Worker {
    async fn run(mut self, mut stream: SnapshotStream, mut shutdown: oneshot::Receiver<()>) {
        loop {
            // Snapshots are handled one at a time; later ones wait in the channel
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = stream.next() => event,
            };

            match event {
                Some(StoreEvent::Snapshot(records)) => {
                    if !self.handle_snapshot(&records) {
                        break;
                    }
                }
                Some(StoreEvent::ConnectionLost(reason)) => {
                    self.connection_lost(reason);
                    break;
                }
                None => {
                    self.connection_lost("subscription closed by store".to_string());
                    break;
                }
            }
        }

        debug!("Watcher for {} exited", self.processor.owner_id());
    }

    /// Returns false once the handle has been stopped
    fn handle_snapshot(&mut self, records: &[Record]) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }

        let outcome = self.processor.process(records, self.clock.now());

        for notification in &outcome.notifications {
            self.sink.emit(notification.clone());
        }

        self.items_tx.send_replace(outcome.items.clone());
        // Nobody listening for events is fine, the item list still got published
        let _ = self.events_tx.send(WatcherEvent::Updated {
            items: outcome.items,
            notified: outcome.notifications,
        });

        true
    }

    fn connection_lost(&self, reason: String) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        warn!(
            "Lost connection while watching {}: {}",
            self.processor.owner_id(),
            reason
        );
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.events_tx.send(WatcherEvent::ConnectionLost { reason });
    }
}

/// A running inventory subscription
///
/// Dropping the handle stops the subscription.
pub struct WatchHandle {
    owner_id: OwnerId,
    store: Arc<dyn Store>,
    subscription: SubscriptionHandle,
    stopped: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    items: watch::Receiver<Vec<ClassifiedItem>>,
    events: mpsc::UnboundedReceiver<WatcherEvent>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Receiver that always holds the latest classified list
    pub fn items(&self) -> watch::Receiver<Vec<ClassifiedItem>> {
        self.items.clone()
    }

    pub fn current_items(&self) -> Vec<ClassifiedItem> {
        self.items.borrow().clone()
    }

    /// Wait for the next event. None once the watcher has finished and every
    /// queued event has been drained.
    pub async fn next_event(&mut self) -> Option<WatcherEvent> {
        self.events.recv().await
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop watching and release the subscription
    ///
    /// Safe to call more than once, and after a connection loss. A snapshot
    /// already being processed finishes first; none is started afterwards.
    ///
    /// This takes a blocking `std::sync::Mutex`, which is fine from async code:
    /// the worker only holds it for one synchronous pass over a snapshot and
    /// never across an await. Don't call it from inside a sink's `emit`.
    pub fn stop(&mut self) {
        let already_stopped = self.stopped.swap(true, Ordering::SeqCst);

        // Wait out any snapshot that is mid-flight
        drop(self.gate.lock().unwrap_or_else(PoisonError::into_inner));

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            self.store.unsubscribe(self.subscription);
            if !already_stopped {
                info!("Stopped watching inventory of {}", self.owner_id);
            }
        }
    }

    /// Stop and wait for the background task to wind down
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Watcher task for {} ended abnormally: {}", self.owner_id, e);
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
