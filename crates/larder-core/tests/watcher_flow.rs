use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use larder_core::{
    Clock, FixedClock, FoodItemPatch, FreshnessCategory, Inventory, InventoryWatcher, NewFoodItem,
    NotificationEvent, NotificationSink, OwnerId, Severity, SqliteStore, WatchHandle, WatcherEvent,
};

/// Sink that keeps everything it is given
#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl CollectingSink {
    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl NotificationSink for CollectingSink {
    fn emit(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    store: Arc<SqliteStore>,
    clock: Arc<FixedClock>,
    sink: Arc<CollectingSink>,
    inventory: Inventory,
    watcher: InventoryWatcher,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()));
        let sink = Arc::new(CollectingSink::default());

        Self {
            inventory: Inventory::new(store.clone()),
            watcher: InventoryWatcher::new(store.clone(), clock.clone(), sink.clone()),
            store,
            clock,
            sink,
        }
    }

    fn in_days(&self, days: i64) -> Option<NaiveDate> {
        Some(self.clock.now().date_naive() + Duration::days(days))
    }
}

async fn next_update(handle: &mut WatchHandle) -> (usize, Vec<NotificationEvent>) {
    match handle.next_event().await {
        Some(WatcherEvent::Updated { items, notified }) => (items.len(), notified),
        other => panic!("expected an update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expiring_item_alerts_once() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    h.inventory
        .add_item(&owner, NewFoodItem::new("Milk", 1, h.in_days(3)))
        .await
        .unwrap();

    let mut handle = h.watcher.start(owner.clone()).await.unwrap();
    let (count, notified) = next_update(&mut handle).await;
    assert_eq!(count, 1);
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].severity, Severity::Warning);

    // Unrelated write produces an identical item list for milk: no new alert
    h.inventory
        .add_item(&owner, NewFoodItem::new("Salt", 1, None))
        .await
        .unwrap();
    let (count, notified) = next_update(&mut handle).await;
    assert_eq!(count, 2);
    assert!(notified.is_empty());

    assert_eq!(h.sink.messages(), vec!["Milk is expiring in 3 days!"]);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_expired_item_alerts_once_as_error() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    let id = h
        .inventory
        .add_item(&owner, NewFoodItem::new("Bread", 1, h.in_days(-1)))
        .await
        .unwrap();

    let mut handle = h.watcher.start(owner.clone()).await.unwrap();
    let (_, notified) = next_update(&mut handle).await;
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].severity, Severity::Error);
    assert_eq!(notified[0].message, "Bread has expired!");

    for quantity in 2..5 {
        h.inventory
            .update_item(
                &owner,
                &id,
                FoodItemPatch {
                    quantity: Some(quantity),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (_, notified) = next_update(&mut handle).await;
        assert!(notified.is_empty());
    }

    assert_eq!(h.sink.messages().len(), 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_undated_item_never_alerts() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    let id = h
        .inventory
        .add_item(&owner, NewFoodItem::new("Rice", 3, None))
        .await
        .unwrap();

    let mut handle = h.watcher.start(owner.clone()).await.unwrap();
    next_update(&mut handle).await;
    h.inventory
        .update_item(
            &owner,
            &id,
            FoodItemPatch {
                quantity: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    next_update(&mut handle).await;

    let items = handle.current_items();
    assert_eq!(items[0].category, FreshnessCategory::Unknown);
    assert!(h.sink.messages().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_expiring_then_expired_alerts_twice() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    let id = h
        .inventory
        .add_item(&owner, NewFoodItem::new("Yogurt", 1, h.in_days(2)))
        .await
        .unwrap();

    let mut handle = h.watcher.start(owner.clone()).await.unwrap();
    next_update(&mut handle).await;

    // Three days pass; the next snapshot sees the item one day past its date
    h.clock.advance(Duration::days(3));
    h.inventory
        .update_item(
            &owner,
            &id,
            FoodItemPatch {
                quantity: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    next_update(&mut handle).await;

    assert_eq!(
        h.sink.messages(),
        vec!["Yogurt is expiring in 2 days!", "Yogurt has expired!"]
    );
    handle.shutdown().await;
}

#[tokio::test]
async fn test_recreated_item_alerts_again() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    let fields = NewFoodItem::new("Cheese", 1, h.in_days(1)).to_fields();
    let store = h.store.document_store();
    store.put("foodItems/alice", "cheese", &fields).unwrap();

    let mut handle = h.watcher.start(owner.clone()).await.unwrap();
    next_update(&mut handle).await;

    h.inventory.delete_item(&owner, "cheese").await.unwrap();
    next_update(&mut handle).await;

    store.put("foodItems/alice", "cheese", &fields).unwrap();
    let (_, notified) = next_update(&mut handle).await;
    assert_eq!(notified.len(), 1);
    assert_eq!(h.sink.messages().len(), 2);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_restart_starts_with_clean_alert_history() {
    let h = Harness::new();
    let owner = OwnerId::from("alice");
    h.inventory
        .add_item(&owner, NewFoodItem::new("Milk", 1, h.in_days(3)))
        .await
        .unwrap();

    let mut first = h.watcher.start(owner.clone()).await.unwrap();
    next_update(&mut first).await;

    // Other owners' watchers share nothing with this one
    let mut other = h.watcher.start(OwnerId::from("bob")).await.unwrap();
    let (count, _) = next_update(&mut other).await;
    assert_eq!(count, 0);
    other.stop();

    first.stop();
    assert!(first.is_stopped());

    let mut second = h.watcher.start(owner.clone()).await.unwrap();
    let (_, notified) = next_update(&mut second).await;
    assert_eq!(notified.len(), 1);
    second.shutdown().await;
}

#[tokio::test]
async fn test_resubscribe_after_connection_loss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.db");
    let path = path.to_str().unwrap();
    let owner = OwnerId::from("alice");
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()));
    let sink = Arc::new(CollectingSink::default());
    let expiry = Some(NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());

    let store = Arc::new(SqliteStore::open(path).unwrap());
    Inventory::new(store.clone())
        .add_item(&owner, NewFoodItem::new("Milk", 1, expiry))
        .await
        .unwrap();

    let watcher = InventoryWatcher::new(store.clone(), clock.clone(), sink.clone());
    let mut handle = watcher.start(owner.clone()).await.unwrap();
    next_update(&mut handle).await;

    store.document_store().close("server restart").unwrap();
    match handle.next_event().await {
        Some(WatcherEvent::ConnectionLost { reason }) => assert_eq!(reason, "server restart"),
        other => panic!("expected connection loss, got {:?}", other),
    }
    assert!(handle.is_stopped());
    // The closed store can't be subscribed to again
    assert!(watcher.start(owner.clone()).await.is_err());
    handle.stop();

    // Reconnecting means a new store and a new subscription, with fresh history
    let reopened = Arc::new(SqliteStore::open(path).unwrap());
    let watcher = InventoryWatcher::new(reopened, clock, sink.clone());
    let mut resumed = watcher.start(owner).await.unwrap();
    let (count, notified) = next_update(&mut resumed).await;
    assert_eq!(count, 1);
    assert_eq!(notified.len(), 1);
    assert_eq!(sink.messages(), vec!["Milk is expiring in 3 days!"; 2]);
    resumed.shutdown().await;
}
