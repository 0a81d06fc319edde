use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::models::{NgoId, OwnerId};
use crate::{Error, Result};

/// Field map of a stored document
pub type Fields = Map<String, Value>;

/// One document as delivered by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

/// Something happening on a subscribed collection
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Complete, ordered contents of the collection
    Snapshot(Vec<Record>),
    /// Transport gave up; nothing more will arrive on this stream
    ConnectionLost(String),
}

/// Identifies a subscription so it can be released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Push stream of store events for one collection
pub struct SnapshotStream {
    handle: SubscriptionHandle,
    events: mpsc::UnboundedReceiver<StoreEvent>,
}

impl SnapshotStream {
    pub fn new(handle: SubscriptionHandle, events: mpsc::UnboundedReceiver<StoreEvent>) -> Self {
        Self { handle, events }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Next event, or None once the store has hung up
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.events.recv().await
    }
}

/// The external document store
///
/// The engine never owns data: it reads snapshots and writes through this
/// trait. Swapping the backing database only means writing another adapter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Subscribe to a collection. The current snapshot arrives first.
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream>;

    /// Release a subscription. Unknown or already released handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Record>>;

    async fn list(&self, collection: &str) -> Result<Vec<Record>>;

    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Collection holding the NGO registry
pub const NGOS_COLLECTION: &str = "ngos";

/// Collection holding crowdfunding campaigns
pub const CAMPAIGNS_COLLECTION: &str = "campaigns";

/// Ids become path segments, so they can't be blank or contain slashes
fn path_segment<'a>(kind: &str, id: &'a str) -> Result<&'a str> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(Error::Validation(format!("invalid {} id: {:?}", kind, id)));
    }
    Ok(id)
}

/// Collection holding one owner's food items
pub fn food_items_path(owner_id: &OwnerId) -> Result<String> {
    Ok(format!("foodItems/{}", path_segment("owner", &owner_id.0)?))
}

/// Collection holding one NGO's donation requests
pub fn donations_path(ngo_id: &NgoId) -> Result<String> {
    Ok(format!("ngos/{}/donations", path_segment("NGO", &ngo_id.0)?))
}
