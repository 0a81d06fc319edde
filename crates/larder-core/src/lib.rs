// The domain engine: freshness, alerts, donations, NGOs and campaigns
pub mod alerts;
pub mod campaigns;
pub mod clock;
pub mod config;
pub mod donation;
pub mod error;
pub mod extraction;
pub mod freshness;
pub mod inventory;
pub mod models;
pub mod notifications;
pub mod registry;
pub mod store;
pub mod stores;
pub mod watcher;

pub use alerts::AlertDeduper;
pub use campaigns::{Campaign, Campaigns, NewCampaign};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use donation::DonationWorkflow;
pub use error::Error;
pub use extraction::{ExpiryExtractor, HttpExtractor};
pub use freshness::{ClassifiedItem, ExpiryClassifier, FreshnessCategory};
pub use inventory::{Inventory, InventorySummary};
pub use models::{DonationRequest, DonationStatus, FoodItem, FoodItemPatch, NewFoodItem, NgoId, OwnerId};
pub use notifications::{NotificationEvent, NotificationSink, Severity, TracingSink};
pub use registry::{Ngo, NgoRegistry};
pub use store::{Store, StoreEvent};
pub use stores::SqliteStore;
pub use watcher::{InventoryWatcher, SnapshotProcessor, WatchHandle, WatcherEvent};

/// Result type alias used across the engine
pub type Result<T> = std::result::Result<T, Error>;
