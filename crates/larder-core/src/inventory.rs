use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::extraction::ExpiryExtractor;
use crate::freshness::{ClassifiedItem, ExpiryClassifier, FreshnessCategory};
use crate::models::{FoodItem, FoodItemPatch, NewFoodItem, OwnerId};
use crate::store::{food_items_path, Store};
use crate::Result;

/// Owner-side item management: add, edit, remove, look
///
/// Writes go straight to the store; any running watcher picks them up from
/// the next snapshot.
pub struct Inventory {
    store: Arc<dyn Store>,
}

impl Inventory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn add_item(&self, owner_id: &OwnerId, item: NewFoodItem) -> Result<String> {
        item.validate()?;
        let collection = food_items_path(owner_id)?;

        let id = self.store.create(&collection, item.to_fields()).await?;
        info!("Added {} ({}) for {}", item.name, id, owner_id);
        Ok(id)
    }

    /// Add an item whose expiry date is read off a photo
    ///
    /// A photo without a readable date still adds the item, just without a date.
    pub async fn add_from_image(
        &self,
        owner_id: &OwnerId,
        name: &str,
        quantity: u32,
        image: &[u8],
        file_name: &str,
        extractor: &dyn ExpiryExtractor,
    ) -> Result<(String, Option<NaiveDate>)> {
        // Validate before uploading anything
        NewFoodItem::new(name, quantity, None).validate()?;
        food_items_path(owner_id)?;

        let expiry = extractor.extract_expiry(image, file_name).await?;
        if expiry.is_none() {
            warn!("No expiry date found in {}, adding {} without one", file_name, name);
        }

        let id = self
            .add_item(owner_id, NewFoodItem::new(name, quantity, expiry))
            .await?;
        Ok((id, expiry))
    }

    pub async fn update_item(&self, owner_id: &OwnerId, item_id: &str, patch: FoodItemPatch) -> Result<()> {
        patch.validate()?;
        let collection = food_items_path(owner_id)?;

        self.store.update(&collection, item_id, patch.to_fields()).await?;
        info!("Updated item {} for {}", item_id, owner_id);
        Ok(())
    }

    pub async fn delete_item(&self, owner_id: &OwnerId, item_id: &str) -> Result<()> {
        let collection = food_items_path(owner_id)?;

        self.store.delete(&collection, item_id).await?;
        info!("Deleted item {} for {}", item_id, owner_id);
        Ok(())
    }

    /// One-off read of an owner's items, classified as of `now`
    pub async fn list_items(&self, owner_id: &OwnerId, now: DateTime<Utc>) -> Result<Vec<ClassifiedItem>> {
        let collection = food_items_path(owner_id)?;
        let records = self.store.list(&collection).await?;

        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            match FoodItem::from_record(owner_id, record) {
                Ok(item) => items.push(ExpiryClassifier::classify_item(item, now)),
                Err(e) => warn!("Skipping malformed item in {}'s inventory: {}", owner_id, e),
            }
        }
        Ok(items)
    }
}

/// Dashboard counts for an inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total: usize,
    pub fresh: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub unknown: usize,
}

impl InventorySummary {
    pub fn from_items(items: &[ClassifiedItem]) -> Self {
        let mut summary = Self {
            total: items.len(),
            ..Self::default()
        };

        for item in items {
            match item.category {
                FreshnessCategory::Fresh => summary.fresh += 1,
                FreshnessCategory::ExpiringSoon => summary.expiring_soon += 1,
                FreshnessCategory::Expired => summary.expired += 1,
                FreshnessCategory::Unknown => summary.unknown += 1,
            }
        }

        summary
    }
}
