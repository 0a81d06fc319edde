// NGO registry - the organisations donations can be sent to
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::models::NgoId;
use crate::store::{donations_path, Fields, Record, Store, NGOS_COLLECTION};
use crate::{Error, Result};

/// A registered NGO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ngo {
    pub id: NgoId,
    pub name: String,
}

impl Ngo {
    pub fn from_record(record: &Record) -> Result<Self> {
        match record.fields.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => Ok(Self {
                id: NgoId(record.id.clone()),
                name: name.clone(),
            }),
            _ => Err(Error::Validation(format!("NGO {} has no name", record.id))),
        }
    }
}

/// Admin-side management of the `ngos` collection
pub struct NgoRegistry {
    store: Arc<dyn Store>,
}

impl NgoRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register(&self, name: &str) -> Result<NgoId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("NGO name must not be empty".into()));
        }

        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String(name.to_string()));
        let id = self.store.create(NGOS_COLLECTION, fields).await?;

        info!("Registered NGO {} ({})", name, id);
        Ok(NgoId(id))
    }

    pub async fn get(&self, ngo_id: &NgoId) -> Result<Option<Ngo>> {
        // Registry ids follow the same rules as inbox path segments
        donations_path(ngo_id)?;
        match self.store.fetch(NGOS_COLLECTION, &ngo_id.0).await? {
            Some(record) => Ok(Some(Ngo::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Registered NGOs in registration order; unreadable entries are skipped
    pub async fn list(&self) -> Result<Vec<Ngo>> {
        let records = self.store.list(NGOS_COLLECTION).await?;

        let mut ngos = Vec::with_capacity(records.len());
        for record in &records {
            match Ngo::from_record(record) {
                Ok(ngo) => ngos.push(ngo),
                Err(e) => warn!("Skipping malformed NGO entry: {}", e),
            }
        }
        Ok(ngos)
    }

    /// Take an NGO off the registry
    ///
    /// Its donation requests stay where they are; requests are never deleted.
    pub async fn remove(&self, ngo_id: &NgoId) -> Result<()> {
        donations_path(ngo_id)?;
        if self.store.fetch(NGOS_COLLECTION, &ngo_id.0).await?.is_none() {
            return Err(Error::NotFound(format!("NGO {}", ngo_id)));
        }

        self.store.delete(NGOS_COLLECTION, &ngo_id.0).await?;
        info!("Removed NGO {} from the registry", ngo_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donation::{list_requests, offer_donation};
    use crate::store::MockStore;
    use crate::stores::SqliteStore;

    #[tokio::test]
    async fn test_register_list_remove() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let registry = NgoRegistry::new(store.clone());

        let food_bank = registry.register("  City Food Bank ").await.unwrap();
        registry.register("Soup Kitchen").await.unwrap();

        let names: Vec<_> = registry.list().await.unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["City Food Bank", "Soup Kitchen"]);

        offer_donation(store.as_ref(), &food_bank, "Apples", "alice").await.unwrap();
        registry.remove(&food_bank).await.unwrap();

        assert!(registry.get(&food_bank).await.unwrap().is_none());
        // The request history outlives the registry entry
        assert_eq!(list_requests(store.as_ref(), &food_bank).await.unwrap().len(), 1);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_rejected_without_write() {
        let mut store = MockStore::new();
        store.expect_create().never();

        let registry = NgoRegistry::new(Arc::new(store));
        assert!(matches!(registry.register("   ").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_remove_unknown_ngo() {
        let mut store = MockStore::new();
        store.expect_fetch().return_once(|_, _| Ok(None));
        store.expect_delete().never();

        let registry = NgoRegistry::new(Arc::new(store));
        let result = registry.remove(&NgoId::from("ghost")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
