use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::models::{DonationRequest, DonationStatus, NgoId};
use crate::store::{donations_path, Fields, Store};
use crate::{Error, Result};

/// Moves donation requests from Pending to Accepted
///
/// That is the only transition there is.
pub struct DonationWorkflow {
    store: Arc<dyn Store>,
}

impl DonationWorkflow {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Accept a pending request on behalf of its NGO
    ///
    /// Accepting twice is reported as `AlreadyAccepted` rather than silently
    /// succeeding, so callers can tell "done" from "nothing to do".
    pub async fn accept(&self, ngo_id: &NgoId, request_id: &str) -> Result<()> {
        let collection = donations_path(ngo_id)?;

        let record = self
            .store
            .fetch(&collection, request_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "donation request {} for NGO {}",
                    request_id, ngo_id
                ))
            })?;

        let request = DonationRequest::from_record(ngo_id, &record)?;

        if !request.status.can_transition_to(DonationStatus::Accepted) {
            return Err(Error::AlreadyAccepted {
                ngo_id: ngo_id.to_string(),
                request_id: request_id.to_string(),
            });
        }

        let mut patch = Fields::new();
        patch.insert(
            "status".into(),
            Value::String(DonationStatus::Accepted.as_str().to_string()),
        );
        self.store.update(&collection, request_id, patch).await?;

        info!(
            "NGO {} accepted donation request {} ({} from {})",
            ngo_id, request_id, request.item_name, request.donor_id
        );
        Ok(())
    }
}

/// Read an NGO's requests, skipping any that can't be parsed
pub async fn list_requests(store: &dyn Store, ngo_id: &NgoId) -> Result<Vec<DonationRequest>> {
    let collection = donations_path(ngo_id)?;
    let records = store.list(&collection).await?;

    let mut requests = Vec::with_capacity(records.len());
    for record in &records {
        match DonationRequest::from_record(ngo_id, record) {
            Ok(request) => requests.push(request),
            Err(e) => warn!("Skipping malformed donation request for {}: {}", ngo_id, e),
        }
    }
    Ok(requests)
}

/// Put a new pending offer into an NGO's inbox (the donor side of the flow)
pub async fn offer_donation(
    store: &dyn Store,
    ngo_id: &NgoId,
    item_name: &str,
    donor_id: &str,
) -> Result<String> {
    let collection = donations_path(ngo_id)?;
    let fields = DonationRequest::offer(item_name, donor_id)?;
    let id = store.create(&collection, fields).await?;

    info!("{} offered {} to NGO {} (request {})", donor_id, item_name, ngo_id, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockStore, Record};
    use serde_json::json;

    fn request(status: &str) -> Record {
        Record {
            id: "r1".into(),
            fields: json!({"itemName": "Apples", "donorId": "alice", "status": status})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_accept_pending_writes_status() {
        let mut store = MockStore::new();
        store
            .expect_fetch()
            .withf(|collection, id| collection == "ngos/food-bank/donations" && id == "r1")
            .return_once(|_, _| Ok(Some(request("Pending"))));
        store
            .expect_update()
            .withf(|_, id, fields| id == "r1" && fields["status"] == "Accepted")
            .times(1)
            .return_once(|_, _, _| Ok(()));

        let workflow = DonationWorkflow::new(Arc::new(store));
        workflow.accept(&NgoId::from("food-bank"), "r1").await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_twice_reports_already_accepted() {
        let mut store = MockStore::new();
        store
            .expect_fetch()
            .return_once(|_, _| Ok(Some(request("Accepted"))));
        store.expect_update().never();

        let workflow = DonationWorkflow::new(Arc::new(store));
        let result = workflow.accept(&NgoId::from("food-bank"), "r1").await;
        assert!(matches!(result, Err(Error::AlreadyAccepted { .. })));
    }

    #[tokio::test]
    async fn test_accept_missing_request() {
        let mut store = MockStore::new();
        store.expect_fetch().return_once(|_, _| Ok(None));
        store.expect_update().never();

        let workflow = DonationWorkflow::new(Arc::new(store));
        let result = workflow.accept(&NgoId::from("food-bank"), "nope").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_accept_surfaces_write_failure() {
        let mut store = MockStore::new();
        store
            .expect_fetch()
            .return_once(|_, _| Ok(Some(request("Pending"))));
        store
            .expect_update()
            .return_once(|_, _, _| Err(Error::ConnectionLost("timeout".into())));

        let workflow = DonationWorkflow::new(Arc::new(store));
        let result = workflow.accept(&NgoId::from("food-bank"), "r1").await;
        assert!(matches!(result, Err(Error::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn test_unknown_status_is_not_overwritten() {
        let mut store = MockStore::new();
        store
            .expect_fetch()
            .return_once(|_, _| Ok(Some(request("Cancelled"))));
        store.expect_update().never();

        let workflow = DonationWorkflow::new(Arc::new(store));
        let result = workflow.accept(&NgoId::from("food-bank"), "r1").await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
