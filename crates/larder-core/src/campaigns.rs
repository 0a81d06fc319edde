// Crowdfunding campaigns - money pledges for food drives
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::{Fields, Record, Store, CAMPAIGNS_COLLECTION};
use crate::{Error, Result};

/// How long a new campaign runs
pub const CAMPAIGN_DAYS: u32 = 30;

const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub raised: f64,
    pub backers: u32,
    pub days_left: u32,
    pub creator: String,
}

impl Campaign {
    pub fn from_record(record: &Record) -> Result<Self> {
        let fields = &record.fields;
        let bad = |what: &str| Error::Validation(format!("campaign {} has a bad {}", record.id, what));

        let title = fields
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| bad("title"))?
            .to_string();
        let goal = fields
            .get("goal")
            .and_then(Value::as_f64)
            .filter(|g| g.is_finite() && *g > 0.0)
            .ok_or_else(|| bad("goal"))?;

        let amount = |key: &str| match fields.get(key) {
            None | Some(Value::Null) => Ok(0.0),
            Some(v) => v.as_f64().filter(|a| a.is_finite() && *a >= 0.0).ok_or_else(|| bad(key)),
        };
        let count = |key: &str, default: u32| match fields.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| bad(key)),
        };

        Ok(Self {
            id: record.id.clone(),
            title,
            description: fields
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            goal,
            raised: amount("raised")?,
            backers: count("backers", 0)?,
            days_left: count("daysLeft", CAMPAIGN_DAYS)?,
            creator: fields
                .get("creator")
                .and_then(|c| c.get("name"))
                .and_then(Value::as_str)
                .unwrap_or(ANONYMOUS)
                .to_string(),
        })
    }

    /// Share of the goal raised so far, in percent. Can pass 100.
    pub fn progress(&self) -> f64 {
        self.raised / self.goal * 100.0
    }
}

/// Input for starting a campaign
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub creator: Option<String>,
}

impl NewCampaign {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("campaign title must not be empty".into()));
        }
        if !self.goal.is_finite() || self.goal <= 0.0 {
            return Err(Error::Validation(format!(
                "campaign goal must be a positive amount, got {}",
                self.goal
            )));
        }
        Ok(())
    }

    fn to_fields(&self) -> Fields {
        let creator = self
            .creator
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(ANONYMOUS);

        let value = json!({
            "title": self.title.trim(),
            "description": self.description.trim(),
            "goal": self.goal,
            "raised": 0.0,
            "backers": 0,
            "daysLeft": CAMPAIGN_DAYS,
            "creator": { "name": creator },
        });
        match value {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        }
    }
}

/// Create, browse and back campaigns
pub struct Campaigns {
    store: Arc<dyn Store>,
}

impl Campaigns {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, campaign: NewCampaign) -> Result<String> {
        campaign.validate()?;
        let id = self.store.create(CAMPAIGNS_COLLECTION, campaign.to_fields()).await?;

        info!("Started campaign {} ({}) with a goal of {:.2}", campaign.title, id, campaign.goal);
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<Campaign>> {
        let records = self.store.list(CAMPAIGNS_COLLECTION).await?;
        let mut campaigns = Vec::with_capacity(records.len());
        for record in &records {
            match Campaign::from_record(record) {
                Ok(campaign) => campaigns.push(campaign),
                Err(e) => warn!("Skipping malformed campaign: {}", e),
            }
        }
        Ok(campaigns)
    }

    /// Back a campaign: adds `amount` to what was raised and counts one more backer
    ///
    /// Read then write, like accepting a donation; two backers landing at the
    /// same instant can lose one of the increments.
    pub async fn donate(&self, campaign_id: &str, amount: f64) -> Result<Campaign> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::Validation(format!(
                "donation amount must be positive, got {}",
                amount
            )));
        }

        let record = self
            .store
            .fetch(CAMPAIGNS_COLLECTION, campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        let mut campaign = Campaign::from_record(&record)?;

        campaign.raised += amount;
        campaign.backers += 1;

        let mut patch = Fields::new();
        patch.insert("raised".into(), json!(campaign.raised));
        patch.insert("backers".into(), json!(campaign.backers));
        self.store.update(CAMPAIGNS_COLLECTION, campaign_id, patch).await?;

        info!("{:.2} pledged to campaign {}", amount, campaign_id);
        Ok(campaign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;
    use crate::stores::SqliteStore;

    fn drive(goal: f64) -> NewCampaign {
        NewCampaign {
            title: "Winter food drive".into(),
            description: "Hot meals for the shelter".into(),
            goal,
            creator: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_donate() {
        let campaigns = Campaigns::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let id = campaigns.create(drive(500.0)).await.unwrap();

        campaigns.donate(&id, 120.0).await.unwrap();
        let updated = campaigns.donate(&id, 30.5).await.unwrap();
        assert_eq!(updated.raised, 150.5);
        assert_eq!(updated.backers, 2);

        let listed = campaigns.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].raised, 150.5);
        assert_eq!(listed[0].days_left, CAMPAIGN_DAYS);
        assert_eq!(listed[0].creator, "Anonymous");
        assert!((listed[0].progress() - 30.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let mut store = MockStore::new();
        store.expect_fetch().never();
        store.expect_update().never();

        let campaigns = Campaigns::new(Arc::new(store));
        for amount in [0.0, -5.0, f64::NAN] {
            let result = campaigns.donate("c1", amount).await;
            assert!(matches!(result, Err(Error::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_donate_to_missing_campaign() {
        let mut store = MockStore::new();
        store.expect_fetch().return_once(|_, _| Ok(None));
        store.expect_update().never();

        let campaigns = Campaigns::new(Arc::new(store));
        assert!(matches!(
            campaigns.donate("ghost", 10.0).await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_campaign_needs_title_and_goal() {
        assert!(drive(100.0).validate().is_ok());
        assert!(drive(0.0).validate().is_err());
        assert!(NewCampaign { title: " ".into(), ..drive(10.0) }.validate().is_err());
    }
}
