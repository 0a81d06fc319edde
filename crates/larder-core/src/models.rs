use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Fields, Record};
use crate::{Error, Result};

/// Identifier of a user who owns food items
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

/// Identifier of a registered NGO
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NgoId(pub String);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for NgoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        OwnerId(value.to_string())
    }
}

impl From<&str> for NgoId {
    fn from(value: &str) -> Self {
        NgoId(value.to_string())
    }
}

/// A perishable item in someone's pantry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: String,
    pub owner_id: OwnerId,
    pub name: String,
    pub quantity: u32,
    /// None means we simply don't know
    pub expiry_date: Option<NaiveDate>,
}

impl FoodItem {
    /// Parse a stored record. Anything we can't make sense of is an error so
    /// the caller can skip the record and say why.
    pub fn from_record(owner_id: &OwnerId, record: &Record) -> Result<Self> {
        let name = match record.fields.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            Some(Value::String(_)) => {
                return Err(Error::Validation(format!("item {} has a blank name", record.id)))
            }
            Some(other) => {
                return Err(Error::Validation(format!(
                    "item {} has a non-text name: {}",
                    record.id, other
                )))
            }
            None => return Err(Error::Validation(format!("item {} has no name", record.id))),
        };

        let quantity = match record.fields.get("quantity") {
            None | Some(Value::Null) => 0,
            Some(value) => parse_quantity(value).ok_or_else(|| {
                Error::Validation(format!("item {} has a bad quantity: {}", record.id, value))
            })?,
        };

        let expiry_date = match record.fields.get("expiryDate") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if raw.trim().is_empty() => None,
            Some(Value::String(raw)) => Some(parse_expiry_date(raw).ok_or_else(|| {
                Error::Validation(format!("item {} has a bad expiry date: {}", record.id, raw))
            })?),
            Some(other) => {
                return Err(Error::Validation(format!(
                    "item {} has a non-text expiry date: {}",
                    record.id, other
                )))
            }
        };

        Ok(Self {
            id: record.id.clone(),
            owner_id: owner_id.clone(),
            name,
            quantity,
            expiry_date,
        })
    }
}

/// Quantities are whole, non-negative numbers. Older clients wrote them as strings.
fn parse_quantity(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|q| u32::try_from(q).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Expiry dates are stored as `YYYY-MM-DD`; full timestamps are accepted and
/// reduced to their UTC calendar date.
pub fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc().date()))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Input for adding an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFoodItem {
    pub name: String,
    pub quantity: u32,
    pub expiry_date: Option<NaiveDate>,
}

impl NewFoodItem {
    pub fn new(name: impl Into<String>, quantity: u32, expiry_date: Option<NaiveDate>) -> Self {
        Self {
            name: name.into(),
            quantity,
            expiry_date,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("item name must not be empty".into()));
        }
        Ok(())
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::String(self.name.trim().to_string()));
        fields.insert("quantity".into(), Value::from(self.quantity));
        if let Some(date) = self.expiry_date {
            fields.insert("expiryDate".into(), Value::String(format_date(date)));
        }
        fields
    }
}

/// Partial update of an item. `expiry_date: Some(None)` clears the date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoodItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub expiry_date: Option<Option<NaiveDate>>,
}

impl FoodItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none() && self.expiry_date.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Validation("nothing to update".into()));
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::Validation("item name must not be empty".into()));
        }
        Ok(())
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(name) = &self.name {
            fields.insert("name".into(), Value::String(name.trim().to_string()));
        }
        if let Some(quantity) = self.quantity {
            fields.insert("quantity".into(), Value::from(quantity));
        }
        match self.expiry_date {
            Some(Some(date)) => {
                fields.insert("expiryDate".into(), Value::String(format_date(date)));
            }
            // Null tells the store to drop the field
            Some(None) => {
                fields.insert("expiryDate".into(), Value::Null);
            }
            None => {}
        }
        fields
    }
}

/// Donation request status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonationStatus {
    Pending,
    Accepted,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "Pending",
            DonationStatus::Accepted => "Accepted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(DonationStatus::Pending),
            "Accepted" => Some(DonationStatus::Accepted),
            _ => None,
        }
    }

    /// Returns true if transitioning from self to `next` is valid
    pub fn can_transition_to(&self, next: DonationStatus) -> bool {
        matches!((self, next), (DonationStatus::Pending, DonationStatus::Accepted))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DonationStatus::Accepted)
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An offer of food sitting in an NGO's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRequest {
    pub id: String,
    pub ngo_id: NgoId,
    pub item_name: String,
    pub donor_id: String,
    pub status: DonationStatus,
}

impl DonationRequest {
    /// Fields for a brand new pending offer
    pub fn offer(item_name: &str, donor_id: &str) -> Result<Fields> {
        if item_name.trim().is_empty() {
            return Err(Error::Validation("donated item name must not be empty".into()));
        }
        if donor_id.trim().is_empty() {
            return Err(Error::Validation("donor id must not be empty".into()));
        }

        let mut fields = Fields::new();
        fields.insert("itemName".into(), Value::String(item_name.trim().to_string()));
        fields.insert("donorId".into(), Value::String(donor_id.trim().to_string()));
        fields.insert(
            "status".into(),
            Value::String(DonationStatus::Pending.as_str().to_string()),
        );
        Ok(fields)
    }

    pub fn from_record(ngo_id: &NgoId, record: &Record) -> Result<Self> {
        let text = |key: &str| -> String {
            record
                .fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        // Requests written before the status field existed count as pending
        let status = match record.fields.get("status") {
            None | Some(Value::Null) => DonationStatus::Pending,
            Some(Value::String(raw)) => DonationStatus::parse(raw).ok_or_else(|| {
                Error::Validation(format!(
                    "donation request {} has unknown status {:?}",
                    record.id, raw
                ))
            })?,
            Some(other) => {
                return Err(Error::Validation(format!(
                    "donation request {} has a non-text status: {}",
                    record.id, other
                )))
            }
        };

        Ok(Self {
            id: record.id.clone(),
            ngo_id: ngo_id.clone(),
            item_name: text("itemName"),
            donor_id: text("donorId"),
            status,
        })
    }
}
