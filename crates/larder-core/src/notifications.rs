use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::freshness::{ClassifiedItem, FreshnessCategory};

/// How loudly a notification should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// An expiry alert for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub item_id: String,
    pub item_name: String,
    pub category: FreshnessCategory,
    pub message: String,
    pub severity: Severity,
}

impl NotificationEvent {
    /// Build the alert for an item, if its category warrants one
    pub fn for_item(classified: &ClassifiedItem) -> Option<Self> {
        let name = &classified.item.name;

        let (message, severity) = match classified.category {
            FreshnessCategory::ExpiringSoon => (
                format!(
                    "{} is expiring in {} days!",
                    name,
                    classified.days_left.unwrap_or_default()
                ),
                Severity::Warning,
            ),
            FreshnessCategory::Expired => (format!("{} has expired!", name), Severity::Error),
            FreshnessCategory::Fresh | FreshnessCategory::Unknown => return None,
        };

        Some(Self {
            item_id: classified.item.id.clone(),
            item_name: name.clone(),
            category: classified.category,
            message,
            severity,
        })
    }
}

/// Whatever shows alerts to a human: toasts, terminal, a log file
///
/// Fire-and-forget: nothing comes back and the engine doesn't wait.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: NotificationEvent);
}

/// Sink that just writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, event: NotificationEvent) {
        match event.severity {
            Severity::Warning => warn!(item = %event.item_id, "{}", event.message),
            Severity::Error => error!(item = %event.item_id, "{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FoodItem, OwnerId};

    fn classified(category: FreshnessCategory, days_left: Option<i64>) -> ClassifiedItem {
        ClassifiedItem {
            item: FoodItem {
                id: "milk".into(),
                owner_id: OwnerId::from("alice"),
                name: "Milk".into(),
                quantity: 1,
                expiry_date: None,
            },
            category,
            days_left,
        }
    }

    #[test]
    fn test_expiring_soon_message() {
        let event = NotificationEvent::for_item(&classified(FreshnessCategory::ExpiringSoon, Some(3))).unwrap();
        assert_eq!(event.message, "Milk is expiring in 3 days!");
        assert_eq!(event.severity, Severity::Warning);
    }

    #[test]
    fn test_expired_message() {
        let event = NotificationEvent::for_item(&classified(FreshnessCategory::Expired, Some(-1))).unwrap();
        assert_eq!(event.message, "Milk has expired!");
        assert_eq!(event.severity, Severity::Error);
    }

    #[test]
    fn test_quiet_categories_have_no_event() {
        assert!(NotificationEvent::for_item(&classified(FreshnessCategory::Fresh, Some(30))).is_none());
        assert!(NotificationEvent::for_item(&classified(FreshnessCategory::Unknown, None)).is_none());
    }
}
