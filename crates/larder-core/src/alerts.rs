use std::collections::HashSet;

use tracing::debug;

use crate::freshness::FreshnessCategory;

/// Remembers which (item, category) pairs have already been announced
///
/// Owned by exactly one watcher subscription and thrown away with it. Not
/// shared, not locked: one writer only.
#[derive(Debug, Default)]
pub struct AlertDeduper {
    seen: HashSet<(String, FreshnessCategory)>,
}

impl AlertDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an item is seen in an alert-worthy category, after
    /// which the pair is remembered and further calls return false.
    pub fn should_notify(&mut self, item_id: &str, category: FreshnessCategory) -> bool {
        if !category.is_alert_worthy() {
            return false;
        }
        self.seen.insert((item_id.to_string(), category))
    }

    /// Drop everything remembered about an item (it was deleted)
    pub fn forget(&mut self, item_id: &str) {
        let before = self.seen.len();
        self.seen.retain(|(id, _)| id != item_id);
        if self.seen.len() < before {
            debug!("Forgot alert history for item {}", item_id);
        }
    }

    pub fn has_notified(&self, item_id: &str, category: FreshnessCategory) -> bool {
        self.seen.contains(&(item_id.to_string(), category))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_categories_never_notify() {
        let mut deduper = AlertDeduper::new();
        assert!(!deduper.should_notify("milk", FreshnessCategory::Fresh));
        assert!(!deduper.should_notify("milk", FreshnessCategory::Unknown));
        assert!(deduper.is_empty());
    }

    #[test]
    fn test_notifies_once_per_pair() {
        let mut deduper = AlertDeduper::new();
        assert!(deduper.should_notify("milk", FreshnessCategory::ExpiringSoon));
        assert!(!deduper.should_notify("milk", FreshnessCategory::ExpiringSoon));
        assert!(!deduper.should_notify("milk", FreshnessCategory::ExpiringSoon));

        // Other items are tracked separately
        assert!(deduper.should_notify("eggs", FreshnessCategory::ExpiringSoon));
    }

    #[test]
    fn test_each_transition_is_alertable() {
        let mut deduper = AlertDeduper::new();
        assert!(deduper.should_notify("milk", FreshnessCategory::ExpiringSoon));
        assert!(deduper.should_notify("milk", FreshnessCategory::Expired));
        assert!(!deduper.should_notify("milk", FreshnessCategory::Expired));
        assert_eq!(deduper.len(), 2);
    }

    #[test]
    fn test_forget_resets_only_that_item() {
        let mut deduper = AlertDeduper::new();
        deduper.should_notify("milk", FreshnessCategory::ExpiringSoon);
        deduper.should_notify("milk", FreshnessCategory::Expired);
        deduper.should_notify("eggs", FreshnessCategory::Expired);

        deduper.forget("milk");

        assert!(!deduper.has_notified("milk", FreshnessCategory::Expired));
        assert!(deduper.has_notified("eggs", FreshnessCategory::Expired));
        assert!(deduper.should_notify("milk", FreshnessCategory::Expired));

        // Forgetting something unknown is harmless
        deduper.forget("bread");
        assert_eq!(deduper.len(), 2);
    }
}
