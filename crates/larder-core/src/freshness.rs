use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FoodItem;

/// Items with this many days left or fewer are expiring soon
pub const EXPIRING_SOON_DAYS: i64 = 7;

/// How close an item is to spoiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessCategory {
    /// No expiry date on record
    Unknown,
    /// More than a week to go
    Fresh,
    /// Expires within the week, today included
    ExpiringSoon,
    /// Expiry date has passed
    Expired,
}

impl FreshnessCategory {
    pub fn from_days_left(days_left: Option<i64>) -> Self {
        match days_left {
            None => FreshnessCategory::Unknown,
            Some(d) if d < 0 => FreshnessCategory::Expired,
            Some(d) if d <= EXPIRING_SOON_DAYS => FreshnessCategory::ExpiringSoon,
            Some(_) => FreshnessCategory::Fresh,
        }
    }

    /// Whether reaching this category deserves a notification
    pub fn is_alert_worthy(&self) -> bool {
        matches!(self, FreshnessCategory::ExpiringSoon | FreshnessCategory::Expired)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FreshnessCategory::Unknown => "unknown",
            FreshnessCategory::Fresh => "fresh",
            FreshnessCategory::ExpiringSoon => "expiring-soon",
            FreshnessCategory::Expired => "expired",
        }
    }
}

impl std::fmt::Display for FreshnessCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A food item together with where it sits on the spoilage scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub item: FoodItem,
    pub category: FreshnessCategory,
    pub days_left: Option<i64>,
}

/// Freshness classification
///
/// Works on whole calendar days (UTC) rather than millisecond differences,
/// so an item doesn't flip category halfway through the day it expires.
pub struct ExpiryClassifier;

impl ExpiryClassifier {
    /// Whole days from `now` until `expiry`. Negative once it has passed.
    pub fn days_left(expiry: NaiveDate, now: DateTime<Utc>) -> i64 {
        (expiry - now.date_naive()).num_days()
    }

    pub fn classify(expiry: Option<NaiveDate>, now: DateTime<Utc>) -> FreshnessCategory {
        FreshnessCategory::from_days_left(expiry.map(|date| Self::days_left(date, now)))
    }

    pub fn classify_item(item: FoodItem, now: DateTime<Utc>) -> ClassifiedItem {
        let days_left = item.expiry_date.map(|date| Self::days_left(date, now));
        ClassifiedItem {
            category: FreshnessCategory::from_days_left(days_left),
            days_left,
            item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_no_date_is_unknown() {
        assert_eq!(ExpiryClassifier::classify(None, Utc::now()), FreshnessCategory::Unknown);
    }

    #[test]
    fn test_thresholds() {
        let now = at(2024, 5, 10, 9);

        assert_eq!(ExpiryClassifier::classify(Some(date(2024, 5, 9)), now), FreshnessCategory::Expired);
        assert_eq!(ExpiryClassifier::classify(Some(date(2024, 5, 10)), now), FreshnessCategory::ExpiringSoon);
        assert_eq!(ExpiryClassifier::classify(Some(date(2024, 5, 17)), now), FreshnessCategory::ExpiringSoon);
        assert_eq!(ExpiryClassifier::classify(Some(date(2024, 5, 18)), now), FreshnessCategory::Fresh);
    }

    #[test]
    fn test_same_day_does_not_flicker() {
        let expiry = Some(date(2024, 5, 10));
        let early = at(2024, 5, 10, 0);
        let late = at(2024, 5, 10, 23);

        assert_eq!(ExpiryClassifier::classify(expiry, early), FreshnessCategory::ExpiringSoon);
        assert_eq!(ExpiryClassifier::classify(expiry, late), FreshnessCategory::ExpiringSoon);
        assert_eq!(ExpiryClassifier::days_left(date(2024, 5, 10), late), 0);
    }

    #[test]
    fn test_days_left_counts_calendar_days() {
        let now = at(2024, 5, 10, 18);
        assert_eq!(ExpiryClassifier::days_left(date(2024, 5, 13), now), 3);
        assert_eq!(ExpiryClassifier::days_left(date(2024, 5, 9), now), -1);
        // Across a month boundary
        assert_eq!(ExpiryClassifier::days_left(date(2024, 6, 1), now), 22);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let now = at(2024, 2, 28, 12);
        for offset in -10..20 {
            let expiry = Some((now + Duration::days(offset)).date_naive());
            let first = ExpiryClassifier::classify(expiry, now);
            for _ in 0..3 {
                assert_eq!(ExpiryClassifier::classify(expiry, now), first);
            }
        }
    }

    #[test]
    fn test_labels_match_serde_names() {
        let json = serde_json::to_string(&FreshnessCategory::ExpiringSoon).unwrap();
        assert_eq!(json, format!("\"{}\"", FreshnessCategory::ExpiringSoon.label()));
    }
}
