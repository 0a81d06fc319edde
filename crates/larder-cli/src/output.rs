// Terminal rendering for items, summaries and alerts
use larder_core::{
    Campaign, ClassifiedItem, DonationRequest, FreshnessCategory, InventorySummary, Ngo,
    NotificationEvent, NotificationSink, Severity,
};

/// Prints alerts straight to the terminal
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn emit(&self, event: NotificationEvent) {
        println!("{}", format_notification(&event));
    }
}

pub fn format_notification(event: &NotificationEvent) -> String {
    let marker = match event.severity {
        Severity::Warning => "⚠",
        Severity::Error => "✗",
    };
    format!("{} {}", marker, event.message)
}

fn status_label(category: FreshnessCategory) -> &'static str {
    match category {
        FreshnessCategory::Unknown => "Unknown",
        FreshnessCategory::Fresh => "Fresh",
        FreshnessCategory::ExpiringSoon => "Expiring Soon",
        FreshnessCategory::Expired => "Expired",
    }
}

pub fn format_items(items: &[ClassifiedItem]) -> String {
    if items.is_empty() {
        return "No food items yet.\n".to_string();
    }

    let mut out = format!(
        "{:<32}  {:<24}  {:>8}  {:<11}  {}\n",
        "ID", "FOOD ITEM", "QUANTITY", "EXPIRY DATE", "STATUS"
    );
    for c in items {
        let expiry = c
            .item
            .expiry_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "No Date".to_string());
        out.push_str(&format!(
            "{:<32}  {:<24}  {:>8}  {:<11}  {}\n",
            c.item.id,
            c.item.name,
            c.item.quantity,
            expiry,
            status_label(c.category)
        ));
    }
    out
}

pub fn format_summary(summary: &InventorySummary) -> String {
    format!(
        "Total items:   {}\nFresh:         {}\nExpiring soon: {}\nExpired:       {}\nNo date:       {}",
        summary.total, summary.fresh, summary.expiring_soon, summary.expired, summary.unknown
    )
}

pub fn format_requests(requests: &[DonationRequest]) -> String {
    if requests.is_empty() {
        return "No donation requests.\n".to_string();
    }

    let mut out = format!("{:<32}  {:<24}  {:<16}  {}\n", "ID", "ITEM", "DONOR", "STATUS");
    for r in requests {
        out.push_str(&format!(
            "{:<32}  {:<24}  {:<16}  {}\n",
            r.id, r.item_name, r.donor_id, r.status
        ));
    }
    out
}

pub fn format_ngos(ngos: &[Ngo]) -> String {
    if ngos.is_empty() {
        return "No NGOs registered.\n".to_string();
    }

    let mut out = format!("{:<32}  {}\n", "ID", "NGO NAME");
    for ngo in ngos {
        out.push_str(&format!("{:<32}  {}\n", ngo.id.0, ngo.name));
    }
    out
}

pub fn format_campaigns(campaigns: &[Campaign]) -> String {
    if campaigns.is_empty() {
        return "No campaigns yet.\n".to_string();
    }

    let mut out = String::new();
    for c in campaigns {
        out.push_str(&format!(
            "{} ({})\n  {:.2} raised of {:.2} goal, {:.0}%  |  {} backers  |  {} days left  |  by {}\n",
            c.title,
            c.id,
            c.raised,
            c.goal,
            c.progress(),
            c.backers,
            c.days_left,
            c.creator
        ));
    }
    out
}
