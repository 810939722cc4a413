use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Dashboard widgets shown when a user has not saved a selection yet.
pub const DEFAULT_WIDGETS: &[&str] = &[
    "upcoming_reservations",
    "pending_approvals",
    "revenue_summary",
    "recent_payments",
    "costs_summary",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPreferences {
    pub user_id: UserId,
    pub widgets: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WidgetPreferences {
    pub fn defaults_for(user_id: UserId) -> Self {
        Self {
            user_id,
            widgets: DEFAULT_WIDGETS.iter().map(|widget| widget.to_string()).collect(),
            updated_at: None,
        }
    }
}

/// Trims, drops empties and keeps the first occurrence of each widget key.
pub fn sanitize_widgets(widgets: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    widgets
        .into_iter()
        .map(|widget| widget.trim().to_string())
        .filter(|widget| !widget.is_empty() && seen.insert(widget.clone()))
        .collect()
}
