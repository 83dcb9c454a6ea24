use serde::{Deserialize, Serialize};
use std::fmt;

pub const OPEN_COLOR: &str = "#3b82f6";
pub const CLOSED_COLOR: &str = "#22c55e";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Open,
    Closed,
}

impl StatusCategory {
    pub fn default_color(&self) -> &'static str {
        match self {
            StatusCategory::Open => OPEN_COLOR,
            StatusCategory::Closed => CLOSED_COLOR,
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCategory::Open => f.write_str("open"),
            StatusCategory::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub name: String,
    pub category: StatusCategory,
    pub color_hint: String,
}

impl Status {
    pub fn new(id: &str, name: &str, category: StatusCategory, color_hint: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            color_hint: color_hint.to_string(),
        }
    }

    /// Status assumed for tasks that arrive without one.
    pub fn open_sentinel() -> Self {
        Status::new("open", "Open", StatusCategory::Open, OPEN_COLOR)
    }

    fn matches(&self, key: &str) -> bool {
        (!self.id.is_empty() && self.id == key) || self.name.eq_ignore_ascii_case(key)
    }
}

/// Statuses used when Zoho has no catalog for a project.
pub fn default_seed() -> Vec<Status> {
    use StatusCategory::{Closed, Open};
    vec![
        Status::new("open", "Open", Open, OPEN_COLOR),
        Status::new("in-progress", "In Progress", Open, "#f59e0b"),
        Status::new("in-review", "In Review", Open, "#8b5cf6"),
        Status::new("to-be-tested", "To be Tested", Open, "#06b6d4"),
        Status::new("on-hold", "On Hold", Open, "#6b7280"),
        Status::new("delayed", "Delayed", Open, "#ef4444"),
        Status::new("closed", "Closed", Closed, CLOSED_COLOR),
        Status::new("cancelled", "Cancelled", Closed, "#9ca3af"),
    ]
}

/// The set of statuses a project's tasks may be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCatalog {
    statuses: Vec<Status>,
    seeded: bool,
}

impl StatusCatalog {
    pub fn seeded(seed: &[Status]) -> Self {
        Self {
            statuses: seed.to_vec(),
            seeded: true,
        }
    }

    /// Upstream statuses, or the seed when upstream had none.
    pub fn from_upstream(statuses: Vec<Status>, seed: &[Status]) -> Self {
        if statuses.is_empty() {
            Self::seeded(seed)
        } else {
            Self {
                statuses,
                seeded: false,
            }
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    /// Look a status up by exact id, then by case-insensitive name.
    pub fn resolve(&self, key: &str) -> Option<&Status> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        self.statuses
            .iter()
            .find(|s| !s.id.is_empty() && s.id == key)
            .or_else(|| self.statuses.iter().find(|s| s.name.eq_ignore_ascii_case(key)))
    }

    /// Map a status observed on a task onto its catalog entry. Unknown
    /// statuses join the catalog only when they carry an upstream id.
    pub fn absorb(&mut self, observed: &Status) -> Status {
        if let Some(known) = self
            .statuses
            .iter()
            .find(|s| s.matches(&observed.id) || s.matches(&observed.name))
        {
            return known.clone();
        }
        if !observed.id.is_empty() && *observed != Status::open_sentinel() {
            self.statuses.push(observed.clone());
        }
        observed.clone()
    }
}
