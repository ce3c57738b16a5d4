use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProgressiveError;
use crate::margin::RootMargin;

/// Loading priority of a unit. Declared from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Rendered immediately on mount, no gate, no skeleton
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Deferred,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Deferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Deferred => "deferred",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing policy of one priority tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPolicy {
    /// Wait between becoming visible and starting to render
    pub delay_ms: u64,
    /// Default lookahead of the tier's visibility gate
    pub root_margin: RootMargin,
}

impl TierPolicy {
    pub fn new(delay_ms: u64, root_margin: RootMargin) -> Self {
        Self {
            delay_ms,
            root_margin,
        }
    }

    /// Built-in policy: the more urgent the tier, the shorter the delay and
    /// the smaller the lookahead
    pub fn builtin(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self::new(0, RootMargin::px(0.0)),
            Priority::High => Self::new(100, RootMargin::px(200.0)),
            Priority::Medium => Self::new(300, RootMargin::px(500.0)),
            Priority::Low => Self::new(800, RootMargin::px(800.0)),
            Priority::Deferred => Self::new(2000, RootMargin::px(1000.0)),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Per-tier policy; missing tiers use [`TierPolicy::builtin`]
    pub tiers: BTreeMap<Priority, TierPolicy>,
    /// Space reserved by a unit until its content is loaded (CSS length)
    pub default_min_height: String,
    /// Visible fraction that opens a unit's gate
    pub threshold: f64,
    /// Render bare reservations for units that are neither visible nor rendering
    pub virtualization: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tiers: Priority::ALL
                .iter()
                .map(|&priority| (priority, TierPolicy::builtin(priority)))
                .collect(),
            default_min_height: "100px".to_string(),
            threshold: 0.0,
            virtualization: false,
        }
    }
}

impl SchedulerConfig {
    /// Parse a JSON document; omitted fields keep their defaults
    pub fn from_json(raw: &str) -> Result<Self, ProgressiveError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn policy(&self, priority: Priority) -> TierPolicy {
        self.tiers
            .get(&priority)
            .cloned()
            .unwrap_or_else(|| TierPolicy::builtin(priority))
    }

    pub fn with_tier(mut self, priority: Priority, policy: TierPolicy) -> Self {
        self.tiers.insert(priority, policy);
        self
    }

    pub fn with_virtualization(mut self, enabled: bool) -> Self {
        self.virtualization = enabled;
        self
    }
}
