use serde::{Deserialize, Serialize};

use crate::config::Priority;

/// Placeholder shown while a unit's content is on its way
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Skeleton {
    Card { height: String },
    Text { lines: u32 },
    Image {
        #[serde(rename = "aspectRatio")]
        aspect_ratio: String,
    },
    /// Generic shimmering block
    Section { height: String },
}

impl Skeleton {
    /// Default placeholder for a tier. Critical content is expected to be
    /// present immediately and gets none.
    pub fn for_priority(priority: Priority, min_height: &str) -> Option<Skeleton> {
        match priority {
            Priority::Critical => None,
            _ => Some(Skeleton::Section {
                height: min_height.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Skeleton::Card { .. } => "card",
            Skeleton::Text { .. } => "text",
            Skeleton::Image { .. } => "image",
            Skeleton::Section { .. } => "section",
        }
    }
}
