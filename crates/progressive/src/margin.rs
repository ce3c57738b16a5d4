//! CSS-like root margins.
//!
//! A root margin grows (or shrinks, when negative) the viewport before
//! intersection is computed, so targets can trigger before they are on screen.
//! The syntax is the one intersection observers accept: one to four lengths in
//! `px` or `%`, with a bare `0` allowed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProgressiveError;
use crate::intersection::Rect;

/// A single margin component
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginLength {
    Px(f64),
    /// Percentage of the root's width (left/right) or height (top/bottom)
    Percent(f64),
}

impl MarginLength {
    pub const ZERO: MarginLength = MarginLength::Px(0.0);

    /// Resolve to pixels against the matching root dimension
    pub fn resolve(&self, reference: f64) -> f64 {
        match *self {
            MarginLength::Px(px) => px,
            MarginLength::Percent(percent) => reference * percent / 100.0,
        }
    }
}

impl Default for MarginLength {
    fn default() -> Self {
        MarginLength::ZERO
    }
}

impl fmt::Display for MarginLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginLength::Px(px) => write!(f, "{}px", px),
            MarginLength::Percent(percent) => write!(f, "{}%", percent),
        }
    }
}

impl FromStr for MarginLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "0" {
            return Ok(MarginLength::ZERO);
        }

        let (number, percent) = if let Some(number) = s.strip_suffix("px") {
            (number, false)
        } else if let Some(number) = s.strip_suffix('%') {
            (number, true)
        } else {
            return Err(format!("{:?} must be in px or %", s));
        };

        let value: f64 = number
            .parse()
            .map_err(|_| format!("{:?} is not a number", number))?;
        if !value.is_finite() {
            return Err(format!("{:?} is not finite", number));
        }

        Ok(if percent {
            MarginLength::Percent(value)
        } else {
            MarginLength::Px(value)
        })
    }
}

/// Margin around the intersection root, in CSS order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RootMargin {
    pub top: MarginLength,
    pub right: MarginLength,
    pub bottom: MarginLength,
    pub left: MarginLength,
}

impl RootMargin {
    /// Same length on every side
    pub fn uniform(length: MarginLength) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }

    pub fn px(px: f64) -> Self {
        Self::uniform(MarginLength::Px(px))
    }

    /// Vertical lookahead only, e.g. `500px 0px`
    pub fn vertical(vertical: MarginLength, horizontal: MarginLength) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    /// Apply the margin to the root rectangle
    pub fn expand(&self, root: Rect) -> Rect {
        let top = self.top.resolve(root.height);
        let bottom = self.bottom.resolve(root.height);
        let left = self.left.resolve(root.width);
        let right = self.right.resolve(root.width);

        Rect {
            x: root.x - left,
            y: root.y - top,
            width: (root.width + left + right).max(0.0),
            height: (root.height + top + bottom).max(0.0),
        }
    }
}

impl FromStr for RootMargin {
    type Err = ProgressiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ProgressiveError::InvalidMargin {
            input: s.to_string(),
            reason,
        };

        let parts = s
            .split_whitespace()
            .map(MarginLength::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        match parts.as_slice() {
            [all] => Ok(Self::uniform(*all)),
            [vertical, horizontal] => Ok(Self::vertical(*vertical, *horizontal)),
            [top, horizontal, bottom] => Ok(Self {
                top: *top,
                right: *horizontal,
                bottom: *bottom,
                left: *horizontal,
            }),
            [top, right, bottom, left] => Ok(Self {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            [] => Err(invalid("expected at least one length".into())),
            _ => Err(invalid(format!("expected at most 4 lengths, got {}", parts.len()))),
        }
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.top == self.bottom && self.left == self.right {
            if self.top == self.left {
                write!(f, "{}", self.top)
            } else {
                write!(f, "{} {}", self.top, self.right)
            }
        } else {
            write!(f, "{} {} {} {}", self.top, self.right, self.bottom, self.left)
        }
    }
}

impl Serialize for RootMargin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RootMargin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
