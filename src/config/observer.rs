//! Visibility observer options
//!
//! Options handed to a [`VisibilityWatcher`](crate::visibility::VisibilityWatcher)
//! when a target is bound. Callers usually supply [`ObserverOverrides`]
//! which are merged over the defaults.

use crate::error::{Error, Result};
use crate::visibility::TargetId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Regex for a single margin component: `10px`, `-5.5px`, `25%`
static MARGIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+(?:\.\d+)?)(px|%)$").unwrap());

// ============================================================================
// Root Margin
// ============================================================================

/// One side of a root margin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginValue {
    /// Absolute offset in pixels
    Px(f64),
    /// Offset relative to the root boundary's size
    Percent(f64),
}

impl Default for MarginValue {
    fn default() -> Self {
        Self::Px(0.0)
    }
}

impl fmt::Display for MarginValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Px(v) => write!(f, "{v}px"),
            Self::Percent(v) => write!(f, "{v}%"),
        }
    }
}

impl FromStr for MarginValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = MARGIN_REGEX.captures(s).ok_or_else(|| {
            Error::invalid_value(
                "root_margin",
                format!("'{s}' must be a length in px or a percentage"),
            )
        })?;

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| Error::invalid_value("root_margin", format!("'{s}' is not a number")))?;

        Ok(match &caps[2] {
            "%" => Self::Percent(value),
            _ => Self::Px(value),
        })
    }
}

/// Margin grown (positive) or shrunk (negative) around the root boundary
/// before intersections are tested
///
/// Parsed from CSS margin shorthand with one to four components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootMargin {
    pub top: MarginValue,
    pub right: MarginValue,
    pub bottom: MarginValue,
    pub left: MarginValue,
}

impl RootMargin {
    /// The same margin on every side
    pub fn uniform(value: MarginValue) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Check if every side is a zero offset
    pub fn is_zero(&self) -> bool {
        [self.top, self.right, self.bottom, self.left]
            .iter()
            .all(|v| matches!(v, MarginValue::Px(x) | MarginValue::Percent(x) if *x == 0.0))
    }
}

impl FromStr for RootMargin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<MarginValue>>>()?;

        match parts.as_slice() {
            [all] => Ok(Self::uniform(*all)),
            [vertical, horizontal] => Ok(Self {
                top: *vertical,
                right: *horizontal,
                bottom: *vertical,
                left: *horizontal,
            }),
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
            _ => Err(Error::invalid_value(
                "root_margin",
                format!("expected 1 to 4 components, got {}", parts.len()),
            )),
        }
    }
}

impl TryFrom<String> for RootMargin {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RootMargin> for String {
    fn from(margin: RootMargin) -> Self {
        margin.to_string()
    }
}

impl fmt::Display for RootMargin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.top, self.right, self.bottom, self.left
        )
    }
}

// ============================================================================
// Observer Options
// ============================================================================

/// Effective options for observing a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverOptions {
    /// Element used as the viewport; `None` is the top-level viewport
    #[serde(default)]
    pub root: Option<TargetId>,

    /// Fraction of the target that must be visible, in `[0, 1]`
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Margin applied to the root before testing
    #[serde(default)]
    pub root_margin: RootMargin,
}

fn default_threshold() -> f64 {
    1.0
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            root: None,
            threshold: default_threshold(),
            root_margin: RootMargin::default(),
        }
    }
}

impl ObserverOptions {
    /// Merge caller overrides over the defaults
    pub fn from_overrides(overrides: &ObserverOverrides) -> Result<Self> {
        Self::default().merged(overrides)
    }

    /// Apply overrides on top of these options; fields left unset keep
    /// their current value
    pub fn merged(&self, overrides: &ObserverOverrides) -> Result<Self> {
        let merged = Self {
            root: overrides.root.clone().or_else(|| self.root.clone()),
            threshold: overrides.threshold.unwrap_or(self.threshold),
            root_margin: overrides.root_margin.unwrap_or(self.root_margin),
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Check the options are usable
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::invalid_value(
                "threshold",
                format!("{} is outside [0, 1]", self.threshold),
            ));
        }
        Ok(())
    }

    /// Whether an intersection ratio counts as visible under these options
    pub fn is_visible(&self, ratio: f64) -> bool {
        if self.threshold == 0.0 {
            ratio > 0.0
        } else {
            ratio >= self.threshold
        }
    }
}

/// Partial observer options supplied by a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<TargetId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_margin: Option<RootMargin>,
}
