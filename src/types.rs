//! Common types used throughout infinite-pager
//!
//! This module contains the query identity, the page shape returned by
//! fetchers, and small enums shared across modules.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Page index used to request the next page
pub type Cursor = u32;

// ============================================================================
// Query Identity
// ============================================================================

/// Identity of one logical paginated list
///
/// Two keys are the same list only if the discriminator, every numeric
/// variable (in order) and every string variable (in order) match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QueryKey {
    /// Stable discriminator for the list (e.g. "products")
    pub constant: String,
    /// Ordered numeric parameters
    #[serde(default)]
    pub variables: Vec<i64>,
    /// Ordered string parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_variables: Option<Vec<String>>,
}

impl QueryKey {
    /// Create a key with only a discriminator
    pub fn new(constant: impl Into<String>) -> Self {
        Self {
            constant: constant.into(),
            ..Default::default()
        }
    }

    /// Set the numeric parameters
    #[must_use]
    pub fn with_variables(mut self, variables: impl IntoIterator<Item = i64>) -> Self {
        self.variables = variables.into_iter().collect();
        self
    }

    /// Set the string parameters
    #[must_use]
    pub fn with_strings<S: Into<String>>(mut self, strings: impl IntoIterator<Item = S>) -> Self {
        self.string_variables = Some(strings.into_iter().map(Into::into).collect());
        self
    }

    /// First string parameter, used as the free-text `content` filter
    pub fn content(&self) -> Option<&str> {
        self.string_variables
            .as_ref()
            .and_then(|s| s.first())
            .map(String::as_str)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constant)?;
        for v in &self.variables {
            write!(f, "/{v}")?;
        }
        if let Some(strings) = &self.string_variables {
            write!(f, "[{}]", strings.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Pages
// ============================================================================

/// One page returned by a fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Page index as reported by the source
    pub number: Cursor,
    /// Items on this page, in order
    pub items: Vec<T>,
    /// No pages exist after this one
    pub is_last: bool,
}

impl<T> PageResult<T> {
    /// Create a page
    pub fn new(number: Cursor, items: Vec<T>, is_last: bool) -> Self {
        Self {
            number,
            items,
            is_last,
        }
    }

    /// Cursor of the page after this one, or `None` when this is the last
    /// or no further cursor exists
    pub fn next_cursor(&self) -> Option<Cursor> {
        if self.is_last {
            None
        } else {
            self.number.checked_add(1)
        }
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
