// ABOUTME: Shared enumerations used across Docforge packages
// ABOUTME: Section priority is the contract every pipeline stage orders and filters by

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Priority of a template section.
///
/// Declaration order doubles as tier order: critical sections sort before
/// important ones, which sort before optional ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must be filled
    Critical,
    /// Should be filled
    Important,
    /// Nice to have
    Optional,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::Important => "important",
            Priority::Optional => "optional",
        }
    }

    /// Whether gaps of this priority get questions without an explicit opt-in
    pub fn asked_by_default(&self) -> bool {
        match self {
            Priority::Critical | Priority::Important => true,
            Priority::Optional => false,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid priority: '{0}'. Expected 'critical', 'important' or 'optional'")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "important" => Ok(Priority::Important),
            "optional" => Ok(Priority::Optional),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}
