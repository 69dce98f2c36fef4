use crate::location::{Location, PathEvent};
use serde::Serialize;
use std::fmt;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Memory error")]
    MemoryError,
    #[serde(rename = "Logic error")]
    LogicError,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MemoryError => "Memory error",
            Category::LogicError => "Logic error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding extracted from a sanitizer report.
///
/// Records are produced by the parser strategies with an empty `issue_hash`;
/// the hash is attached once per report instance by [`Vulnerability::with_issue_hash`]
/// and the record is not modified afterwards.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub category: Category,
    /// Sanitizer bug type, e.g. `heap-buffer-overflow` or `memory-leak`.
    #[serde(rename = "type")]
    pub bug_type: String,
    pub description: String,
    pub location: Location,
    pub path: Vec<PathEvent>,
    pub issue_hash: String,
}

impl Vulnerability {
    pub fn new(
        category: Category,
        bug_type: impl Into<String>,
        description: String,
        location: Location,
        path: Vec<PathEvent>,
    ) -> Self {
        Self {
            category,
            bug_type: bug_type.into(),
            description,
            location,
            path,
            issue_hash: String::new(),
        }
    }

    pub fn with_issue_hash(self, issue_hash: impl Into<String>) -> Self {
        Self {
            issue_hash: issue_hash.into(),
            ..self
        }
    }
}
