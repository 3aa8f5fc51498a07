//! CUDA architecture lists (`TORCH_CUDA_ARCH_LIST` syntax).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::features::ArchGeneration;

/// A single entry looks like `9.0`, `9.0a` or `8.6+PTX`.
static ARCH_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+[a-z]?(\+PTX)?$").unwrap());

/// A normalized, non-empty architecture list.
///
/// Entries may be separated by `;`, `,` or whitespace on input. The
/// normalized form joins them with `;` so that equal lists always render
/// to the same descriptor string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArchList {
    descriptor: String,
}

impl ArchList {
    /// The normalized descriptor, e.g. `8.0;9.0`.
    pub fn as_str(&self) -> &str {
        &self.descriptor
    }
}

impl std::str::FromStr for ArchList {
    type Err = ArchListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries: Vec<&str> = s
            .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
            .filter(|e| !e.is_empty())
            .collect();

        if entries.is_empty() {
            return Err(ArchListError::Empty);
        }

        for entry in &entries {
            if !ARCH_ENTRY.is_match(entry) {
                return Err(ArchListError::InvalidEntry(entry.to_string()));
            }
        }

        Ok(ArchList {
            descriptor: entries.join(";"),
        })
    }
}

impl From<ArchGeneration> for ArchList {
    fn from(generation: ArchGeneration) -> Self {
        ArchList {
            descriptor: generation.default_arch().to_string(),
        }
    }
}

impl TryFrom<String> for ArchList {
    type Error = ArchListError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArchList> for String {
    fn from(list: ArchList) -> Self {
        list.descriptor
    }
}

impl fmt::Display for ArchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

/// Error returned when parsing an invalid architecture list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchListError {
    Empty,
    InvalidEntry(String),
}

impl fmt::Display for ArchListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchListError::Empty => write!(f, "architecture list is empty"),
            ArchListError::InvalidEntry(entry) => write!(
                f,
                "invalid architecture '{}', expected entries like 8.0, 9.0a or 8.6+PTX",
                entry
            ),
        }
    }
}

impl std::error::Error for ArchListError {}
