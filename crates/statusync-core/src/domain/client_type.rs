use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a downstream client category (e.g. `claude`, `codex`, `gemini`).
///
/// The registry tracks in-flight activity per `ClientType`; identifiers it has
/// never seen simply read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientType(String);

impl ClientType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ClientType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientType {
    fn from(value: String) -> Self {
        Self(value)
    }
}
