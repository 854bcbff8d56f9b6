//! Host status: what `check_status()` returns and how it is classified.

use serde::{Deserialize, Serialize};

/// Raw response of a host status check.
///
/// Wire shape: `{"ready": bool, "redirectTarget"?: string, "message"?: string, "error"?: string}`.
/// Any combination of fields can arrive; `classify()` decides what it means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(redirect_target: impl Into<String>) -> Self {
        Self {
            ready: true,
            redirect_target: Some(redirect_target.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Precedence:
    /// 1. `ready` with a non-empty redirect target → `Redirect` (wins over `error`)
    /// 2. non-empty `error` → `Failed`
    /// 3. otherwise → `Pending`
    pub fn classify(self) -> HostVerdict {
        let message = non_empty(self.message);
        if self.ready
            && let Some(target) = non_empty(self.redirect_target)
        {
            return HostVerdict::Redirect { target, message };
        }
        if let Some(error) = non_empty(self.error) {
            return HostVerdict::Failed { error };
        }
        HostVerdict::Pending { message }
    }
}

/// Classified host response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostVerdict {
    Redirect {
        target: String,
        message: Option<String>,
    },
    Failed {
        error: String,
    },
    Pending {
        message: Option<String>,
    },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
