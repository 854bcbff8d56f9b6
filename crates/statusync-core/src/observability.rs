//! Status views for logs and the CLI.

use serde::Serialize;

use crate::domain::{ActivitySnapshot, ClientType, FailureKind, ReadinessPhase, ReadinessStatus};

/// Flat, serialisable view of the launch screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchView {
    pub phase: ReadinessPhase,
    pub message: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub redirect_target: Option<String>,
    pub version: Option<String>,
}

impl LaunchView {
    pub fn new(status: &ReadinessStatus, version: Option<&str>) -> Self {
        Self {
            phase: status.phase(),
            message: status.message().map(str::to_string),
            error: status.error_detail().map(str::to_string),
            failure: status.failure_kind(),
            redirect_target: status.redirect_target().map(str::to_string),
            version: version.map(str::to_string),
        }
    }

    /// Retry/quit controls are shown only after a failure.
    pub fn shows_controls(&self) -> bool {
        self.phase == ReadinessPhase::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub revision: u64,
    pub total: u64,
    pub busy_clients: Vec<ClientType>,
}

impl From<&ActivitySnapshot> for ActivitySummary {
    fn from(snapshot: &ActivitySnapshot) -> Self {
        Self {
            revision: snapshot.revision(),
            total: snapshot.total(),
            busy_clients: snapshot.counts_by_client().keys().cloned().collect(),
        }
    }
}
