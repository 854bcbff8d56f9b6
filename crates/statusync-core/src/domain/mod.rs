//! Domain model: ids, activity counts, host status and the readiness machine.
//!
//! ここは I/O を持たない。時間は呼び出し側が `now` として渡す。

pub mod activity;
pub mod client_type;
pub mod host_status;
pub mod ids;
pub mod nav;
pub mod readiness;

pub use activity::{
    ActivityCounts, ActivityEvent, ActivityKind, ActivitySnapshot, EndOutcome, SourceSignal,
};
pub use client_type::ClientType;
pub use host_status::{HostStatus, HostVerdict};
pub use ids::{AttemptId, Id, IdMarker, SessionId};
pub use nav::{ClientBadge, NavFocus, RequestsBadge, ambient_highlight};
pub use readiness::{
    ElapsedBudget, FailureKind, RESTARTING_MESSAGE, ReadinessMachine, ReadinessPhase,
    ReadinessStatus, STARTING_MESSAGE, SUCCESS_MESSAGE, TIMEOUT_MESSAGE, TickGate, Transition,
};
