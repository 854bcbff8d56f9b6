//! Readiness state machine for the startup handshake.
//!
//! 状態遷移:
//! - Waiting -> Waiting (tick, 予算内, ホストはまだ準備中)
//! - Waiting -> Ready   (ホストが redirect target を返した)
//! - Waiting -> Failed  (予算超過 or ホストが明示的なエラーを返した)
//! - Failed  -> Waiting (operator retry, restart 成功後にポーリング再開)
//! - Ready は終端。handoff は一度だけ取り出せる
//!
//! The machine is pure: callers pass `now` in and drive timers themselves
//! (see `app::readiness`).

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::{AttemptId, HostVerdict};

pub const STARTING_MESSAGE: &str = "Starting service...";
pub const RESTARTING_MESSAGE: &str = "Restarting service...";
pub const SUCCESS_MESSAGE: &str = "Startup complete, redirecting...";
pub const TIMEOUT_MESSAGE: &str =
    "Server startup timed out\n\nCheck the log files or retry the launch.";
const RESTART_FAILED_PREFIX: &str = "Failed to restart server: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPhase {
    Waiting,
    Ready,
    Failed,
}

/// Why the handshake ended up in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Timeout,
    /// The host reported an application error.
    Host,
    /// The operator-triggered restart itself failed.
    Restart,
}

/// Observable readiness status.
///
/// A redirect target exists only in `Ready` and an error only in `Failed`,
/// so the two can never be set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessStatus {
    Waiting {
        message: Option<String>,
    },
    Ready {
        message: String,
        redirect_target: String,
    },
    Failed {
        kind: FailureKind,
        error: String,
    },
}

impl ReadinessStatus {
    pub fn phase(&self) -> ReadinessPhase {
        match self {
            ReadinessStatus::Waiting { .. } => ReadinessPhase::Waiting,
            ReadinessStatus::Ready { .. } => ReadinessPhase::Ready,
            ReadinessStatus::Failed { .. } => ReadinessPhase::Failed,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ReadinessStatus::Waiting { message } => message.as_deref(),
            ReadinessStatus::Ready { message, .. } => Some(message),
            ReadinessStatus::Failed { .. } => None,
        }
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            ReadinessStatus::Ready {
                redirect_target, ..
            } => Some(redirect_target),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match self {
            ReadinessStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ReadinessStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Wait budget of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedBudget {
    started_at: Instant,
    max_wait: Duration,
}

impl ElapsedBudget {
    pub fn new(started_at: Instant, max_wait: Duration) -> Self {
        Self {
            started_at,
            max_wait,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Strictly greater: reaching `max_wait` exactly is still within budget.
    pub fn is_exceeded(&self, now: Instant) -> bool {
        self.elapsed(now) > self.max_wait
    }

    /// Time left before `max_wait` is reached.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.max_wait.saturating_sub(self.elapsed(now))
    }

    pub fn restart(&mut self, now: Instant) {
        self.started_at = now;
    }
}

/// What the driver should do after the budget check of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickGate {
    /// Within budget: issue one status query.
    Query,
    /// Budget exceeded; the machine is now `Failed`.
    TimedOut,
    /// Not waiting; nothing to do.
    Idle,
}

/// Effect of applying a host verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Ready { target: String },
    Failed,
    /// The machine was not waiting (or the response came back too late to matter).
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ReadinessMachine {
    status: ReadinessStatus,
    budget: ElapsedBudget,
    attempt: AttemptId,
    handed_off: bool,
}

impl ReadinessMachine {
    pub fn new(now: Instant, max_wait: Duration) -> Self {
        Self {
            status: ReadinessStatus::Waiting {
                message: Some(STARTING_MESSAGE.to_string()),
            },
            budget: ElapsedBudget::new(now, max_wait),
            attempt: AttemptId::generate(),
            handed_off: false,
        }
    }

    pub fn status(&self) -> &ReadinessStatus {
        &self.status
    }

    pub fn phase(&self) -> ReadinessPhase {
        self.status.phase()
    }

    pub fn budget(&self) -> &ElapsedBudget {
        &self.budget
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Budget check at the start of a tick. Also refreshes the elapsed-seconds text.
    pub fn begin_tick(&mut self, now: Instant) -> TickGate {
        if self.phase() != ReadinessPhase::Waiting {
            return TickGate::Idle;
        }
        if self.budget.is_exceeded(now) {
            self.fail(FailureKind::Timeout, TIMEOUT_MESSAGE.to_string());
            return TickGate::TimedOut;
        }

        let seconds = self.budget.elapsed(now).as_secs();
        if seconds > 0 {
            self.status = ReadinessStatus::Waiting {
                message: Some(format!("{STARTING_MESSAGE} ({seconds}s)")),
            };
        }
        TickGate::Query
    }

    /// Apply a classified host response received at `now`.
    ///
    /// A response arriving after the budget ran out does not count: the machine
    /// fails with the timeout message instead.
    pub fn apply_verdict(&mut self, verdict: HostVerdict, now: Instant) -> Transition {
        if self.phase() != ReadinessPhase::Waiting {
            return Transition::Ignored;
        }
        if self.budget.is_exceeded(now) {
            self.fail(FailureKind::Timeout, TIMEOUT_MESSAGE.to_string());
            return Transition::Failed;
        }

        match verdict {
            HostVerdict::Redirect { target, .. } => {
                self.status = ReadinessStatus::Ready {
                    message: SUCCESS_MESSAGE.to_string(),
                    redirect_target: target.clone(),
                };
                Transition::Ready { target }
            }
            HostVerdict::Failed { error } => {
                self.fail(FailureKind::Host, error);
                Transition::Failed
            }
            HostVerdict::Pending { message } => {
                if let Some(message) = message {
                    self.status = ReadinessStatus::Waiting {
                        message: Some(message),
                    };
                }
                Transition::Stay
            }
        }
    }

    /// Fail with the timeout message if the budget ran out while a query was
    /// outstanding. Returns `true` if the machine is now `Failed`.
    pub fn expire_if_over_budget(&mut self, now: Instant) -> bool {
        if self.phase() != ReadinessPhase::Waiting || !self.budget.is_exceeded(now) {
            return false;
        }
        self.fail(FailureKind::Timeout, TIMEOUT_MESSAGE.to_string());
        true
    }

    /// Operator retry. Only valid from `Failed`; returns the new attempt id.
    pub fn begin_retry(&mut self, now: Instant) -> Option<AttemptId> {
        if self.phase() != ReadinessPhase::Failed {
            return None;
        }
        self.budget.restart(now);
        self.attempt = AttemptId::generate();
        self.status = ReadinessStatus::Waiting {
            message: Some(RESTARTING_MESSAGE.to_string()),
        };
        Some(self.attempt)
    }

    /// The restart call behind a retry failed: back to `Failed`, no polling.
    pub fn restart_failed(&mut self, detail: &str) {
        self.fail(
            FailureKind::Restart,
            format!("{RESTART_FAILED_PREFIX}{detail}"),
        );
    }

    /// Takes the redirect target the first time it is called in `Ready`.
    pub fn take_handoff(&mut self) -> Option<String> {
        if self.handed_off {
            return None;
        }
        let target = self.status.redirect_target()?.to_string();
        self.handed_off = true;
        Some(target)
    }

    fn fail(&mut self, kind: FailureKind, error: String) {
        self.status = ReadinessStatus::Failed { kind, error };
    }
}
