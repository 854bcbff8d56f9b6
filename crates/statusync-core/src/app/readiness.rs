//! ReadinessController - 起動ハンドシェイクの駆動ループ
//!
//! # フロー
//! 1. 一定間隔で tick（前の tick の問い合わせが終わるまで次は発行しない）
//! 2. tick ごとに予算チェック → bridge があれば status を 1 回問い合わせ
//! 3. Ready: タイマーを止め、成功メッセージを出し、grace delay 後に handoff（1 回だけ）
//! 4. Failed: operator の retry / quit を待つ。retry は restart 成功後にだけポーリング再開
//!
//! 状態判定そのものは `domain::readiness::ReadinessMachine` が持ち、ここは時間と I/O だけ扱う。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::version_probe::probe_version;
use crate::config::LauncherConfig;
use crate::domain::{
    HostStatus, ReadinessMachine, ReadinessPhase, ReadinessStatus, TickGate, Transition,
};
use crate::error::{BridgeError, StatusyncError};
use crate::ports::{Clock, HostBridge, SystemClock};

const COMMAND_BUFFER: usize = 8;

/// Extra slack so a query cut off by the budget lands strictly past `max_wait`.
const BUDGET_EPSILON: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Retry,
    Quit,
}

/// How the launch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The handoff ran with this target.
    HandedOff { target: String },
    /// The operator chose to quit.
    Quit,
    /// Every handle was dropped while the launch had failed; nobody is left to retry.
    Abandoned { status: ReadinessStatus },
}

type HandoffFn = Box<dyn FnOnce(&str) + Send>;

enum PollExit {
    Ready(String),
    Failed,
    Quit,
}

enum TickResult {
    Continue,
    Ready(String),
    Failed,
}

/// UI-side handle: observe status/version, send retry/quit.
#[derive(Clone)]
pub struct ReadinessHandle {
    commands: mpsc::Sender<OperatorCommand>,
    status: watch::Receiver<ReadinessStatus>,
    version: watch::Receiver<Option<String>>,
}

impl ReadinessHandle {
    pub fn status(&self) -> ReadinessStatus {
        self.status.borrow().clone()
    }

    pub fn phase(&self) -> ReadinessPhase {
        self.status.borrow().phase()
    }

    pub fn version(&self) -> Option<String> {
        self.version.borrow().clone()
    }

    /// Wait for the next status publication.
    pub async fn changed(&mut self) -> Result<ReadinessStatus, StatusyncError> {
        self.status
            .changed()
            .await
            .map_err(|_| StatusyncError::ControllerGone)?;
        Ok(self.status.borrow_and_update().clone())
    }

    pub fn watch_status(&self) -> watch::Receiver<ReadinessStatus> {
        self.status.clone()
    }

    /// Only honoured while the launch is `Failed`.
    pub async fn retry(&self) -> Result<(), StatusyncError> {
        self.send(OperatorCommand::Retry).await
    }

    pub async fn quit(&self) -> Result<(), StatusyncError> {
        self.send(OperatorCommand::Quit).await
    }

    async fn send(&self, command: OperatorCommand) -> Result<(), StatusyncError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| StatusyncError::ControllerGone)
    }
}

pub struct ReadinessController {
    bridge: Arc<dyn HostBridge>,
    clock: Arc<dyn Clock>,
    config: LauncherConfig,
    machine: ReadinessMachine,
    status_tx: watch::Sender<ReadinessStatus>,
    version_tx: Option<watch::Sender<Option<String>>>,
    commands: mpsc::Receiver<OperatorCommand>,
    commands_open: bool,
    on_handoff: Option<HandoffFn>,
}

impl ReadinessController {
    pub fn new(bridge: Arc<dyn HostBridge>, config: LauncherConfig) -> (Self, ReadinessHandle) {
        Self::with_clock(bridge, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        bridge: Arc<dyn HostBridge>,
        config: LauncherConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, ReadinessHandle) {
        let machine = ReadinessMachine::new(clock.now(), config.max_wait());
        let (status_tx, status_rx) = watch::channel(machine.status().clone());
        let (version_tx, version_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let controller = Self {
            bridge,
            clock,
            config,
            machine,
            status_tx,
            version_tx: Some(version_tx),
            commands: command_rx,
            commands_open: true,
            on_handoff: None,
        };
        let handle = ReadinessHandle {
            commands: command_tx,
            status: status_rx,
            version: version_rx,
        };
        (controller, handle)
    }

    /// Called exactly once, with the redirect target, after the grace delay.
    pub fn on_handoff<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.on_handoff = Some(Box::new(f));
        self
    }

    /// Drive the handshake until handoff, quit, or abandonment.
    pub async fn run(mut self) -> LaunchOutcome {
        let probe = self.spawn_version_probe();
        tracing::info!(
            attempt = %self.machine.attempt(),
            interval_ms = self.config.check_interval_ms,
            max_wait_ms = self.config.max_wait_ms,
            "waiting for host readiness"
        );

        let outcome = loop {
            match self.machine.phase() {
                ReadinessPhase::Waiting => match self.poll().await {
                    PollExit::Ready(target) => break self.hand_off(target).await,
                    PollExit::Failed => continue,
                    PollExit::Quit => break self.quit().await,
                },
                ReadinessPhase::Failed => {
                    let command = if self.commands_open {
                        self.commands.recv().await
                    } else {
                        None
                    };
                    match command {
                        Some(OperatorCommand::Retry) => {
                            if let Some(outcome) = self.retry().await {
                                break outcome;
                            }
                        }
                        Some(OperatorCommand::Quit) => break self.quit().await,
                        None => {
                            tracing::warn!("launch failed and no operator handle is left");
                            break LaunchOutcome::Abandoned {
                                status: self.machine.status().clone(),
                            };
                        }
                    }
                }
                ReadinessPhase::Ready => {
                    let target = self
                        .machine
                        .status()
                        .redirect_target()
                        .unwrap_or_default()
                        .to_string();
                    break self.hand_off(target).await;
                }
            }
        };

        if let Some(probe) = probe {
            probe.abort();
        }
        outcome
    }

    fn spawn_version_probe(&mut self) -> Option<JoinHandle<()>> {
        let version_tx = self.version_tx.take()?;
        let bridge = Arc::clone(&self.bridge);
        let config = self.config.clone();
        Some(tokio::spawn(async move {
            let version = probe_version(bridge.as_ref(), &config).await;
            version_tx.send_replace(version);
        }))
    }

    /// Tick until the phase leaves `Waiting`. The interval is dropped on return,
    /// so no tick can follow a `Ready`/`Failed` transition.
    async fn poll(&mut self) -> PollExit {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(OperatorCommand::Quit) => return PollExit::Quit,
                    Some(OperatorCommand::Retry) => {
                        tracing::debug!("retry ignored while waiting");
                    }
                    None => self.commands_open = false,
                },
                _ = ticker.tick() => match self.tick().await {
                    TickResult::Continue => {}
                    TickResult::Ready(target) => return PollExit::Ready(target),
                    TickResult::Failed => return PollExit::Failed,
                },
            }
        }
    }

    async fn tick(&mut self) -> TickResult {
        match self.machine.begin_tick(self.clock.now()) {
            TickGate::Query => self.publish(),
            TickGate::TimedOut => {
                self.publish();
                tracing::warn!(
                    attempt = %self.machine.attempt(),
                    max_wait_ms = self.config.max_wait_ms,
                    "host did not become ready in time"
                );
                return TickResult::Failed;
            }
            TickGate::Idle => return TickResult::Continue,
        }

        if !self.bridge.is_available() {
            tracing::debug!("host bridge not available yet");
            return TickResult::Continue;
        }

        let budget_left = self.machine.budget().remaining(self.clock.now()) + BUDGET_EPSILON;
        let limit = self.config.query_timeout().min(budget_left);
        let status = match tokio::time::timeout(limit, self.bridge.check_status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(BridgeError::Application(error))) => HostStatus::failed(error),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "status query failed; will retry");
                return TickResult::Continue;
            }
            Err(_) => {
                if self.machine.expire_if_over_budget(self.clock.now()) {
                    self.publish();
                    tracing::warn!(
                        attempt = %self.machine.attempt(),
                        "host did not become ready in time"
                    );
                    return TickResult::Failed;
                }
                tracing::debug!(timeout_ms = limit.as_millis() as u64, "status query timed out");
                return TickResult::Continue;
            }
        };

        let transition = self.machine.apply_verdict(status.classify(), self.clock.now());
        self.publish();
        match transition {
            Transition::Stay | Transition::Ignored => TickResult::Continue,
            Transition::Ready { target } => {
                tracing::info!(attempt = %self.machine.attempt(), target = %target, "host is ready");
                TickResult::Ready(target)
            }
            Transition::Failed => {
                tracing::warn!(
                    attempt = %self.machine.attempt(),
                    error = self.machine.status().error_detail().unwrap_or_default(),
                    "launch failed"
                );
                TickResult::Failed
            }
        }
    }

    /// Grace delay, then the handoff. Commands are not read during the delay:
    /// a quit sent in that window is never acted on, the handoff still fires.
    async fn hand_off(&mut self, target: String) -> LaunchOutcome {
        tokio::time::sleep(self.config.redirect_delay()).await;
        if self.machine.take_handoff().is_some()
            && let Some(on_handoff) = self.on_handoff.take()
        {
            tracing::info!(target = %target, "handing off to the main shell");
            on_handoff(&target);
        }
        LaunchOutcome::HandedOff { target }
    }

    /// Operator retry from `Failed`. The restart is bounded by
    /// `restart_timeout` and commands stay live while it runs: a quit ends the
    /// launch without waiting for the restart. Returns the outcome if it did.
    async fn retry(&mut self) -> Option<LaunchOutcome> {
        let Some(attempt) = self.machine.begin_retry(self.clock.now()) else {
            tracing::debug!("retry ignored: launch has not failed");
            return None;
        };
        self.publish();

        if !self.bridge.is_available() {
            tracing::info!(attempt = %attempt, "host bridge not available; polling without restart");
            return None;
        }

        tracing::info!(attempt = %attempt, "operator retry; restarting host");
        let bridge = Arc::clone(&self.bridge);
        let restart = tokio::time::timeout(self.config.restart_timeout(), bridge.restart());
        tokio::pin!(restart);

        let result = loop {
            tokio::select! {
                biased;
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(OperatorCommand::Quit) => return Some(self.quit().await),
                    Some(OperatorCommand::Retry) => {
                        tracing::debug!("retry ignored: restart already in progress");
                    }
                    None => self.commands_open = false,
                },
                result = &mut restart => break result,
            }
        };

        let detail = match result {
            Ok(Ok(())) => return None,
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no answer within {}ms", self.config.restart_timeout_ms),
        };
        self.machine.restart_failed(&detail);
        self.publish();
        tracing::warn!(attempt = %attempt, error = %detail, "host restart failed");
        None
    }

    async fn quit(&mut self) -> LaunchOutcome {
        tracing::info!("operator quit");
        if self.bridge.is_available()
            && let Err(err) = self.bridge.quit().await
        {
            tracing::warn!(error = %err, "host quit failed");
        }
        LaunchOutcome::Quit
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.machine.status().clone());
    }
}
