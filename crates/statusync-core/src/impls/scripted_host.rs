//! ScriptedHost - 開発用・テスト用の HostBridge
//!
//! 事前に並べた応答を `check_status()` ごとに 1 つずつ返す。
//! 台本が尽きたら `exhausted` の応答を返し続ける。
//!
//! # 使用例
//! ```ignore
//! let host = ScriptedHost::new()
//!     .respond(HostStatus::pending().with_message("starting"))
//!     .respond(HostStatus::ready("/app"));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::HostStatus;
use crate::error::BridgeError;
use crate::ports::HostBridge;

pub type StatusReply = Result<HostStatus, BridgeError>;

struct ScriptState {
    responses: VecDeque<StatusReply>,
    exhausted: StatusReply,
    restart: Result<(), BridgeError>,
    /// `restart()` never resolves.
    restart_hangs: bool,
    /// Replaces `responses` after a successful restart.
    after_restart: Option<VecDeque<StatusReply>>,
    version: Result<String, BridgeError>,
}

pub struct ScriptedHost {
    state: Mutex<ScriptState>,
    available: AtomicBool,
    query_delay: Duration,
    status_calls: AtomicUsize,
    restart_calls: AtomicUsize,
    quit_calls: AtomicUsize,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                responses: VecDeque::new(),
                exhausted: Ok(HostStatus::pending()),
                restart: Ok(()),
                restart_hangs: false,
                after_restart: None,
                version: Ok(env!("CARGO_PKG_VERSION").to_string()),
            }),
            available: AtomicBool::new(true),
            query_delay: Duration::ZERO,
            status_calls: AtomicUsize::new(0),
            restart_calls: AtomicUsize::new(0),
            quit_calls: AtomicUsize::new(0),
        }
    }

    /// `pending` 回「起動中」を返したあと `target` へのリダイレクトを返す。
    pub fn ready_after(pending: usize, target: impl Into<String>) -> Self {
        let mut host = Self::new();
        for _ in 0..pending {
            host = host.respond(HostStatus::pending());
        }
        host.respond(HostStatus::ready(target))
    }

    pub fn respond(self, status: HostStatus) -> Self {
        self.lock().responses.push_back(Ok(status));
        self
    }

    pub fn respond_err(self, err: BridgeError) -> Self {
        self.lock().responses.push_back(Err(err));
        self
    }

    pub fn when_exhausted(self, reply: StatusReply) -> Self {
        self.lock().exhausted = reply;
        self
    }

    pub fn restart_fails_with(self, err: BridgeError) -> Self {
        self.lock().restart = Err(err);
        self
    }

    pub fn restart_hangs(self) -> Self {
        self.lock().restart_hangs = true;
        self
    }

    pub fn after_restart(self, replies: Vec<StatusReply>) -> Self {
        self.lock().after_restart = Some(replies.into());
        self
    }

    pub fn version(self, version: Result<String, BridgeError>) -> Self {
        self.lock().version = version;
        self
    }

    pub fn unavailable(self) -> Self {
        self.set_available(false);
        self
    }

    /// Every status query takes this long before answering.
    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn restart_calls(&self) -> usize {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn quit_calls(&self) -> usize {
        self.quit_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostBridge for ScriptedHost {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn check_status(&self) -> Result<HostStatus, BridgeError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        let mut state = self.lock();
        match state.responses.pop_front() {
            Some(reply) => reply,
            None => state.exhausted.clone(),
        }
    }

    async fn restart(&self) -> Result<(), BridgeError> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        let hangs = self.lock().restart_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        let mut state = self.lock();
        state.restart.clone()?;
        if let Some(replies) = state.after_restart.take() {
            state.responses = replies;
        }
        Ok(())
    }

    async fn get_version(&self) -> Result<String, BridgeError> {
        self.lock().version.clone()
    }

    async fn quit(&self) -> Result<(), BridgeError> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order_then_repeats_fallback() {
        let host = ScriptedHost::ready_after(2, "/app");

        assert_eq!(host.check_status().await.unwrap(), HostStatus::pending());
        assert_eq!(host.check_status().await.unwrap(), HostStatus::pending());
        assert_eq!(host.check_status().await.unwrap(), HostStatus::ready("/app"));
        assert_eq!(host.check_status().await.unwrap(), HostStatus::pending());
        assert_eq!(host.status_calls(), 4);
    }

    #[tokio::test]
    async fn successful_restart_swaps_in_the_next_script() {
        let host = ScriptedHost::new()
            .respond(HostStatus::failed("crashed"))
            .after_restart(vec![Ok(HostStatus::ready("/app"))]);

        assert_eq!(host.check_status().await.unwrap(), HostStatus::failed("crashed"));
        host.restart().await.unwrap();
        assert_eq!(host.check_status().await.unwrap(), HostStatus::ready("/app"));
        assert_eq!(host.restart_calls(), 1);
    }

    #[tokio::test]
    async fn failing_restart_keeps_the_old_script() {
        let host = ScriptedHost::new()
            .restart_fails_with(BridgeError::Application("no binary".into()))
            .after_restart(vec![Ok(HostStatus::ready("/app"))]);

        let err = host.restart().await.unwrap_err();
        assert_eq!(err, BridgeError::Application("no binary".into()));
        assert_eq!(host.check_status().await.unwrap(), HostStatus::pending());
    }
}
