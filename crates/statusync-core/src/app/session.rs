//! Session - handoff 後のメインシェル側のライフサイクル
//!
//! `activate` で registry と pump を作り、`end` で pump を止めて registry を破棄する。

use super::pump::{ActivityPump, PumpStats};
use super::registry::{ActivityRegistry, ActivityView};
use crate::config::ActivityConfig;
use crate::domain::SessionId;
use crate::ports::ActivitySource;

pub struct Session {
    target: String,
    registry: ActivityRegistry,
    pump: ActivityPump,
}

impl Session {
    /// Start the session for the handoff `target`, fed by `source`.
    pub fn activate<S>(target: impl Into<String>, source: S, config: &ActivityConfig) -> Self
    where
        S: ActivitySource + 'static,
    {
        let target = target.into();
        let registry = ActivityRegistry::create(config);
        let pump = ActivityPump::spawn(source, registry.clone());
        tracing::info!(session = %registry.session_id(), target = %target, "session activated");
        Self {
            target,
            registry,
            pump,
        }
    }

    pub fn id(&self) -> SessionId {
        self.registry.session_id()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn activity(&self) -> ActivityView {
        self.registry.view()
    }

    /// Stop the pump, reset counts and detach every subscriber.
    pub async fn end(self) -> PumpStats {
        let stats = self.pump.shutdown_and_join().await;
        self.registry.dispose();
        tracing::info!(
            session = %self.registry.session_id(),
            events = stats.events,
            reconnects = stats.reconnects,
            "session ended"
        );
        stats
    }
}
