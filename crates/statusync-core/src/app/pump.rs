//! ActivityPump - ActivitySource から registry へイベントを流し込むループ
//!
//! - `shutdown_tx` を drop するとループも止まる
//! - `shutdown_and_join()` で停止を待てる

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::registry::ActivityRegistry;
use crate::domain::SourceSignal;
use crate::ports::ActivitySource;

/// Counters of what a pump delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub events: u64,
    pub reconnects: u64,
}

pub struct ActivityPump {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<PumpStats>,
}

impl ActivityPump {
    pub fn spawn<S>(source: S, registry: ActivityRegistry) -> Self
    where
        S: ActivitySource + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(pump_loop(source, registry, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Stop taking new signals. A signal already being applied finishes first.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn shutdown_and_join(self) -> PumpStats {
        self.request_shutdown();
        match self.join.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(error = %err, "activity pump ended abnormally");
                PumpStats::default()
            }
        }
    }
}

async fn pump_loop<S: ActivitySource>(
    mut source: S,
    registry: ActivityRegistry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> PumpStats {
    let mut stats = PumpStats::default();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let signal = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // handle dropped
                    break;
                }
                continue;
            }
            signal = source.next_signal() => signal,
        };

        match signal {
            Some(SourceSignal::Event(event)) => {
                stats.events += 1;
                registry.apply(&event);
            }
            Some(SourceSignal::Reconnected) => {
                stats.reconnects += 1;
                tracing::info!(
                    session = %registry.session_id(),
                    "activity channel reconnected; dropping in-flight counts"
                );
                registry.reset();
            }
            None => {
                tracing::debug!(session = %registry.session_id(), "activity source closed");
                break;
            }
        }
    }
    stats
}
