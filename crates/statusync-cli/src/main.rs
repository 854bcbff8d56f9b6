use std::sync::Arc;

use statusync_core::StatusyncConfig;
use statusync_core::app::{LaunchOutcome, ReadinessController, Session};
use statusync_core::domain::{
    ActivityEvent, ClientBadge, ClientType, HostStatus, NavFocus, ReadinessPhase, RequestsBadge,
};
use statusync_core::error::StatusyncError;
use statusync_core::impls::{ScriptedHost, channel_source};
use statusync_core::observability::{ActivitySummary, LaunchView};
use tokio::sync::oneshot;

const DEMO_TARGET: &str = "http://127.0.0.1:8787/";

/// Which host script to run.
#[derive(Debug, Clone, Copy)]
enum Scenario {
    /// A few pending replies, then a redirect.
    Ready,
    /// The host reports an error; the demo retries once and the restart brings it up.
    Retry,
}

impl Scenario {
    fn from_args() -> Self {
        match std::env::args().nth(1).as_deref() {
            Some("retry") => Scenario::Retry,
            _ => Scenario::Ready,
        }
    }

    fn host(self) -> ScriptedHost {
        match self {
            Scenario::Ready => ScriptedHost::ready_after(3, DEMO_TARGET),
            Scenario::Retry => ScriptedHost::new()
                .respond(HostStatus::pending())
                .respond(HostStatus::failed("port 8787 is already in use"))
                .after_restart(vec![Ok(HostStatus::pending()), Ok(HostStatus::ready(DEMO_TARGET))]),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StatusyncError> {
    init_tracing();

    let config = StatusyncConfig::load_from_env()?;
    let scenario = Scenario::from_args();
    tracing::info!(?scenario, "statusync demo starting");

    // (A) 起動ハンドシェイク
    let host = Arc::new(scenario.host());
    let (handoff_tx, handoff_rx) = oneshot::channel::<String>();
    let (controller, handle) = ReadinessController::new(host.clone(), config.launcher.clone());
    let controller = controller.on_handoff(move |target| {
        // receiver may be gone if the demo is shutting down
        let _ = handoff_tx.send(target.to_string());
    });

    let mut watcher = handle.clone();
    let ui = tokio::spawn(async move {
        let mut retried = false;
        while let Ok(status) = watcher.changed().await {
            let view = LaunchView::new(&status, watcher.version().as_deref());
            print_json("launch", &view);
            if status.phase() == ReadinessPhase::Failed && !retried {
                retried = true;
                if let Err(err) = watcher.retry().await {
                    tracing::warn!(error = %err, "retry could not be sent");
                }
            }
        }
    });
    drop(handle);

    let outcome = controller.run().await;
    ui.abort();

    let target = match outcome {
        LaunchOutcome::HandedOff { .. } => match handoff_rx.await {
            Ok(target) => target,
            Err(_) => return Err(StatusyncError::ControllerGone),
        },
        LaunchOutcome::Quit => {
            tracing::info!("operator quit the launch");
            return Ok(());
        }
        LaunchOutcome::Abandoned { status } => {
            tracing::error!(error = ?status.error_detail(), "launch failed");
            return Ok(());
        }
    };

    // (B) handoff 後のセッション
    let (events, source) = channel_source(config.activity.broadcast_capacity);
    let session = Session::activate(target, source, &config.activity);
    let mut updates = session.activity().updates();

    let script = [
        ActivityEvent::start("claude"),
        ActivityEvent::start("codex"),
        ActivityEvent::start("claude"),
        ActivityEvent::end("claude"),
    ];
    for event in script {
        events.send_event(event).await?;
        match updates.recv().await {
            Ok(snapshot) => print_json("activity", &ActivitySummary::from(snapshot.as_ref())),
            Err(err) => tracing::warn!(error = %err, "activity update missed"),
        }
    }

    // (C) ナビゲーションのバッジ
    let snapshot = session.activity().snapshot();
    let focus = NavFocus::from_path("/routes/claude");
    for client in ["claude", "codex", "gemini"] {
        let badge = ClientBadge::derive(&snapshot, &ClientType::new(client), &focus);
        print_json("badge", &badge);
    }
    print_json("requests", &RequestsBadge::derive(&snapshot, &focus));

    let stats = session.end().await;
    tracing::info!(
        events = stats.events,
        reconnects = stats.reconnects,
        status_calls = host.status_calls(),
        "statusync demo finished"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(kind: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{kind}: {json}"),
        Err(err) => tracing::warn!(kind, error = %err, "could not render view"),
    }
}
