//! Best-effort version lookup for the launch screen.

use crate::config::LauncherConfig;
use crate::ports::HostBridge;

/// Wait (bounded) for the bridge, then ask for the version once.
///
/// Never fails: a missing bridge, an error or an empty answer all yield `None`.
pub async fn probe_version(bridge: &dyn HostBridge, config: &LauncherConfig) -> Option<String> {
    let attempt = async {
        while !bridge.is_available() {
            tokio::time::sleep(config.version_probe_poll()).await;
        }
        bridge.get_version().await
    };

    match tokio::time::timeout(config.version_probe_timeout(), attempt).await {
        Ok(Ok(version)) if !version.trim().is_empty() => Some(version.trim().to_string()),
        Ok(Ok(_)) => None,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "version probe failed");
            None
        }
        Err(_) => {
            tracing::debug!(
                timeout_ms = config.version_probe_timeout_ms,
                "version probe timed out"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::BridgeError;
    use crate::impls::ScriptedHost;

    #[tokio::test(start_paused = true)]
    async fn returns_version_when_bridge_is_up() {
        let host = ScriptedHost::new().version(Ok("v1.4.2".into()));
        let version = probe_version(&host, &LauncherConfig::default()).await;
        assert_eq!(version.as_deref(), Some("v1.4.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_bridge_to_appear() {
        let host = Arc::new(ScriptedHost::new().unavailable().version(Ok("v2".into())));
        let late = Arc::clone(&host);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            late.set_available(true);
        });

        let version = probe_version(host.as_ref(), &LauncherConfig::default()).await;
        assert_eq!(version.as_deref(), Some("v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_time_box() {
        let host = ScriptedHost::new().unavailable();
        let started = tokio::time::Instant::now();
        let version = probe_version(&host, &LauncherConfig::default()).await;

        assert_eq!(version, None);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_and_blank_versions_are_absent() {
        let failing = ScriptedHost::new().version(Err(BridgeError::Transport("eof".into())));
        assert_eq!(probe_version(&failing, &LauncherConfig::default()).await, None);

        let blank = ScriptedHost::new().version(Ok("  ".into()));
        assert_eq!(probe_version(&blank, &LauncherConfig::default()).await, None);
    }
}
