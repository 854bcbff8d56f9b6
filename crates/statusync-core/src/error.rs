use thiserror::Error;

/// Everything a host bridge call can fail with.
///
/// The controller classifies these:
/// - `Unavailable` / `Transport`: 一時的な失敗。次の tick で再試行する
/// - `Application`: ホストが明示的に返したエラー。operator に表示する
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("host bridge is not available yet")]
    Unavailable,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{0}")]
    Application(String),
}

impl BridgeError {
    /// Transient failures never change the readiness phase.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Unavailable | BridgeError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StatusyncError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("readiness controller has already stopped")]
    ControllerGone,

    #[error("activity session is already closed")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_unavailable_are_transient() {
        assert!(BridgeError::Unavailable.is_transient());
        assert!(BridgeError::Transport("reset by peer".into()).is_transient());
        assert!(!BridgeError::Application("port in use".into()).is_transient());
    }

    #[test]
    fn application_error_displays_verbatim() {
        let err = BridgeError::Application("port 9880 already in use".into());
        assert_eq!(err.to_string(), "port 9880 already in use");
    }
}
