//! HostBridge port - フロントエンドからホストプロセスを操作する境界
//!
//! RPC 風の呼び出し面。実装は IPC でも HTTP でもよい。

use async_trait::async_trait;

use crate::domain::HostStatus;
use crate::error::BridgeError;

/// Operations the launcher invokes on the backing service process.
///
/// `is_available()` covers the startup race where the bridge itself is not
/// wired up yet; the controller treats that as "nothing to do this tick".
#[async_trait]
pub trait HostBridge: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn check_status(&self) -> Result<HostStatus, BridgeError>;

    async fn restart(&self) -> Result<(), BridgeError>;

    async fn get_version(&self) -> Result<String, BridgeError>;

    async fn quit(&self) -> Result<(), BridgeError>;
}
