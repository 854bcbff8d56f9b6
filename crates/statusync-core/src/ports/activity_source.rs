//! ActivitySource port - streaming activity イベントの受信元
//!
//! push でも poll でもよい。registry 側は at-least-once 配送を前提にしている
//! （重複した end で count が負になることはない）。

use async_trait::async_trait;

use crate::domain::SourceSignal;

#[async_trait]
pub trait ActivitySource: Send {
    /// Next signal, or `None` once the source is closed for good.
    async fn next_signal(&mut self) -> Option<SourceSignal>;
}
