//! Ports - 抽象化レイヤー
//!
//! 外部との境界を trait で定義します。
//! - HostBridge: ホストプロセス（status check, restart, version, quit）
//! - ActivitySource: streaming activity イベントの受信元
//! - Clock: 予算判定に使う時刻

pub mod activity_source;
pub mod clock;
pub mod host_bridge;

pub use self::activity_source::ActivitySource;
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::host_bridge::HostBridge;
