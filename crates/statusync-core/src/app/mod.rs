//! App - ports を組み合わせた非同期ドライバ
//!
//! # 主要コンポーネント
//! - **ReadinessController**: 起動ハンドシェイク（poll → handoff / retry / quit）
//! - **ActivityRegistry**: セッション単位の activity counts と購読
//! - **ActivityPump**: ActivitySource → registry
//! - **Session**: handoff 後の registry + pump のライフサイクル

pub mod pump;
pub mod readiness;
pub mod registry;
pub mod session;
pub mod version_probe;

pub use self::pump::{ActivityPump, PumpStats};
pub use self::readiness::{LaunchOutcome, OperatorCommand, ReadinessController, ReadinessHandle};
pub use self::registry::{ActivityRegistry, ActivityView, Subscription};
pub use self::session::Session;
pub use self::version_probe::probe_version;
