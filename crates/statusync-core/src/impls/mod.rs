//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **ScriptedHost**: 応答をスクリプトで与える HostBridge
//! - **ChannelSource**: mpsc で供給する ActivitySource

pub mod channel_source;
pub mod scripted_host;

pub use self::channel_source::{ChannelSource, ChannelSourceSender, channel_source};
pub use self::scripted_host::{ScriptedHost, StatusReply};
