//! statusync-core
//!
//! Startup readiness handshake and live activity tracking for a desktop shell
//! that hosts a local service.
//!
//! # モジュール構成
//! - **domain**: 純粋な型と状態機械（ReadinessMachine, ActivityCounts, NavFocus, ...）
//! - **ports**: 外部との境界（HostBridge, ActivitySource, Clock）
//! - **app**: 非同期ドライバ（ReadinessController, ActivityRegistry, Session）
//! - **impls**: 開発・テスト用の実装（ScriptedHost, ChannelSource）
//! - **config** / **error** / **observability**: 設定、エラー型、表示用ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use config::StatusyncConfig;
pub use error::{BridgeError, ConfigError, StatusyncError};
