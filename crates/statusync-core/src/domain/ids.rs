//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型ごとに分ける。
//! - `SessionId`: activity registry が生きている 1 セッション
//! - `AttemptId`: 起動ハンドシェイクの 1 試行（retry ごとに新しくなる）
//!
//! ULID は生成順にソートできるので、ログ上で試行の前後関係がそのまま読める。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"session-", "attempt-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は実行時には使わないマーカー型で、SessionId と AttemptId を混同できなくする。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻から新しい ID を生成
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// markers

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Session {}

impl IdMarker for Session {
    fn prefix() -> &'static str {
        "session-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attempt {}

impl IdMarker for Attempt {
    fn prefix() -> &'static str {
        "attempt-"
    }
}

/// Identifier of one activity session (registry create → dispose).
pub type SessionId = Id<Session>;

/// Identifier of one launch attempt (initial start or an operator retry).
pub type AttemptId = Id<Attempt>;
