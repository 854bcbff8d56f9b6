//! Clock port - 時刻の抽象化
//!
//! Readiness の予算判定は `Clock::now()` だけを見る。
//! `tokio::time::Instant` を返すので、paused runtime のテストでは SystemClock もそのまま使える。

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Clock は現在時刻を提供
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// 本番用: tokio の時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// テスト用: 手動で進める時計
///
/// Timers keep running on the tokio clock; only budget checks read this one,
/// which lets a test simulate a wall-clock jump (e.g. the machine slept).
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: Instant) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_told() {
        let start = Instant::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), start + Duration::from_secs(3));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
