//! Activity model: in-flight streaming request counts per client type.
//!
//! This module holds only the pure bookkeeping. Locking, fan-out and
//! lifecycle live in `app::registry`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClientType, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Start,
    End,
}

/// One inbound activity event: `{"clientType": "claude", "kind": "start"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub client_type: ClientType,
    pub kind: ActivityKind,
}

impl ActivityEvent {
    pub fn start(client_type: impl Into<ClientType>) -> Self {
        Self {
            client_type: client_type.into(),
            kind: ActivityKind::Start,
        }
    }

    pub fn end(client_type: impl Into<ClientType>) -> Self {
        Self {
            client_type: client_type.into(),
            kind: ActivityKind::End,
        }
    }
}

/// What an activity source can deliver.
///
/// `Reconnected` means the channel had a gap; counts from before it cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    Event(ActivityEvent),
    Reconnected,
}

/// Result of a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    Decremented { remaining: u32 },
    /// No matching start was tracked; the count stayed at zero.
    Clamped,
}

/// Per-client counters with an incrementally maintained total.
///
/// Zero entries are removed so that a start/end pair leaves the map exactly
/// as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityCounts {
    by_client: BTreeMap<ClientType, u32>,
    total: u64,
}

impl ActivityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count for `client_type`.
    pub fn record_start(&mut self, client_type: &ClientType) -> u32 {
        let count = self.by_client.entry(client_type.clone()).or_insert(0);
        // a saturated client must not move the total either
        if let Some(next) = count.checked_add(1) {
            *count = next;
            self.total += 1;
        }
        *count
    }

    pub fn record_end(&mut self, client_type: &ClientType) -> EndOutcome {
        let Some(count) = self.by_client.get_mut(client_type) else {
            return EndOutcome::Clamped;
        };

        // entries are never stored at zero, so count >= 1 here
        *count -= 1;
        self.total = self.total.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            self.by_client.remove(client_type);
        }
        EndOutcome::Decremented { remaining }
    }

    /// Returns `true` if anything was cleared.
    pub fn clear(&mut self) -> bool {
        let had_activity = !self.by_client.is_empty();
        self.by_client.clear();
        self.total = 0;
        had_activity
    }

    pub fn count(&self, client_type: &ClientType) -> u32 {
        self.by_client.get(client_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_idle(&self) -> bool {
        self.total == 0
    }

    pub fn by_client(&self) -> &BTreeMap<ClientType, u32> {
        &self.by_client
    }
}

/// Immutable view handed to consumers.
///
/// Every subscriber notified for one mutation receives the same snapshot
/// (same `revision`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySnapshot {
    session_id: SessionId,
    revision: u64,
    taken_at: DateTime<Utc>,
    counts_by_client: BTreeMap<ClientType, u32>,
    total: u64,
}

impl ActivitySnapshot {
    pub fn capture(
        session_id: SessionId,
        revision: u64,
        taken_at: DateTime<Utc>,
        counts: &ActivityCounts,
    ) -> Self {
        Self {
            session_id,
            revision,
            taken_at,
            counts_by_client: counts.by_client().clone(),
            total: counts.total(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Unknown client types read as zero.
    pub fn count(&self, client_type: &ClientType) -> u32 {
        self.counts_by_client.get(client_type).copied().unwrap_or(0)
    }

    pub fn counts_by_client(&self) -> &BTreeMap<ClientType, u32> {
        &self.counts_by_client
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_idle(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn assert_total_is_sum(counts: &ActivityCounts) {
        let sum: u64 = counts.by_client().values().map(|c| u64::from(*c)).sum();
        assert_eq!(counts.total(), sum);
    }

    #[test]
    fn more_ends_than_starts_clamps_at_zero() {
        let x = ClientType::new("x");
        let mut counts = ActivityCounts::new();
        for _ in 0..5 {
            counts.record_start(&x);
        }
        let outcomes: Vec<EndOutcome> = (0..7).map(|_| counts.record_end(&x)).collect();

        assert_eq!(counts.count(&x), 0);
        assert_eq!(counts.total(), 0);
        assert_eq!(outcomes[4], EndOutcome::Decremented { remaining: 0 });
        assert_eq!(outcomes[5], EndOutcome::Clamped);
        assert_eq!(outcomes[6], EndOutcome::Clamped);
    }

    #[test]
    fn end_without_start_is_clamped() {
        let mut counts = ActivityCounts::new();
        assert_eq!(counts.record_end(&ClientType::new("ghost")), EndOutcome::Clamped);
        assert!(counts.is_idle());
    }

    #[test]
    fn start_then_end_restores_previous_state() {
        let a = ClientType::new("a");
        let b = ClientType::new("b");
        let mut counts = ActivityCounts::new();
        counts.record_start(&a);
        counts.record_start(&b);
        let before = counts.clone();

        counts.record_start(&a);
        counts.record_end(&a);
        assert_eq!(counts, before);

        counts.record_start(&ClientType::new("c"));
        counts.record_end(&ClientType::new("c"));
        assert_eq!(counts, before);
    }

    #[rstest]
    #[case::only_starts("aaabbc")]
    #[case::interleaved("aAbBaacCA")]
    #[case::ends_first("AAAaBbBB")]
    #[case::drain_everything("abcABCABC")]
    fn total_tracks_sum_for_any_sequence(#[case] script: &str) {
        // lowercase = start, uppercase = end
        let mut counts = ActivityCounts::new();
        for ch in script.chars() {
            let client = ClientType::new(ch.to_ascii_lowercase().to_string());
            if ch.is_ascii_lowercase() {
                counts.record_start(&client);
            } else {
                counts.record_end(&client);
            }
            assert_total_is_sum(&counts);
        }
    }

    #[test]
    fn saturated_client_keeps_total_in_step() {
        let x = ClientType::new("x");
        let y = ClientType::new("y");
        let mut counts = ActivityCounts::new();
        counts.by_client.insert(x.clone(), u32::MAX);
        counts.total = u64::from(u32::MAX);

        assert_eq!(counts.record_start(&x), u32::MAX);
        counts.record_start(&y);

        assert_eq!(counts.total(), u64::from(u32::MAX) + 1);
        assert_total_is_sum(&counts);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut counts = ActivityCounts::new();
        counts.record_start(&ClientType::new("a"));

        assert!(counts.clear());
        let once = counts.clone();
        assert!(!counts.clear());
        assert_eq!(counts, once);
        assert!(counts.is_idle());
    }

    #[test]
    fn snapshot_reads_unknown_clients_as_zero() {
        let mut counts = ActivityCounts::new();
        counts.record_start(&ClientType::new("claude"));
        let snapshot = ActivitySnapshot::capture(SessionId::generate(), 1, Utc::now(), &counts);

        assert_eq!(snapshot.count(&ClientType::new("claude")), 1);
        assert_eq!(snapshot.count(&ClientType::new("never-seen")), 0);
        assert_eq!(snapshot.total(), 1);
    }

    #[test]
    fn event_wire_shape() {
        let event: ActivityEvent =
            serde_json::from_str(r#"{"clientType": "codex", "kind": "end"}"#).unwrap();
        assert_eq!(event, ActivityEvent::end("codex"));
    }
}
