//! ActivityRegistry - streaming activity のセッション単位の正本
//!
//! # 設計
//! - counts を持つのはこの registry だけ。外からは snapshot しか見えない
//! - 変更は `record_start` / `record_end` / `reset` の 3 つだけ
//! - 1 回の変更 = 1 回の broadcast。snapshot はロック内で revision 順に pending へ積み、
//!   callback はロックの外で 1 スレッドずつ順に呼ぶ。通知が混ざることはなく、
//!   callback の中から registry を読んでも書いてもデッドロックしない
//! - ライフサイクル: `create`（セッション開始）→ `reset`（再接続）→ `dispose`（セッション終了）

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::ActivityConfig;
use crate::domain::{
    ActivityCounts, ActivityEvent, ActivityKind, ActivitySnapshot, ClientType, EndOutcome,
    SessionId,
};

type Subscriber = Arc<dyn Fn(&ActivitySnapshot) + Send + Sync>;

/// A snapshot waiting for delivery, with the subscribers attached when it was taken.
struct Pending {
    snapshot: Arc<ActivitySnapshot>,
    subscribers: Vec<Subscriber>,
}

struct RegistryState {
    counts: ActivityCounts,
    revision: u64,
    current: Arc<ActivitySnapshot>,
    subscribers: BTreeMap<u64, Subscriber>,
    next_subscriber_id: u64,
    disposed: bool,
    pending: VecDeque<Pending>,
    /// Some thread is running callbacks and will drain `pending`.
    notifying: bool,
}

struct RegistryInner {
    session_id: SessionId,
    state: Mutex<RegistryState>,
    updates: broadcast::Sender<Arc<ActivitySnapshot>>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // callbacks never run under this lock, so the state is never half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run callbacks for every pending snapshot, in revision order.
    ///
    /// Only one thread delivers at a time. A mutation made while another thread
    /// (or a callback on this one) is delivering is queued and picked up by
    /// the loop that is already running.
    fn deliver_pending(&self) {
        {
            let mut state = self.lock();
            if state.notifying {
                return;
            }
            state.notifying = true;
        }
        let mut flag = NotifyingFlag {
            inner: self,
            armed: true,
        };

        loop {
            let next = {
                let mut state = self.lock();
                match state.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        state.notifying = false;
                        flag.armed = false;
                        return;
                    }
                }
            };
            for subscriber in &next.subscribers {
                subscriber(&next.snapshot);
            }
        }
    }
}

/// Releases the delivery role if a callback panics.
struct NotifyingFlag<'a> {
    inner: &'a RegistryInner,
    armed: bool,
}

impl Drop for NotifyingFlag<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().notifying = false;
        }
    }
}

/// Cheap to clone; all clones share the same counts and subscribers.
#[derive(Clone)]
pub struct ActivityRegistry {
    inner: Arc<RegistryInner>,
}

impl ActivityRegistry {
    /// Create the registry for a new session.
    pub fn create(config: &ActivityConfig) -> Self {
        let session_id = SessionId::generate();
        let counts = ActivityCounts::new();
        let current = Arc::new(ActivitySnapshot::capture(session_id, 0, Utc::now(), &counts));
        let (updates, _) = broadcast::channel(config.broadcast_capacity.max(1));

        tracing::debug!(session = %session_id, "activity registry created");
        Self {
            inner: Arc::new(RegistryInner {
                session_id,
                state: Mutex::new(RegistryState {
                    counts,
                    revision: 0,
                    current,
                    subscribers: BTreeMap::new(),
                    next_subscriber_id: 0,
                    disposed: false,
                    pending: VecDeque::new(),
                    notifying: false,
                }),
                updates,
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn record_start(&self, client_type: &ClientType) {
        self.mutate("start", |counts| {
            counts.record_start(client_type);
            true
        });
    }

    /// Clamped at zero. An end with no tracked start is expected (missed
    /// events, duplicate delivery) and does not notify anyone.
    pub fn record_end(&self, client_type: &ClientType) {
        let session_id = self.inner.session_id;
        self.mutate("end", |counts| match counts.record_end(client_type) {
            EndOutcome::Decremented { .. } => true,
            EndOutcome::Clamped => {
                tracing::warn!(
                    session = %session_id,
                    client_type = %client_type,
                    "activity end without a tracked start; count stays at zero"
                );
                false
            }
        });
    }

    pub fn apply(&self, event: &ActivityEvent) {
        match event.kind {
            ActivityKind::Start => self.record_start(&event.client_type),
            ActivityKind::End => self.record_end(&event.client_type),
        }
    }

    /// Clear every count and notify subscribers of the empty state, even if
    /// it was already empty.
    pub fn reset(&self) {
        self.mutate("reset", |counts| {
            counts.clear();
            true
        });
    }

    pub fn snapshot(&self) -> Arc<ActivitySnapshot> {
        Arc::clone(&self.inner.lock().current)
    }

    /// Register a callback invoked with the new snapshot after every mutation.
    ///
    /// Callbacks run outside the registry lock and may read, mutate or detach.
    /// A mutation made from a callback is delivered after the current snapshot
    /// has reached every subscriber. A subscriber attached when a mutation
    /// happens receives that snapshot even if it detaches before delivery.
    /// After `dispose()` the callback is never registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ActivitySnapshot) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        if state.disposed {
            tracing::debug!(session = %self.inner.session_id, "subscribe after dispose ignored");
            return Subscription::inert();
        }
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(id, Arc::new(callback));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Async stream of snapshots, fed under the registry lock in revision order.
    /// A slow receiver lags (`RecvError::Lagged`) instead of blocking writers.
    pub fn updates(&self) -> broadcast::Receiver<Arc<ActivitySnapshot>> {
        self.inner.updates.subscribe()
    }

    /// Read-only handle for consumers.
    pub fn view(&self) -> ActivityView {
        ActivityView {
            registry: self.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// End of session: counts reset, subscribers see the empty state one last
    /// time and are detached. Later mutations are ignored.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.counts.clear();
            self.publish(&mut state);
            state.subscribers.clear();
            state.disposed = true;
        }
        self.inner.deliver_pending();
        tracing::debug!(session = %self.inner.session_id, "activity registry disposed");
    }

    fn mutate(&self, op: &'static str, f: impl FnOnce(&mut ActivityCounts) -> bool) {
        {
            let mut state = self.inner.lock();
            if state.disposed {
                tracing::debug!(session = %self.inner.session_id, op, "mutation after dispose ignored");
                return;
            }
            if !f(&mut state.counts) {
                return;
            }
            let snapshot = self.publish(&mut state);
            tracing::trace!(
                session = %self.inner.session_id,
                op,
                revision = snapshot.revision(),
                total = snapshot.total(),
                "activity updated"
            );
        }
        self.inner.deliver_pending();
    }

    /// New revision: becomes `current`, goes to the async stream and is queued for callbacks.
    fn publish(&self, state: &mut RegistryState) -> Arc<ActivitySnapshot> {
        state.revision += 1;
        let snapshot = Arc::new(ActivitySnapshot::capture(
            self.inner.session_id,
            state.revision,
            Utc::now(),
            &state.counts,
        ));
        state.current = Arc::clone(&snapshot);
        let subscribers = state.subscribers.values().cloned().collect();
        state.pending.push_back(Pending {
            snapshot: Arc::clone(&snapshot),
            subscribers,
        });
        // no receivers is fine
        let _ = self.inner.updates.send(Arc::clone(&snapshot));
        snapshot
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::create(&ActivityConfig::default())
    }
}

/// What UI surfaces get: snapshots and subscriptions, no mutation.
#[derive(Clone)]
pub struct ActivityView {
    registry: ActivityRegistry,
}

impl ActivityView {
    pub fn session_id(&self) -> SessionId {
        self.registry.session_id()
    }

    pub fn snapshot(&self) -> Arc<ActivitySnapshot> {
        self.registry.snapshot()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ActivitySnapshot) + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    pub fn updates(&self) -> broadcast::Receiver<Arc<ActivitySnapshot>> {
        self.registry.updates()
    }
}

/// Detach handle returned by `subscribe`. Dropping it detaches too.
#[must_use = "dropping a Subscription detaches the callback"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    id: Option<u64>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            registry: Weak::new(),
            id: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        let (Some(id), Some(inner)) = (self.id, self.registry.upgrade()) else {
            return false;
        };
        inner.lock().subscribers.contains_key(&id)
    }

    pub fn detach(mut self) {
        self.detach_inner();
    }

    fn detach_inner(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(inner) = self.registry.upgrade() {
            inner.lock().subscribers.remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every snapshot a subscriber sees.
    fn recorder(registry: &ActivityRegistry) -> (Subscription, Arc<Mutex<Vec<Arc<ActivitySnapshot>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = registry.subscribe(move |snapshot| {
            sink.lock().unwrap().push(Arc::new(snapshot.clone()));
        });
        (sub, seen)
    }

    fn totals(seen: &Mutex<Vec<Arc<ActivitySnapshot>>>) -> Vec<u64> {
        seen.lock().unwrap().iter().map(|s| s.total()).collect()
    }

    #[test]
    fn independent_subscribers_see_the_same_totals() {
        let registry = ActivityRegistry::default();
        let (_a, seen_a) = recorder(&registry);
        let (_b, seen_b) = recorder(&registry);

        registry.record_start(&ClientType::new("claude"));
        registry.record_start(&ClientType::new("codex"));
        registry.record_start(&ClientType::new("gemini"));

        assert_eq!(totals(&seen_a), vec![1, 2, 3]);
        assert_eq!(totals(&seen_b), vec![1, 2, 3]);

        let revisions_a: Vec<u64> = seen_a.lock().unwrap().iter().map(|s| s.revision()).collect();
        let revisions_b: Vec<u64> = seen_b.lock().unwrap().iter().map(|s| s.revision()).collect();
        assert_eq!(revisions_a, revisions_b);
    }

    #[test]
    fn five_starts_seven_ends_clamps_to_zero() {
        let registry = ActivityRegistry::default();
        let (_sub, seen) = recorder(&registry);
        let x = ClientType::new("x");

        for _ in 0..5 {
            registry.record_start(&x);
        }
        for _ in 0..7 {
            registry.record_end(&x);
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.count(&x), 0);
        assert_eq!(snapshot.total(), 0);
        // the two clamped ends changed nothing and notified nobody
        assert_eq!(totals(&seen), vec![1, 2, 3, 4, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn detaching_one_subscriber_leaves_the_others() {
        let registry = ActivityRegistry::default();
        let (a, seen_a) = recorder(&registry);
        let (b, seen_b) = recorder(&registry);

        registry.record_start(&ClientType::new("claude"));
        a.detach();
        registry.record_start(&ClientType::new("claude"));

        assert_eq!(totals(&seen_a), vec![1]);
        assert_eq!(totals(&seen_b), vec![1, 2]);
        assert!(b.is_attached());
        assert_eq!(registry.subscriber_count(), 1);

        drop(b);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_reads_the_registry_from_its_callback() {
        let registry = ActivityRegistry::default();
        let view = registry.view();
        let reads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reads);
        let sub = registry.subscribe(move |snapshot| {
            let current = view.snapshot();
            sink.lock().unwrap().push((snapshot.revision(), current.revision(), current.total()));
        });

        registry.record_start(&ClientType::new("claude"));
        registry.record_start(&ClientType::new("codex"));

        assert_eq!(*reads.lock().unwrap(), vec![(1, 1, 1), (2, 2, 2)]);
        assert!(sub.is_attached());
    }

    #[test]
    fn subscriber_detaches_itself_from_its_callback() {
        let registry = ActivityRegistry::default();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));
        let (own_slot, counter) = (Arc::clone(&slot), Arc::clone(&calls));
        let sub = registry.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            own_slot.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        registry.record_start(&ClientType::new("claude"));
        registry.record_start(&ClientType::new("claude"));

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn mutation_from_a_callback_is_delivered_next() {
        let registry = ActivityRegistry::default();
        let (_sub, seen) = recorder(&registry);
        let writer = registry.clone();
        let _echo = registry.subscribe(move |snapshot| {
            if snapshot.revision() == 1 {
                writer.record_start(&ClientType::new("codex"));
            }
        });

        registry.record_start(&ClientType::new("claude"));

        assert_eq!(totals(&seen), vec![1, 2]);
        assert_eq!(registry.snapshot().total(), 2);
    }

    #[test]
    fn reset_twice_equals_reset_once() {
        let registry = ActivityRegistry::default();
        let (_sub, seen) = recorder(&registry);
        registry.record_start(&ClientType::new("claude"));
        registry.record_start(&ClientType::new("codex"));

        registry.reset();
        let once = registry.snapshot();
        registry.reset();
        let twice = registry.snapshot();

        assert_eq!(once.counts_by_client(), twice.counts_by_client());
        assert_eq!(once.total(), 0);
        assert_eq!(twice.total(), 0);
        // both resets are announced
        assert_eq!(totals(&seen), vec![1, 2, 0, 0]);
    }

    #[test]
    fn start_end_round_trip_restores_client_count() {
        let registry = ActivityRegistry::default();
        let a = ClientType::new("a");
        registry.record_start(&a);
        registry.record_start(&ClientType::new("b"));
        let before = registry.snapshot();

        registry.record_start(&a);
        registry.record_end(&a);
        let after = registry.snapshot();

        assert_eq!(after.count(&a), before.count(&a));
        assert_eq!(after.counts_by_client(), before.counts_by_client());
        assert!(after.revision() > before.revision());
    }

    #[test]
    fn dispose_detaches_everyone_and_freezes_counts() {
        let registry = ActivityRegistry::default();
        let (sub, seen) = recorder(&registry);
        registry.record_start(&ClientType::new("claude"));

        registry.dispose();
        assert!(registry.is_disposed());
        assert!(!sub.is_attached());
        assert_eq!(registry.subscriber_count(), 0);

        registry.record_start(&ClientType::new("claude"));
        let (late, late_seen) = recorder(&registry);
        registry.reset();

        assert!(!late.is_attached());
        assert!(late_seen.lock().unwrap().is_empty());
        assert_eq!(totals(&seen), vec![1, 0]);
        assert!(registry.snapshot().is_idle());
    }

    #[tokio::test]
    async fn async_updates_follow_every_mutation() {
        let registry = ActivityRegistry::default();
        let mut updates = registry.updates();

        registry.apply(&ActivityEvent::start("claude"));
        registry.apply(&ActivityEvent::end("claude"));
        registry.apply(&ActivityEvent::end("claude"));
        registry.reset();

        let mut seen = Vec::new();
        while let Ok(snapshot) = updates.try_recv() {
            seen.push((snapshot.revision(), snapshot.total()));
        }
        assert_eq!(seen, vec![(1, 1), (2, 0), (3, 0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_keep_total_consistent() {
        let registry = ActivityRegistry::default();
        let broken = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&broken);
        let _sub = registry.subscribe(move |snapshot| {
            let sum: u64 = snapshot.counts_by_client().values().map(|c| u64::from(*c)).sum();
            if sum != snapshot.total() {
                sink.lock().unwrap().push(snapshot.revision());
            }
        });

        let mut joins = Vec::new();
        for worker in 0..8 {
            let registry = registry.clone();
            joins.push(tokio::spawn(async move {
                let client = ClientType::new(format!("client-{}", worker % 3));
                for _ in 0..200 {
                    registry.record_start(&client);
                    tokio::task::yield_now().await;
                    registry.record_end(&client);
                    // duplicate delivery
                    registry.record_end(&client);
                }
            }));
        }
        for join in joins {
            join.await.unwrap();
        }

        assert!(broken.lock().unwrap().is_empty());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total(), 0);
        assert!(snapshot.counts_by_client().is_empty());
    }
}
