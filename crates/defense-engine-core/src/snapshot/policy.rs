// File: src/snapshot/policy.rs
//
// Pluggable policies deciding when an aggregate's state is materialized

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Decides whether to snapshot an aggregate after a save.
///
/// Policies may keep per-aggregate state (last snapshot times, measured
/// costs); that state is guarded by a mutex keyed work over aggregate ids and
/// must stay cheap, since `should_snapshot` runs on the save path.
pub trait SnapshotPolicy: Send + Sync {
    fn should_snapshot(&self, aggregate_id: Uuid, version: i64, events_since_snapshot: i64)
        -> bool;

    /// Observation hook: a snapshot restore took `duration`.
    fn observe_restore(&self, _aggregate_id: Uuid, _duration: Duration) {}

    /// Observation hook: replaying `events` events took `duration`.
    fn observe_replay(&self, _aggregate_id: Uuid, _events: u64, _duration: Duration) {}

    /// Notification that a snapshot was captured for this aggregate.
    fn snapshot_taken(&self, _aggregate_id: Uuid) {}
}

/// Snapshot once at least `threshold` events accumulated since the last one.
pub struct EventCountPolicy {
    threshold: i64,
}

impl EventCountPolicy {
    pub fn new(threshold: i64) -> Self {
        Self { threshold: threshold.max(1) }
    }
}

impl SnapshotPolicy for EventCountPolicy {
    fn should_snapshot(&self, _id: Uuid, _version: i64, events_since_snapshot: i64) -> bool {
        events_since_snapshot >= self.threshold
    }
}

/// Snapshot whenever the aggregate version is a multiple of `interval`.
pub struct VersionIntervalPolicy {
    interval: i64,
}

impl VersionIntervalPolicy {
    pub fn new(interval: i64) -> Self {
        Self { interval: interval.max(1) }
    }
}

impl SnapshotPolicy for VersionIntervalPolicy {
    fn should_snapshot(&self, _id: Uuid, version: i64, _events_since: i64) -> bool {
        version > 0 && version % self.interval == 0
    }
}

/// Snapshot once at least `min_elapsed` passed since this aggregate's last
/// snapshot. An aggregate with no recorded snapshot time is due immediately.
pub struct TimeBasedPolicy {
    min_elapsed: Duration,
    last_snapshot: Mutex<HashMap<Uuid, Instant>>,
}

impl TimeBasedPolicy {
    pub fn new(min_elapsed: Duration) -> Self {
        Self {
            min_elapsed,
            last_snapshot: Mutex::new(HashMap::new()),
        }
    }
}

impl SnapshotPolicy for TimeBasedPolicy {
    fn should_snapshot(&self, aggregate_id: Uuid, _version: i64, _events_since: i64) -> bool {
        let last = self.last_snapshot.lock().expect("policy lock poisoned");
        match last.get(&aggregate_id) {
            Some(at) => at.elapsed() >= self.min_elapsed,
            None => true,
        }
    }

    fn snapshot_taken(&self, aggregate_id: Uuid) {
        let mut last = self.last_snapshot.lock().expect("policy lock poisoned");
        last.insert(aggregate_id, Instant::now());
    }
}

/// How a composite combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    /// Every child must fire.
    All,
    /// Any child firing is enough.
    Any,
}

/// Combines child policies with AND/OR semantics; observations and
/// notifications fan out to every child.
pub struct CompositePolicy {
    op: CompositeOp,
    children: Vec<std::sync::Arc<dyn SnapshotPolicy>>,
}

impl CompositePolicy {
    pub fn new(op: CompositeOp, children: Vec<std::sync::Arc<dyn SnapshotPolicy>>) -> Self {
        Self { op, children }
    }
}

impl SnapshotPolicy for CompositePolicy {
    fn should_snapshot(&self, id: Uuid, version: i64, events_since: i64) -> bool {
        match self.op {
            CompositeOp::All => self
                .children
                .iter()
                .all(|child| child.should_snapshot(id, version, events_since)),
            CompositeOp::Any => self
                .children
                .iter()
                .any(|child| child.should_snapshot(id, version, events_since)),
        }
    }

    fn observe_restore(&self, id: Uuid, duration: Duration) {
        for child in &self.children {
            child.observe_restore(id, duration);
        }
    }

    fn observe_replay(&self, id: Uuid, events: u64, duration: Duration) {
        for child in &self.children {
            child.observe_replay(id, events, duration);
        }
    }

    fn snapshot_taken(&self, id: Uuid) {
        for child in &self.children {
            child.snapshot_taken(id);
        }
    }
}

#[derive(Default)]
struct AdaptiveStats {
    restore_costs: VecDeque<Duration>,
    replay_cost_per_event: VecDeque<f64>,
}

impl AdaptiveStats {
    fn push_bounded<T>(window: usize, queue: &mut VecDeque<T>, value: T) {
        if queue.len() == window {
            queue.pop_front();
        }
        queue.push_back(value);
    }

    fn avg_restore_micros(&self) -> Option<f64> {
        if self.restore_costs.is_empty() {
            return None;
        }
        let total: f64 = self
            .restore_costs
            .iter()
            .map(|d| d.as_secs_f64() * 1_000_000.0)
            .sum();
        Some(total / self.restore_costs.len() as f64)
    }

    fn avg_replay_micros_per_event(&self) -> Option<f64> {
        if self.replay_cost_per_event.is_empty() {
            return None;
        }
        let total: f64 = self.replay_cost_per_event.iter().sum();
        Some(total / self.replay_cost_per_event.len() as f64)
    }
}

/// Snapshot when enough events accumulated *and* the projected replay cost
/// for this aggregate exceeds `cost_ratio` times the measured restore cost.
///
/// With no restore measurement yet, meeting the event threshold is enough;
/// the first snapshot establishes the baseline.
pub struct AdaptivePolicy {
    event_threshold: i64,
    cost_ratio: f64,
    window: usize,
    stats: Mutex<HashMap<Uuid, AdaptiveStats>>,
}

impl AdaptivePolicy {
    pub const DEFAULT_EVENT_THRESHOLD: i64 = 50;
    pub const DEFAULT_COST_RATIO: f64 = 2.0;
    pub const DEFAULT_WINDOW: usize = 16;

    pub fn new(event_threshold: i64, cost_ratio: f64, window: usize) -> Self {
        Self {
            event_threshold: event_threshold.max(1),
            cost_ratio,
            window: window.max(1),
            stats: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_EVENT_THRESHOLD,
            Self::DEFAULT_COST_RATIO,
            Self::DEFAULT_WINDOW,
        )
    }
}

impl SnapshotPolicy for AdaptivePolicy {
    fn should_snapshot(&self, aggregate_id: Uuid, _version: i64, events_since: i64) -> bool {
        if events_since < self.event_threshold {
            return false;
        }

        let stats = self.stats.lock().expect("policy lock poisoned");
        let Some(entry) = stats.get(&aggregate_id) else {
            return true;
        };
        let (Some(restore), Some(per_event)) =
            (entry.avg_restore_micros(), entry.avg_replay_micros_per_event())
        else {
            return true;
        };

        let projected_replay = per_event * events_since as f64;
        projected_replay > self.cost_ratio * restore
    }

    fn observe_restore(&self, aggregate_id: Uuid, duration: Duration) {
        let mut stats = self.stats.lock().expect("policy lock poisoned");
        let entry = stats.entry(aggregate_id).or_default();
        AdaptiveStats::push_bounded(self.window, &mut entry.restore_costs, duration);
    }

    fn observe_replay(&self, aggregate_id: Uuid, events: u64, duration: Duration) {
        if events == 0 {
            return;
        }
        let mut stats = self.stats.lock().expect("policy lock poisoned");
        let entry = stats.entry(aggregate_id).or_default();
        let per_event = duration.as_secs_f64() * 1_000_000.0 / events as f64;
        AdaptiveStats::push_bounded(self.window, &mut entry.replay_cost_per_event, per_event);
    }
}

/// Fires on every save. For tests.
pub struct AlwaysPolicy;

impl SnapshotPolicy for AlwaysPolicy {
    fn should_snapshot(&self, _id: Uuid, _version: i64, _events_since: i64) -> bool {
        true
    }
}

/// Never fires. For tests.
pub struct NeverPolicy;

impl SnapshotPolicy for NeverPolicy {
    fn should_snapshot(&self, _id: Uuid, _version: i64, _events_since: i64) -> bool {
        false
    }
}
