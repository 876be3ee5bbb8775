//! Sliding-window accumulator of vertical ascent.
//!
//! Each ascent is recorded as `(timestamp, amount)`. Two removal paths act on
//! the same window from opposite ends:
//! - **Expiry** drops records older than the window, oldest first.
//! - **Consume** (descent) removes magnitude from the most recent record
//!   backwards, partially decrementing the last one it touches.
//!
//! So a quick climb followed by a drop is forgiven first, while old ascent
//! still ages out on its own.
//!
//! The window lives behind a [`RwLock`]: the sampler is the only writer,
//! inspection and persistence readers take read locks.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use abyss_core::types::Timestamp;

/// One recorded ascent.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RiseRecord {
    pub at: Timestamp,
    /// Always `> 0` while the record is in the window.
    pub amount: f64,
}

#[derive(Debug, Default)]
struct Window {
    records: VecDeque<RiseRecord>,
    total: f64,
    span: Duration,
}

impl Window {
    /// Drop records strictly older than `now - span`.
    fn purge(&mut self, now: Timestamp) {
        let cutoff = now.saturating_sub(self.span);
        while let Some(front) = self.records.front() {
            if front.at >= cutoff {
                break;
            }
            self.total -= front.amount;
            self.records.pop_front();
        }
        self.normalize();
    }

    /// Clamp float drift: empty window means exactly zero, never negative.
    fn normalize(&mut self) {
        if self.records.is_empty() || self.total < 0.0 {
            self.total = if self.records.is_empty() {
                0.0
            } else {
                self.records.iter().map(|r| r.amount).sum()
            };
        }
    }
}

/// Per-entity sliding-window sum of ascent.
#[derive(Debug)]
pub struct RiseAccumulator {
    window: RwLock<Window>,
}

impl RiseAccumulator {
    /// Create an empty accumulator forgetting ascent after `span`.
    pub fn new(span: Duration) -> Self {
        Self {
            window: RwLock::new(Window { span, ..Window::default() }),
        }
    }

    /// Record an ascent of `delta` at `now`. Non-positive deltas are ignored;
    /// jitter filtering is the caller's job.
    pub fn add_rise(&self, now: Timestamp, delta: f64) {
        if !(delta > 0.0) {
            return;
        }
        let mut w = self.window.write();
        w.records.push_back(RiseRecord { at: now, amount: delta });
        w.total += delta;
    }

    /// Remove up to `delta` of ascent, newest records first.
    ///
    /// Expired records are purged first so a descent never pays off ascent
    /// that had already aged out. Returns the amount actually removed,
    /// `min(delta, total)`.
    pub fn consume(&self, now: Timestamp, delta: f64) -> f64 {
        let mut w = self.window.write();
        w.purge(now);
        if !(delta > 0.0) {
            return 0.0;
        }

        let mut remaining = delta;
        while remaining > 0.0 {
            let Some(last) = w.records.back_mut() else {
                break;
            };
            if last.amount <= remaining {
                remaining -= last.amount;
                w.records.pop_back();
            } else {
                last.amount -= remaining;
                remaining = 0.0;
            }
        }

        let removed = delta - remaining;
        w.total -= removed;
        w.normalize();
        removed
    }

    /// Current total after purging expired records.
    pub fn total(&self, now: Timestamp) -> f64 {
        let mut w = self.window.write();
        w.purge(now);
        w.total
    }

    /// Total without purging. Readers that must not mutate use this.
    pub fn peek_total(&self) -> f64 {
        self.window.read().total
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut w = self.window.write();
        w.records.clear();
        w.total = 0.0;
    }

    /// Copy of the live records, oldest first.
    pub fn records(&self) -> Vec<RiseRecord> {
        self.window.read().records.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.window.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.read().records.is_empty()
    }

    pub fn span(&self) -> Duration {
        self.window.read().span
    }

    /// Change the window length. Takes effect at the next purge.
    pub fn set_span(&self, span: Duration) {
        self.window.write().span = span;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(20 * 60);

    fn t(secs: u64) -> Timestamp {
        Timestamp(1_000_000 + secs * 1_000)
    }

    fn acc() -> RiseAccumulator {
        RiseAccumulator::new(WINDOW)
    }

    #[test]
    fn add_accumulates() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        a.add_rise(t(1), 1.05);
        assert!((a.total(t(2)) - 2.05).abs() < 1e-9);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn add_ignores_non_positive() {
        let a = acc();
        a.add_rise(t(0), 0.0);
        a.add_rise(t(0), -3.0);
        a.add_rise(t(0), f64::NAN);
        assert!(a.is_empty());
        assert_eq!(a.total(t(0)), 0.0);
    }

    #[test]
    fn consume_is_newest_first() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        a.add_rise(t(10), 1.0);
        let removed = a.consume(t(11), 1.0);
        assert_eq!(removed, 1.0);
        assert_eq!(a.total(t(11)), 1.0);
        assert_eq!(a.records(), vec![RiseRecord { at: t(0), amount: 1.0 }]);
    }

    #[test]
    fn consume_partially_decrements() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        a.add_rise(t(1), 2.0);
        a.consume(t(2), 2.5);
        let records = a.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].at, t(0));
        assert!((records[0].amount - 0.5).abs() < 1e-9);
        assert!((a.total(t(2)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn consume_more_than_total_floors_at_zero() {
        let a = acc();
        a.add_rise(t(0), 0.75);
        let removed = a.consume(t(1), 10.0);
        assert!((removed - 0.75).abs() < 1e-9);
        assert_eq!(a.total(t(1)), 0.0);
        assert!(a.is_empty());
    }

    #[test]
    fn consume_on_empty_is_noop() {
        let a = acc();
        assert_eq!(a.consume(t(0), 1.0), 0.0);
        assert_eq!(a.total(t(0)), 0.0);
    }

    #[test]
    fn expiry_is_oldest_first() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        let fresh = t(0).saturating_add(WINDOW);
        a.add_rise(fresh, 1.0);
        // The first record is exactly window-old: still kept.
        assert_eq!(a.total(fresh), 2.0);
        // One millisecond later it ages out, the recent one stays.
        let later = Timestamp(fresh.0 + 1);
        assert_eq!(a.total(later), 1.0);
        assert_eq!(a.records(), vec![RiseRecord { at: fresh, amount: 1.0 }]);
    }

    #[test]
    fn consume_purges_before_removing() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        let late = t(0).saturating_add(WINDOW + Duration::from_secs(1));
        a.add_rise(late, 0.5);
        // Without the purge this would eat into the stale record.
        let removed = a.consume(late, 1.0);
        assert_eq!(removed, 0.5);
        assert_eq!(a.total(late), 0.0);
    }

    #[test]
    fn clear_resets() {
        let a = acc();
        a.add_rise(t(0), 3.0);
        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.total(t(0)), 0.0);
        assert_eq!(a.peek_total(), 0.0);
    }

    #[test]
    fn shrinking_span_expires_on_next_read() {
        let a = acc();
        a.add_rise(t(0), 1.0);
        a.set_span(Duration::from_secs(5));
        assert_eq!(a.span(), Duration::from_secs(5));
        assert_eq!(a.total(t(10)), 0.0);
    }

    #[test]
    fn readers_see_consistent_snapshot_while_writer_runs() {
        use std::sync::Arc;
        let a = Arc::new(acc());
        let reader = {
            let a = Arc::clone(&a);
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    let records = a.records();
                    assert!(records.iter().all(|r| r.amount > 0.0));
                }
            })
        };
        for i in 0..1_000 {
            a.add_rise(t(i), 0.5);
            a.consume(t(i), 0.25);
        }
        reader.join().unwrap();
        assert!((a.total(t(1_000)) - 250.0).abs() < 1e-6);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u64, f64),
        Consume(u64, f64),
        Total(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..120, 0.01f64..5.0).prop_map(|(dt, d)| Op::Add(dt, d)),
            (0u64..120, 0.01f64..5.0).prop_map(|(dt, d)| Op::Consume(dt, d)),
            (0u64..600).prop_map(Op::Total),
        ]
    }

    proptest! {
        #[test]
        fn total_never_negative_and_matches_records(ops in prop::collection::vec(op(), 1..200)) {
            let a = RiseAccumulator::new(Duration::from_secs(300));
            let mut now = t(0);
            for op in ops {
                match op {
                    Op::Add(dt, d) => { now = now.saturating_add(Duration::from_secs(dt)); a.add_rise(now, d); }
                    Op::Consume(dt, d) => { now = now.saturating_add(Duration::from_secs(dt)); a.consume(now, d); }
                    Op::Total(dt) => { now = now.saturating_add(Duration::from_secs(dt)); }
                }
                let total = a.total(now);
                prop_assert!(total >= 0.0);
                let sum: f64 = a.records().iter().map(|r| r.amount).sum();
                prop_assert!((total - sum).abs() < 1e-6, "total {} != sum {}", total, sum);
                prop_assert!(a.records().iter().all(|r| r.amount > 0.0));
            }
        }

        #[test]
        fn total_is_idempotent(adds in prop::collection::vec((0u64..60, 0.01f64..3.0), 0..50), offset in 0u64..5_000) {
            let a = RiseAccumulator::new(Duration::from_secs(600));
            let mut now = t(0);
            for (dt, d) in adds {
                now = now.saturating_add(Duration::from_secs(dt));
                a.add_rise(now, d);
            }
            let at = now.saturating_add(Duration::from_secs(offset));
            let first = a.total(at);
            let second = a.total(at);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn consume_removes_min_of_delta_and_total(amounts in prop::collection::vec(0.01f64..3.0, 1..20), delta in 0.01f64..40.0) {
            let a = acc();
            for (i, amount) in amounts.iter().enumerate() {
                a.add_rise(t(i as u64), *amount);
            }
            let now = t(amounts.len() as u64);
            let before = a.total(now);
            let removed = a.consume(now, delta);
            prop_assert!((removed - delta.min(before)).abs() < 1e-9);
            prop_assert!((a.total(now) - (before - removed).max(0.0)).abs() < 1e-6);
        }
    }
}
