//! Delayed-task queue for the analysis event loop.
//!
//! A min-heap of `(due, sequence)` keys. The sequence number breaks ties so
//! tasks due at the same instant run in the order they were scheduled. The
//! scheduler never sleeps by itself; the owner asks for [`Scheduler::next_due`],
//! waits until then, and drains [`Scheduler::pop_due`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<T> {
    due: Instant,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed: BinaryHeap is a max-heap, the earliest entry must be on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of tasks keyed by due time.
pub struct Scheduler<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> Scheduler<T> {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run at `due`.
    pub fn schedule_at(&mut self, due: Instant, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { due, seq, task });
    }

    /// Schedule `task` to run `delay` after `now`.
    pub fn schedule_after(&mut self, now: Instant, delay: Duration, task: T) {
        self.schedule_at(now + delay, task);
    }

    /// Due time of the earliest task.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    /// Remove and return the earliest task if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<T> {
        if self.heap.peek()?.due <= now {
            self.heap.pop().map(|e| e.task)
        } else {
            None
        }
    }

    /// Pending task count.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order() {
        let now = Instant::now();
        let mut s = Scheduler::new();
        s.schedule_after(now, Duration::from_secs(3), "c");
        s.schedule_after(now, Duration::from_secs(1), "a");
        s.schedule_after(now, Duration::from_secs(2), "b");

        assert_eq!(s.next_due(), Some(now + Duration::from_secs(1)));
        let later = now + Duration::from_secs(5);
        assert_eq!(s.pop_due(later), Some("a"));
        assert_eq!(s.pop_due(later), Some("b"));
        assert_eq!(s.pop_due(later), Some("c"));
        assert_eq!(s.pop_due(later), None);
    }

    #[test]
    fn ties_run_fifo() {
        let now = Instant::now();
        let mut s = Scheduler::new();
        for task in 0..10 {
            s.schedule_at(now, task);
        }
        let order: Vec<_> = std::iter::from_fn(|| s.pop_due(now)).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn future_tasks_are_not_popped() {
        let now = Instant::now();
        let mut s = Scheduler::new();
        s.schedule_after(now, Duration::from_millis(10), ());
        assert_eq!(s.pop_due(now), None);
        assert_eq!(s.len(), 1);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.next_due(), None);
    }
}
