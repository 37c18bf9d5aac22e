//! Per-CPU ready queue (§4.3): "Each CPU has its own ready queue and
//! idle thread."
//!
//! Adapted from the teacher's `hadron_core::sched::ReadyQueues`
//! (`crates/core/hadron-core/src/sched.rs`), retargeted from `TaskId` to
//! [`ThreadId`]. The starvation-prevention counter and the work-stealing
//! one-task rule are kept verbatim — spec.md doesn't mandate a
//! particular fairness policy beyond cooperative time-slicing, and this
//! is the teacher's answer to the same problem.

extern crate alloc;

use alloc::collections::VecDeque;

use vali_core::id::ThreadId;

/// How many consecutive Normal pops before Background is forced to run
/// once, provided it has work.
const BACKGROUND_STARVATION_LIMIT: u64 = 100;

/// Priority tier a ready thread is scheduled under.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Interrupt bottom-halves and other latency-critical work.
    Critical = 0,
    /// Ordinary user and kernel threads.
    Normal = 1,
    /// Housekeeping that should only run when nothing else wants the
    /// CPU.
    Background = 2,
}

impl Priority {
    /// Number of priority tiers.
    pub const COUNT: usize = 3;
}

/// A single CPU's priority-tiered ready queue.
pub struct ReadyQueue {
    queues: [VecDeque<ThreadId>; Priority::COUNT],
    normal_streak: u64,
}

impl ReadyQueue {
    /// Creates an empty ready queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            normal_streak: 0,
        }
    }

    /// Enqueues `thread` at the back of its priority tier.
    pub fn push(&mut self, priority: Priority, thread: ThreadId) {
        self.queues[priority as usize].push_back(thread);
    }

    /// Dequeues the next thread to run.
    ///
    /// Critical always drains first. Between Normal and Background,
    /// Normal runs until it has been picked
    /// [`BACKGROUND_STARVATION_LIMIT`] times in a row with Background
    /// still waiting, at which point one Background thread is forced in
    /// to avoid starving it.
    pub fn pop(&mut self) -> Option<(Priority, ThreadId)> {
        if let Some(thread) = self.queues[Priority::Critical as usize].pop_front() {
            self.normal_streak = 0;
            return Some((Priority::Critical, thread));
        }

        let has_background = !self.queues[Priority::Background as usize].is_empty();
        let has_normal = !self.queues[Priority::Normal as usize].is_empty();

        if has_normal && has_background && self.normal_streak >= BACKGROUND_STARVATION_LIMIT {
            self.normal_streak = 0;
            if let Some(thread) = self.queues[Priority::Background as usize].pop_front() {
                return Some((Priority::Background, thread));
            }
        }

        if let Some(thread) = self.queues[Priority::Normal as usize].pop_front() {
            if has_background {
                self.normal_streak += 1;
            } else {
                self.normal_streak = 0;
            }
            return Some((Priority::Normal, thread));
        }

        self.normal_streak = 0;
        self.queues[Priority::Background as usize]
            .pop_front()
            .map(|thread| (Priority::Background, thread))
    }

    /// Returns `true` if any tier has a runnable thread.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    /// Steals one Normal-or-Background thread from the back of this
    /// queue for another CPU, or `None` if stealing would leave this
    /// queue with nothing to run.
    ///
    /// Never steals Critical work, and never steals this queue's only
    /// stealable thread — taking the last one would bounce it back and
    /// forth between idle CPUs without either making progress.
    pub fn steal_one(&mut self) -> Option<(Priority, ThreadId)> {
        let stealable = self.queues[Priority::Normal as usize].len()
            + self.queues[Priority::Background as usize].len();
        if stealable <= 1 {
            return None;
        }

        if let Some(thread) = self.queues[Priority::Normal as usize].pop_back() {
            return Some((Priority::Normal, thread));
        }
        self.queues[Priority::Background as usize]
            .pop_back()
            .map(|thread| (Priority::Background, thread))
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_on_creation() {
        let mut rq = ReadyQueue::new();
        assert!(!rq.has_ready());
        assert_eq!(rq.pop(), None);
    }

    #[test]
    fn critical_always_first() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Normal, ThreadId::new(1));
        rq.push(Priority::Critical, ThreadId::new(2));
        rq.push(Priority::Background, ThreadId::new(3));

        assert_eq!(rq.pop(), Some((Priority::Critical, ThreadId::new(2))));
        assert_eq!(rq.pop(), Some((Priority::Normal, ThreadId::new(1))));
        assert_eq!(rq.pop(), Some((Priority::Background, ThreadId::new(3))));
        assert_eq!(rq.pop(), None);
    }

    #[test]
    fn fifo_within_priority() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Normal, ThreadId::new(1));
        rq.push(Priority::Normal, ThreadId::new(2));
        rq.push(Priority::Normal, ThreadId::new(3));

        assert_eq!(rq.pop(), Some((Priority::Normal, ThreadId::new(1))));
        assert_eq!(rq.pop(), Some((Priority::Normal, ThreadId::new(2))));
        assert_eq!(rq.pop(), Some((Priority::Normal, ThreadId::new(3))));
    }

    #[test]
    fn background_starves_without_limit() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Background, ThreadId::new(99));
        for i in 0..50 {
            rq.push(Priority::Normal, ThreadId::new(i));
        }
        for i in 0..50 {
            assert_eq!(rq.pop(), Some((Priority::Normal, ThreadId::new(i))));
        }
        assert_eq!(rq.pop(), Some((Priority::Background, ThreadId::new(99))));
    }

    #[test]
    fn background_forced_in_after_starvation_limit() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Background, ThreadId::new(99));
        for i in 0..(BACKGROUND_STARVATION_LIMIT as u32 + 10) {
            rq.push(Priority::Normal, ThreadId::new(i));
        }

        let mut saw_background_before_normal_drained = false;
        for _ in 0..(BACKGROUND_STARVATION_LIMIT as u32 + 10) {
            if let Some((Priority::Background, _)) = rq.pop() {
                saw_background_before_normal_drained = true;
                break;
            }
        }
        assert!(saw_background_before_normal_drained);
    }

    #[test]
    fn steal_one_refuses_to_take_the_only_task() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Normal, ThreadId::new(1));
        assert_eq!(rq.steal_one(), None);
    }

    #[test]
    fn steal_one_prefers_normal_from_the_back() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Normal, ThreadId::new(1));
        rq.push(Priority::Normal, ThreadId::new(2));
        assert_eq!(rq.steal_one(), Some((Priority::Normal, ThreadId::new(2))));
    }

    #[test]
    fn steal_one_never_takes_critical() {
        let mut rq = ReadyQueue::new();
        rq.push(Priority::Critical, ThreadId::new(1));
        rq.push(Priority::Background, ThreadId::new(2));
        assert_eq!(rq.steal_one(), None);
    }
}
