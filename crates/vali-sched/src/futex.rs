//! Futex wait/wake primitive underlying [`crate::Mutex`] and
//! [`crate::Condvar`].
//!
//! Grounded on `original_source/librt/libos/threads/mutex.c`'s use of
//! the kernel `Futex()` syscall: callers wait on a 32-bit word for as
//! long as it still holds an expected value, and a waker flips the word
//! and wakes parked threads. This module is the in-kernel side of that
//! syscall — it hashes the word's address into one of a fixed number of
//! [`WaitQueue`](crate::waitqueue::WaitQueue) buckets, the same
//! small-table trick `handles.c` uses instead of a wait queue per
//! object.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use vali_core::config::{FUTEX_BUCKET_COUNT, MAX_WAITERS_PER_QUEUE};
use vali_core::error::OsResult;
use vali_core::id::ThreadId;

use crate::waitqueue::WaitQueue;

/// A table of futex wait queues, hashed by word address.
pub struct FutexTable {
    buckets: [WaitQueue<MAX_WAITERS_PER_QUEUE>; FUTEX_BUCKET_COUNT],
}

fn bucket_index(word: &AtomicU32) -> usize {
    let addr = (word as *const AtomicU32) as usize;
    (addr >> 2) % FUTEX_BUCKET_COUNT
}

impl FutexTable {
    /// Creates an empty futex table.
    #[must_use]
    pub const fn new() -> Self {
        const INIT: WaitQueue<MAX_WAITERS_PER_QUEUE> = WaitQueue::new();
        Self {
            buckets: [INIT; FUTEX_BUCKET_COUNT],
        }
    }

    /// Registers `thread` as waiting on `word`, then blocks it as long
    /// as `word` still equals `expected`, for up to `timeout`.
    ///
    /// Returns [`OsError::Timeout`](vali_core::error::OsError::Timeout)
    /// if `timeout` elapses first. The caller must recheck whatever
    /// condition `word` represents after this returns — spurious
    /// wakeups are possible, matching real futex semantics.
    pub fn wait(
        &self,
        word: &AtomicU32,
        expected: u32,
        thread: ThreadId,
        timeout: Option<Duration>,
    ) -> OsResult<()> {
        let bucket = &self.buckets[bucket_index(word)];
        bucket.park_while(thread, || word.load(Ordering::SeqCst) == expected, timeout)
    }

    /// Wakes up to `count` threads waiting on `word`, returning how
    /// many were woken.
    pub fn wake(&self, word: &AtomicU32, count: u32) -> u32 {
        self.buckets[bucket_index(word)].wake_n(count)
    }
}

impl Default for FutexTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::park;
    use crate::park::test_support::StdParkBackend;
    use std::sync::Arc;
    use std::thread;
    use vali_core::error::OsError;

    fn install_backend() -> &'static StdParkBackend {
        static BACKEND: std::sync::OnceLock<StdParkBackend> = std::sync::OnceLock::new();
        let backend = BACKEND.get_or_init(StdParkBackend::new);
        park::init(backend);
        backend
    }

    #[test]
    fn wait_returns_immediately_if_value_already_changed() {
        let backend = install_backend();
        backend.register_current(ThreadId::new(1));
        let table = FutexTable::new();
        let word = AtomicU32::new(5);
        table
            .wait(&word, 99, ThreadId::new(1), Some(Duration::from_millis(10)))
            .unwrap();
    }

    #[test]
    fn wake_unparks_waiting_thread() {
        let backend = install_backend();
        let table = Arc::new(FutexTable::new());
        let word = Arc::new(AtomicU32::new(0));

        let t_table = table.clone();
        let t_word = word.clone();
        let waiter = thread::spawn(move || {
            backend.register_current(ThreadId::new(2));
            t_table
                .wait(&t_word, 0, ThreadId::new(2), Some(Duration::from_secs(5)))
                .unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        word.store(1, Ordering::SeqCst);
        table.wake(&word, 1);

        waiter.join().unwrap();
    }

    #[test]
    fn wait_times_out_when_never_woken() {
        let backend = install_backend();
        backend.register_current(ThreadId::new(3));
        let table = FutexTable::new();
        let word = AtomicU32::new(0);
        let start = std::time::Instant::now();
        let result = table.wait(&word, 0, ThreadId::new(3), Some(Duration::from_millis(50)));
        assert_eq!(result, Err(OsError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
