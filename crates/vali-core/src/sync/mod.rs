//! Synchronization primitives shared by every component crate.
//!
//! Provides [`SpinLock`], usable before any allocator or scheduler is
//! available and suitable for placement in `static` items, matching the
//! teacher's `hadron_core::sync::SpinLock`. The blocking primitives that
//! build on top of a real wait/wake mechanism (futex, mutex, condition
//! variable, TLS) live in `vali-sched` instead of here, because they
//! need a scheduler to park on — this crate only provides the
//! lock-free/spin-based exclusion every subsystem's internal data
//! structures use directly (handle table, device registry, filesystem
//! mount table, …).

mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
