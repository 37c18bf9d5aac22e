//! Crate-wide tunable constants.
//!
//! spec.md leaves several thresholds as "e.g." values; this module
//! centralizes them as `const`s the way the teacher centralizes
//! `KERNEL_STACK_SIZE`/`GUARD_PAGE_SIZE` (`kernel/mm/src/vmm.rs`) and
//! `PIPE_BUF_SIZE`/`MAX_WAITERS` (`kernel/hadron-kernel/src/ipc/pipe.rs`,
//! `crates/core/hadron-core/src/sync/waitqueue.rs`) instead of exposing
//! them as runtime configuration.

/// IPC untyped-argument inline threshold (§4.5 step 3): arguments at or
/// under this size are copied into the arena's inline buffer; larger
/// ones are clone-mapped.
pub const IPC_INLINE_THRESHOLD: usize = 512;

/// Mutex uncontended spin attempts before parking on the futex word,
/// taken verbatim from `original_source/librt/libos/threads/mutex.c`'s
/// `MUTEX_SPINS`.
pub const MUTEX_SPINS: u32 = 1000;

/// Maximum recursive-lock depth before a recursive mutex aborts, bounded
/// by the 8-bit recursion-count field in the packed mutex state (§4.3).
pub const MUTEX_MAX_RECURSION: u8 = u8::MAX;

/// Maximum thread-local storage slots per thread (§4.3/§3).
pub const TLS_MAX_SLOTS: usize = 64;

/// Maximum passes over TLS destructors at thread exit, to drain
/// destructors that reassign other slots (§4.3).
pub const TLS_MAX_DESTRUCTOR_PASSES: u8 = 4;

/// Maximum waiters tracked per futex hash bucket / wait queue, mirroring
/// the teacher's `MAX_WAITERS` bound in `WaitQueue`/`Condvar`.
pub const MAX_WAITERS_PER_QUEUE: usize = 64;

/// Number of buckets in the futex hash table (§4.3).
pub const FUTEX_BUCKET_COUNT: usize = 256;
