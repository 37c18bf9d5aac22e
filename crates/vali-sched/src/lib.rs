//! Scheduler, futex/wait primitives, and thread/context management
//! (C3/C4) for the Vali execution substrate.
//!
//! Splits into the per-CPU ready-queue layer (`ready_queue`), the
//! blocking-primitive stack built on a single futex abstraction
//! (`futex`, `mutex`, `condvar`, `waitqueue`), and the thread/context
//! layer (`thread`, `context`, `stack`, `tls`) that owns the state
//! those primitives operate on. `park` is the seam between the
//! blocking primitives and whatever real context-switch mechanism a
//! host provides; see its doc comment.
//!
//! Like `vali-mm`, real architecture-level context switching (actually
//! reloading a CPU's registers and jumping) is out of scope per §1 —
//! this crate owns the data layout and the invariants around it
//! (recursive-mutex bit packing, interceptor push/pop, TLS destructor
//! draining), exercised here against [`park::test_support::StdParkBackend`]
//! rather than real hardware.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod condvar;
pub mod context;
pub mod futex;
pub mod mutex;
pub mod park;
pub mod ready_queue;
pub mod stack;
pub mod thread;
pub mod tls;
mod waitqueue;

pub use condvar::Condvar;
pub use context::{push_interceptor, pop_interceptor, Context, ContextLevel};
pub use futex::FutexTable;
pub use mutex::{Mutex, MutexGuard};
pub use park::ParkBackend;
pub use ready_queue::{Priority, ReadyQueue};
pub use stack::Stack;
pub use thread::{Thread, ThreadState};
pub use tls::{TlsDestructor, TlsTable};

pub use vali_core::error::{OsError, OsResult};
