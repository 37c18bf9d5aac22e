//! The Vali execution substrate, assembled from its component crates.
//!
//! Each module here simply re-exports one component crate under its
//! spec component letter, the way the teacher's own `hadron-kernel`
//! crate gathers `hadron_core`, `hadron_mm`, and the rest behind a
//! single top-level namespace. Nothing is implemented in this crate
//! itself beyond the integration tests under `tests/` — those exercise
//! several component crates together the way a real boot sequence
//! would wire them up.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// C1: the process-wide typed handle table.
pub use vali_handle as handle;

/// C2: the per-process memory space manager.
pub use vali_mm as mm;

/// C3/C4: scheduler, futex/wait primitives, thread and context state.
pub use vali_sched as sched;

/// C5: the IPC arena and invoke/listen/reply protocol.
pub use vali_ipc as ipc;

/// C6: the device and driver registry.
pub use vali_devmgr as devmgr;

/// C7: the VFS request engine.
pub use vali_vfs as vfs;

/// C8: the read-only VaFs archive reader.
pub use vali_vafs as vafs;

/// Shared building blocks: ids, the error enum, synchronization
/// primitives and logging macros, used by every other module here.
pub use vali_core as shared;

pub use vali_core::error::{OsError, OsResult};
