//! Process-wide typed handle table (C1).
//!
//! Grounded on `examples/original_source/librt/libos/handles.c`: a
//! single hash table (`g_osHandles`) guarded by one spinlock
//! (`g_osHandlesLock`), a fixed per-type operations table
//! (`g_osHandlers[__OSHANDLE_COUNT]`), and an `OSHandle` record carrying
//! `{ID, Type, Flags, Payload}` plus a process-local reference count.
//! spec.md §3/§4.1 describe the same shape in the abstract; this crate
//! implements it.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod ops;
mod table;

pub use ops::{HandleOps, HandlePayload};
pub use table::{HandleEntryView, HandleFlags, HandleTable, HandleType};

pub use vali_core::error::{OsError, OsResult};
pub use vali_core::id::HandleId;
