//! Process memory-space manager (C2).
//!
//! The teacher's `kernel/mm` crate manages real hardware page tables
//! (PML4 walking via `hadron_core::paging`). That layer is
//! architecture-specific and out of scope here (see `vali-core::addr`'s
//! doc comment). This crate keeps the teacher's *region bookkeeping*
//! style — [`kernel/mm/src/region.rs`]'s bump-plus-coalescing free-list
//! allocator — and generalizes it to track committed/dirty page state
//! and demand-fill callbacks instead of real PTEs, so a memory space can
//! be exercised and tested without a booted kernel.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod attrs;
mod fault;
mod region;
mod space;

pub use attrs::MemAttrs;
pub use fault::PageFaultHandler;
pub use region::VaAllocator;
pub use space::MemorySpace;

pub use vali_core::addr::VirtAddr;
pub use vali_core::error::{OsError, OsResult};
