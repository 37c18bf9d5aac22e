//! Shared building blocks for the Vali execution substrate.
//!
//! This crate contains the host-testable pieces every other component
//! crate (`vali-handle`, `vali-mm`, `vali-sched`, `vali-ipc`,
//! `vali-devmgr`, `vali-vfs`, `vali-vafs`) depends on: type-safe
//! resource identifiers, the closed error enum from the error-handling
//! design, spinlocks and wait queues, the logging macro family, and a
//! few crate-wide tunable constants.
//!
//! Like the rest of the workspace, it is `no_std` outside of tests so it
//! can eventually be linked into a kernel image without pulling in `std`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod addr;
pub mod cell;
pub mod config;
pub mod error;
pub mod id;
#[macro_use]
pub mod log;
pub mod static_assert;
pub mod sync;
