//! Device and driver registry (C6) for the Vali execution substrate.
//!
//! Stores device records as they are reported (by a bus enumerator, or
//! by a driver discovering children of its own device), matches them
//! against registered driver criteria, and drives the
//! notloaded→loading→available spawn/dispatch state machine §4.6
//! describes. Actually spawning a process and actually delivering a
//! matched device over IPC are both seams — [`DriverSpawner`] and
//! [`DriverChannel`] — left for a caller to back with real
//! implementations.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod device;
pub mod driver;
pub mod manager;

pub use device::{Device, DeviceDescriptor, DeviceKind};
pub use driver::{DriverMatch, DriverRecord, DriverState};
pub use manager::{BusIoctl, DeviceManager, DriverChannel, DriverSpawner, IoctlTarget, RegisterFlags};

pub use vali_core::error::{OsError, OsResult};
