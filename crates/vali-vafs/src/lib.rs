//! Read-only VaFs archive reader (C8) for the Vali execution substrate.
//!
//! VaFs is the content-addressed directory/file archive format used as
//! the kernel's initial ram disk (§4.8, §6). This crate only reads it —
//! "The reader is strictly read-only; attempts to write fail with
//! *not-supported*" — mirroring `original_source/tools/rd/libvafs`'s
//! read/write split (`vafs_open_file`/`vafs_open_memory` vs.
//! `vafs_create`) by simply never implementing the create half. The
//! archive-creation *tool* itself is out of scope per §1.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod directory;
mod entry;
mod feature;
mod file;
mod guid;
mod header;
mod image;
#[cfg(test)]
mod testutil;

pub use directory::{DirEntry, DirectoryHandle};
pub use entry::EntryType;
pub use feature::FilterOps;
pub use guid::{Guid, FILTER_FEATURE_GUID};
pub use header::{Architecture, Header};
pub use image::VaFsImage;

pub use vali_core::error::{OsError, OsResult};
