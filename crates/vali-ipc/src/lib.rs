//! Fixed-layout IPC arena and invoke/listen/reply protocol (C5) for the
//! Vali execution substrate.
//!
//! One [`IpcArena`] per thread (or RPC endpoint) holds a single
//! in-flight message: typed words, untyped argument descriptors, an
//! inline payload buffer and a response area, gated by three futex
//! words exactly as §4.5 lays out. Real zero-copy delivery of large
//! untyped arguments goes through [`Mapper`], a seam a caller backs with
//! `vali_mm::MemorySpace::clone_mapping` — this crate has no dependency
//! on `vali-mm` itself, the same way `vali-mm`'s own `PageFaultHandler`
//! keeps file-backed paging out of its dependency graph.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod arena;
pub mod message;

pub use arena::{InvokeFlags, IpcArena, Mapper, Session, INLINE_BUFFER_SIZE, RESPONSE_BUFFER_SIZE};
pub use message::{MessageView, UntypedArg, MAX_TYPED_ARGS, MAX_UNTYPED_ARGS};

pub use vali_core::error::{OsError, OsResult};
