//! The IPC arena itself (§4.5): one producer/consumer mailbox with a
//! fixed inline buffer and response area, gated by three futex words.
//!
//! Grounded on `kernel/hadron-kernel/src/ipc/pipe.rs`'s
//! `PipeInner`/`CircularBuffer` shape — a `SpinLock`-guarded payload
//! plus wait queues either side of it — generalized from a byte stream
//! to the typed/untyped record §4.5 describes, and on
//! `original_source/kernel/process/system_calls/ipc_calls.c`'s
//! `ScRpcExecute`/`ScRpcResponse`, which drive a caller's request
//! through a target process's pipe and back through a response buffer
//! rather than a return value.
//!
//! Unlike `pipe.rs`, synchronization here is three raw futex words
//! (`write_sync`, `read_sync`, `response_sync`) rather than a
//! [`vali_sched::waitqueue`]-per-direction design, matching the literal
//! handshake §4.5 specifies so `invoke`/`listen`/`reply` can be modelled
//! against [`vali_sched::FutexTable`] directly.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use bitflags::bitflags;
use planck_noalloc::vec::ArrayVec;

use vali_core::error::{OsError, OsResult};
use vali_core::id::ThreadId;
use vali_core::sync::{SpinLock, SpinLockGuard};

use vali_sched::FutexTable;

use crate::message::{MessageView, UntypedArg, MAX_TYPED_ARGS, MAX_UNTYPED_ARGS};

/// Bytes available in one arena's inline payload buffer. Four times
/// [`vali_core::config::IPC_INLINE_THRESHOLD`] so a full complement of
/// [`MAX_UNTYPED_ARGS`] threshold-sized arguments still fits inline.
pub const INLINE_BUFFER_SIZE: usize = vali_core::config::IPC_INLINE_THRESHOLD * 4;

/// Bytes available in one arena's response buffer.
pub const RESPONSE_BUFFER_SIZE: usize = 512;

bitflags! {
    /// Per-invocation flags (§4.5 step 5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InvokeFlags: u32 {
        /// Caller does not wait for a reply; `invoke` returns as soon
        /// as the message lands.
        const ASYNC = 1 << 0;
        /// Target is not expected to reply at all; every untyped
        /// argument is forced inline regardless of size, since there is
        /// no reply step to tear a clone-map down after.
        const NO_RESPONSE = 1 << 1;
    }
}

/// Performs the clone-mapping half of an untyped argument that is too
/// large to inline (§4.5 step 3, §4.2). `invoke` never reaches into a
/// memory space directly — a caller that wants oversized arguments
/// clone-mapped rather than rejected supplies one of these; pass `None`
/// to force every argument inline.
pub trait Mapper {
    /// Clone-maps `data` read-only into the target address space and
    /// returns the mapped virtual address, or
    /// [`OsError::OutOfMemory`] if the space has no room.
    fn clone_map(&self, data: &[u8]) -> OsResult<u64>;

    /// Releases a mapping previously returned by [`clone_map`](Self::clone_map),
    /// run after a reply lands or a failed invocation unwinds.
    fn unmap(&self, addr: u64);
}

struct Mailbox {
    sender: ThreadId,
    typed: ArrayVec<u64, MAX_TYPED_ARGS>,
    untyped: ArrayVec<UntypedArg, MAX_UNTYPED_ARGS>,
    inline: [u8; INLINE_BUFFER_SIZE],
    inline_len: usize,
    mapped: ArrayVec<u64, MAX_UNTYPED_ARGS>,
    response: [u8; RESPONSE_BUFFER_SIZE],
    response_len: usize,
}

impl Mailbox {
    fn empty() -> Self {
        Self {
            sender: ThreadId::new(0),
            typed: ArrayVec::new(),
            untyped: ArrayVec::new(),
            inline: [0u8; INLINE_BUFFER_SIZE],
            inline_len: 0,
            mapped: ArrayVec::new(),
            response: [0u8; RESPONSE_BUFFER_SIZE],
            response_len: 0,
        }
    }
}

/// One IPC arena: a thread's (or endpoint's) invoke/listen/reply
/// mailbox, per §4.5.
pub struct IpcArena {
    write_sync: AtomicU32,
    read_sync: AtomicU32,
    response_sync: AtomicU32,
    mailbox: SpinLock<Mailbox>,
}

impl IpcArena {
    /// Creates an arena with `write_sync` available (0) and nothing
    /// pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            write_sync: AtomicU32::new(0),
            read_sync: AtomicU32::new(0),
            response_sync: AtomicU32::new(0),
            mailbox: SpinLock::new(Mailbox::empty()),
        }
    }

    /// Invokes this arena (§4.5 "Invoke (caller side)"): acquires
    /// `write_sync`, fills typed and untyped arguments, hands the
    /// message to the target, then — unless `flags` says otherwise —
    /// waits for a reply and copies it into `response_out`, returning
    /// the number of bytes written.
    ///
    /// `mapper` is consulted for any untyped argument over
    /// [`vali_core::config::IPC_INLINE_THRESHOLD`] bytes; pass `None` to
    /// force every argument inline (oversized arguments then fail with
    /// [`OsError::NotSupported`]).
    ///
    /// On any failure, partial state (an acquired `write_sync`, mappings
    /// already made for earlier arguments) is rolled back before
    /// returning, per §4.5's error-conditions note.
    #[allow(clippy::too_many_arguments)]
    pub fn invoke(
        &self,
        futex: &FutexTable,
        thread: ThreadId,
        sender: ThreadId,
        typed: &[u64],
        untyped: &[&[u8]],
        mapper: Option<&dyn Mapper>,
        flags: InvokeFlags,
        timeout: Option<Duration>,
        response_out: &mut [u8],
    ) -> OsResult<usize> {
        if typed.len() > MAX_TYPED_ARGS || untyped.len() > MAX_UNTYPED_ARGS {
            return Err(OsError::InvalidParams);
        }

        self.acquire_write(futex, thread, timeout)?;

        if let Err(e) = self.fill_and_signal(futex, sender, typed, untyped, mapper, flags) {
            self.release_write(futex);
            return Err(e);
        }

        if flags.intersects(InvokeFlags::ASYNC | InvokeFlags::NO_RESPONSE) {
            return Ok(0);
        }

        match self.await_response(futex, thread, timeout, response_out) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.teardown_mappings(mapper);
                self.release_write(futex);
                Err(e)
            }
        }
    }

    fn acquire_write(
        &self,
        futex: &FutexTable,
        thread: ThreadId,
        timeout: Option<Duration>,
    ) -> OsResult<()> {
        loop {
            if self
                .write_sync
                .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
            futex.wait(&self.write_sync, 1, thread, timeout)?;
        }
    }

    fn release_write(&self, futex: &FutexTable) {
        self.write_sync.store(0, Ordering::Release);
        futex.wake(&self.write_sync, 1);
    }

    fn fill_and_signal(
        &self,
        futex: &FutexTable,
        sender: ThreadId,
        typed: &[u64],
        untyped: &[&[u8]],
        mapper: Option<&dyn Mapper>,
        flags: InvokeFlags,
    ) -> OsResult<()> {
        let mut mailbox = self.mailbox.lock();
        mailbox.sender = sender;
        mailbox.typed.clear();
        mailbox.untyped.clear();
        mailbox.mapped.clear();
        mailbox.inline_len = 0;

        for &word in typed {
            mailbox.typed.try_push(word).map_err(|_| OsError::Overflow)?;
        }

        let force_inline = flags.contains(InvokeFlags::NO_RESPONSE);
        for &bytes in untyped {
            let arg = if bytes.len() <= vali_core::config::IPC_INLINE_THRESHOLD || force_inline {
                let start = mailbox.inline_len;
                let end = start
                    .checked_add(bytes.len())
                    .filter(|&end| end <= INLINE_BUFFER_SIZE)
                    .ok_or(OsError::Overflow)?;
                mailbox.inline[start..end].copy_from_slice(bytes);
                mailbox.inline_len = end;
                UntypedArg::Inline {
                    offset: start as u16,
                    len: bytes.len() as u16,
                }
            } else {
                let mapper = mapper.ok_or(OsError::NotSupported)?;
                let addr = mapper.clone_map(bytes)?;
                mailbox.mapped.try_push(addr).map_err(|_| OsError::Overflow)?;
                UntypedArg::Mapped {
                    addr,
                    len: bytes.len() as u32,
                }
            };
            mailbox.untyped.try_push(arg).map_err(|_| OsError::Overflow)?;
        }
        drop(mailbox);

        self.response_sync.store(0, Ordering::Release);
        self.read_sync.store(1, Ordering::Release);
        futex.wake(&self.read_sync, 1);
        Ok(())
    }

    fn await_response(
        &self,
        futex: &FutexTable,
        thread: ThreadId,
        timeout: Option<Duration>,
        response_out: &mut [u8],
    ) -> OsResult<usize> {
        loop {
            if self.response_sync.load(Ordering::Acquire) != 0 {
                break;
            }
            futex.wait(&self.response_sync, 0, thread, timeout)?;
        }
        let mailbox = self.mailbox.lock();
        let n = mailbox.response_len.min(response_out.len());
        response_out[..n].copy_from_slice(&mailbox.response[..n]);
        Ok(n)
    }

    fn teardown_mappings(&self, mapper: Option<&dyn Mapper>) {
        let mut mailbox = self.mailbox.lock();
        if let Some(mapper) = mapper {
            for &addr in mailbox.mapped.as_slice() {
                mapper.unmap(addr);
            }
        }
        mailbox.mapped.clear();
    }

    /// Listens on this arena (§4.5 "Listen (target side)"): releases
    /// `write_sync` for the next producer, then blocks until a message
    /// has landed, returning a [`Session`] holding the mailbox lock over
    /// it.
    ///
    /// Per §4.5's invariant ("the consumer must finish reading the
    /// message before clearing `write_sync`"), the mailbox stays locked
    /// for the lifetime of the returned `Session` — `write_sync` was
    /// already released above, so a new producer can start filling in
    /// the next message's typed slots, but nothing can touch this one's
    /// contents until the `Session` is consumed by
    /// [`Session::reply`](Session::reply) or dropped.
    pub fn listen(
        &self,
        futex: &FutexTable,
        thread: ThreadId,
        timeout: Option<Duration>,
    ) -> OsResult<Session<'_>> {
        self.write_sync.store(0, Ordering::Release);
        futex.wake(&self.write_sync, 1);

        loop {
            if self
                .read_sync
                .compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            futex.wait(&self.read_sync, 0, thread, timeout)?;
        }

        Ok(Session {
            arena: self,
            guard: self.mailbox.lock(),
        })
    }
}

impl Default for IpcArena {
    fn default() -> Self {
        Self::new()
    }
}

/// A message received by [`IpcArena::listen`], holding the arena's
/// mailbox lock until it is replied to or dropped.
pub struct Session<'a> {
    arena: &'a IpcArena,
    guard: SpinLockGuard<'a, Mailbox>,
}

impl<'a> Session<'a> {
    /// A view of the received message.
    #[must_use]
    pub fn view(&self) -> MessageView<'_> {
        MessageView {
            sender: self.guard.sender,
            typed: self.guard.typed.as_slice(),
            untyped: self.guard.untyped.as_slice(),
            inline: &self.guard.inline[..self.guard.inline_len],
        }
    }

    /// Replies to this message (§4.5 "Reply"): copies `bytes` into the
    /// response area (truncated to [`RESPONSE_BUFFER_SIZE`]), tears down
    /// clone-mapped argument buffers via `mapper`, releases the mailbox
    /// lock, then signals `response_sync` and wakes the waiting caller.
    /// Returns the number of bytes actually copied.
    pub fn reply(mut self, futex: &FutexTable, bytes: &[u8], mapper: Option<&dyn Mapper>) -> usize {
        let n = bytes.len().min(RESPONSE_BUFFER_SIZE);
        self.guard.response[..n].copy_from_slice(&bytes[..n]);
        self.guard.response_len = n;
        if let Some(mapper) = mapper {
            for &addr in self.guard.mapped.as_slice() {
                mapper.unmap(addr);
            }
        }
        self.guard.mapped.clear();
        drop(self.guard);

        self.arena.response_sync.store(1, Ordering::Release);
        futex.wake(&self.arena.response_sync, 1);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use vali_sched::park;
    use vali_sched::park::test_support::StdParkBackend;

    fn install_backend() -> &'static StdParkBackend {
        static BACKEND: std::sync::OnceLock<StdParkBackend> = std::sync::OnceLock::new();
        let backend = BACKEND.get_or_init(StdParkBackend::new);
        park::init(backend);
        backend
    }

    #[test]
    fn invoke_and_reply_round_trip_inline_bytes() {
        let backend = install_backend();
        backend.register_current(ThreadId::new(1));
        backend.register_current(ThreadId::new(2));

        let futex = Arc::new(FutexTable::new());
        let arena = Arc::new(IpcArena::new());

        let listen_futex = futex.clone();
        let listen_arena = arena.clone();
        let server = thread::spawn(move || {
            let session = listen_arena
                .listen(&listen_futex, ThreadId::new(2), Some(Duration::from_secs(5)))
                .unwrap();
            let view = session.view();
            assert_eq!(view.typed, &[7]);
            let arg = view.untyped[0];
            assert_eq!(view.inline_bytes(arg), Some(b"hello".as_slice()));
            session.reply(&listen_futex, b"world", None);
        });

        let mut response = [0u8; 16];
        let n = arena
            .invoke(
                &futex,
                ThreadId::new(1),
                ThreadId::new(1),
                &[7],
                &[b"hello"],
                None,
                InvokeFlags::empty(),
                Some(Duration::from_secs(5)),
                &mut response,
            )
            .unwrap();

        server.join().unwrap();
        assert_eq!(&response[..n], b"world");
    }

    #[test]
    fn no_response_invoke_returns_immediately() {
        let backend = install_backend();
        backend.register_current(ThreadId::new(10));
        backend.register_current(ThreadId::new(11));

        let futex = Arc::new(FutexTable::new());
        let arena = Arc::new(IpcArena::new());

        let listen_futex = futex.clone();
        let listen_arena = arena.clone();
        let server = thread::spawn(move || {
            let session = listen_arena
                .listen(&listen_futex, ThreadId::new(11), Some(Duration::from_secs(5)))
                .unwrap();
            assert_eq!(session.view().typed, &[1, 2]);
        });

        let mut response = [0u8; 1];
        let n = arena
            .invoke(
                &futex,
                ThreadId::new(10),
                ThreadId::new(10),
                &[1, 2],
                &[],
                None,
                InvokeFlags::NO_RESPONSE,
                Some(Duration::from_secs(5)),
                &mut response,
            )
            .unwrap();
        assert_eq!(n, 0);

        server.join().unwrap();
    }

    #[test]
    fn oversized_untyped_arg_without_mapper_is_not_supported() {
        let backend = install_backend();
        backend.register_current(ThreadId::new(20));
        let futex = FutexTable::new();
        let arena = IpcArena::new();
        let big = alloc::vec![0u8; vali_core::config::IPC_INLINE_THRESHOLD + 1];
        let mut response = [0u8; 1];
        let err = arena
            .invoke(
                &futex,
                ThreadId::new(20),
                ThreadId::new(20),
                &[],
                &[&big],
                None,
                InvokeFlags::empty(),
                Some(Duration::from_millis(10)),
                &mut response,
            )
            .unwrap_err();
        assert_eq!(err, OsError::NotSupported);
        // `write_sync` must have been released on this failure path so a
        // later invocation is not left permanently blocked.
        assert!(arena
            .invoke(
                &futex,
                ThreadId::new(20),
                ThreadId::new(20),
                &[],
                &[],
                None,
                InvokeFlags::NO_RESPONSE,
                Some(Duration::from_millis(10)),
                &mut response,
            )
            .is_ok());
    }

    #[test]
    fn too_many_typed_args_is_invalid() {
        let futex = FutexTable::new();
        let arena = IpcArena::new();
        let typed = [0u64; MAX_TYPED_ARGS + 1];
        let mut response = [0u8; 1];
        let err = arena
            .invoke(
                &futex,
                ThreadId::new(1),
                ThreadId::new(1),
                &typed,
                &[],
                None,
                InvokeFlags::empty(),
                Some(Duration::from_millis(10)),
                &mut response,
            )
            .unwrap_err();
        assert_eq!(err, OsError::InvalidParams);
    }
}
