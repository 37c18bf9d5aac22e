//! Thread objects (C4): the id, owning process, saved contexts, stack
//! regions, TLS slots, IPC arena pointer and scheduling state spec.md
//! §3 lists.

use vali_core::id::{HandleId, ProcessId, ThreadId};
use vali_core::sync::SpinLock;

use crate::context::{Context, ContextLevel};
use crate::stack::Stack;
use crate::tls::TlsTable;

/// Where a thread sits in the scheduler right now. §3's invariant: a
/// blocked thread appears on exactly one wait list — this enum only
/// records *which kind* of list that is, the wait list itself lives in
/// whichever primitive (futex table, handle wait list, sleep queue)
/// parked the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable, sitting in a per-CPU ready queue.
    Ready,
    /// Currently executing on a CPU.
    Running,
    /// Parked in [`crate::FutexTable`] on the given word address.
    BlockedOnFutex(u64),
    /// Parked waiting for a handle to become signalled.
    BlockedOnHandle(HandleId),
    /// Parked until a deadline (monotonic nanoseconds since boot).
    Sleeping(u64),
    /// Has run its last instruction; resources are being torn down.
    Terminated,
}

/// A kernel thread.
pub struct Thread {
    id: ThreadId,
    process: ProcessId,
    is_idle: bool,
    state: SpinLock<ThreadState>,
    kernel_context: SpinLock<Context>,
    user_context: SpinLock<Context>,
    kernel_stack: SpinLock<Stack>,
    user_stack: SpinLock<Stack>,
    signal_stack: SpinLock<Stack>,
    tls: SpinLock<TlsTable>,
    ipc_arena: SpinLock<Option<u64>>,
}

impl Thread {
    /// Creates a thread owned by `process`, with its kernel context
    /// reset to start executing at `entry` on top of `kernel_stack`,
    /// and ring-3/signal stacks of the given sizes reserved but left
    /// unreset until first use.
    #[must_use]
    pub fn new(
        id: ThreadId,
        process: ProcessId,
        entry: u64,
        arg: u64,
        kernel_stack_size: usize,
        user_stack_size: usize,
        signal_stack_size: usize,
        stack_base: u64,
    ) -> Self {
        let kernel_stack = Stack::new(kernel_stack_size, stack_base);
        let user_stack = Stack::new(user_stack_size, stack_base + kernel_stack_size as u64);
        let signal_stack = Stack::new(
            signal_stack_size,
            stack_base + (kernel_stack_size + user_stack_size) as u64,
        );

        let mut kernel_context = Context::empty();
        kernel_context.reset(ContextLevel::Kernel, kernel_stack.top(), entry, arg);

        Self {
            id,
            process,
            is_idle: false,
            state: SpinLock::new(ThreadState::Ready),
            kernel_context: SpinLock::new(kernel_context),
            user_context: SpinLock::new(Context::empty()),
            kernel_stack: SpinLock::new(kernel_stack),
            user_stack: SpinLock::new(user_stack),
            signal_stack: SpinLock::new(signal_stack),
            tls: SpinLock::new(TlsTable::new()),
            ipc_arena: SpinLock::new(None),
        }
    }

    /// This thread's identifier.
    #[must_use]
    pub const fn id(&self) -> ThreadId {
        self.id
    }

    /// The process this thread belongs to.
    #[must_use]
    pub const fn process(&self) -> ProcessId {
        self.process
    }

    /// Marks this thread as a per-CPU idle thread (§4.3: "Each CPU has
    /// its own ready queue and idle thread").
    pub fn mark_idle(&mut self) {
        self.is_idle = true;
    }

    /// Whether this is a CPU's idle thread.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.is_idle
    }

    /// The entry point this thread's kernel context was created with.
    #[must_use]
    pub fn kernel_entry(&self) -> u64 {
        self.kernel_context.lock().instruction_pointer
    }

    /// The top of this thread's kernel stack, as handed to
    /// [`Context::reset`] at creation time.
    #[must_use]
    pub fn kernel_stack_top(&self) -> u64 {
        self.kernel_stack.lock().top()
    }

    /// Current scheduling state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Transitions to `state`. Callers are responsible for the actual
    /// wait-list bookkeeping (futex bucket, handle wait list, sleep
    /// queue); this only records the classification.
    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    /// Resets this thread's user-mode context to start at `entry` with
    /// argument `arg`, on top of its ring-3 stack.
    pub fn reset_user_context(&self, entry: u64, arg: u64) {
        let top = self.user_stack.lock().top();
        self.user_context.lock().reset(ContextLevel::User, top, entry, arg);
    }

    /// Pushes a context interceptor (§4.3 "signal/interceptor
    /// delivery") onto this thread's user context: `handler` runs next
    /// with `args`, on the signal stack if `use_altstack` is set,
    /// otherwise on top of the existing user stack. The restore syscall
    /// later calls [`pop_interceptor`](Self::pop_interceptor) with the
    /// stack pointer `handler` was entered with to resume the original
    /// flow.
    pub fn push_interceptor(
        &self,
        use_altstack: bool,
        handler: u64,
        args: [u64; 3],
    ) -> vali_core::error::OsResult<()> {
        let mut ctx = self.user_context.lock();
        let mut user_stack = self.user_stack.lock();
        if use_altstack {
            let mut signal_stack = self.signal_stack.lock();
            crate::context::push_interceptor(
                &mut ctx,
                &mut user_stack,
                Some(&mut signal_stack),
                handler,
                args,
            )
        } else {
            crate::context::push_interceptor(&mut ctx, &mut user_stack, None, handler, args)
        }
    }

    /// Restores the user context previously saved by
    /// [`push_interceptor`](Self::push_interceptor), reading it back
    /// from whichever stack it was pushed onto.
    pub fn pop_interceptor(&self, use_altstack: bool, saved_at: u64) -> vali_core::error::OsResult<()> {
        let restored = if use_altstack {
            crate::context::pop_interceptor(&self.signal_stack.lock(), saved_at)?
        } else {
            crate::context::pop_interceptor(&self.user_stack.lock(), saved_at)?
        };
        *self.user_context.lock() = restored;
        Ok(())
    }

    /// This thread's thread-local storage table.
    #[must_use]
    pub fn tls(&self) -> &SpinLock<TlsTable> {
        &self.tls
    }

    /// The base virtual address of this thread's IPC arena, if one has
    /// been allocated for it yet.
    #[must_use]
    pub fn ipc_arena(&self) -> Option<u64> {
        *self.ipc_arena.lock()
    }

    /// Records the base address of this thread's IPC arena.
    pub fn set_ipc_arena(&self, base: u64) {
        *self.ipc_arena.lock() = Some(base);
    }

    /// Runs TLS destructors at thread exit and marks the thread
    /// terminated.
    pub fn exit(&self) {
        self.tls.lock().run_destructors();
        self.set_state(ThreadState::Terminated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> Thread {
        Thread::new(
            ThreadId::new(1),
            ProcessId::new(1),
            0x1000,
            0,
            4096,
            4096,
            4096,
            0x1000_0000,
        )
    }

    #[test]
    fn new_thread_starts_ready() {
        let t = thread();
        assert_eq!(t.state(), ThreadState::Ready);
        assert_eq!(t.kernel_entry(), 0x1000);
        assert_eq!(t.kernel_stack_top(), 0x1000_0000 + 4096);
    }

    #[test]
    fn state_transitions_are_recorded() {
        let t = thread();
        t.set_state(ThreadState::BlockedOnFutex(0x2000));
        assert_eq!(t.state(), ThreadState::BlockedOnFutex(0x2000));
    }

    #[test]
    fn interceptor_push_then_restore_round_trips() {
        let t = thread();
        t.reset_user_context(0x4000, 9);

        t.push_interceptor(false, 0x5000, [1, 2, 3]).unwrap();
        let saved_at = t.user_context.lock().arguments[0];
        assert_eq!(t.user_context.lock().instruction_pointer, 0x5000);

        t.pop_interceptor(false, saved_at).unwrap();
        assert_eq!(t.user_context.lock().instruction_pointer, 0x4000);
    }

    #[test]
    fn exit_runs_destructors_and_terminates() {
        let t = thread();
        let ran = alloc::sync::Arc::new(core::sync::atomic::AtomicBool::new(false));
        let r = ran.clone();
        t.tls
            .lock()
            .set(
                0,
                1,
                Some(alloc::boxed::Box::new(move |_| {
                    r.store(true, core::sync::atomic::Ordering::SeqCst);
                    None
                })),
            )
            .unwrap();

        t.exit();
        assert!(ran.load(core::sync::atomic::Ordering::SeqCst));
        assert_eq!(t.state(), ThreadState::Terminated);
    }
}
