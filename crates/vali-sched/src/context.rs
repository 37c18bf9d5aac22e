//! Saved CPU context and the interceptor push/restore primitive (C4).
//!
//! Grounded on `original_source/kernel/arch/x86/x32/context.c`:
//! `ContextReset` zeroes a `Context_t`, selects segments for the
//! requested level, and writes a `CONTEXT_RESET_IDENTIFIER` sentinel
//! into freshly created ring-3/signal contexts so the kernel can tell a
//! never-used context apart from one that has actually run.
//! `ContextPushInterceptor` pushes the current `Eip` as a return
//! address, copies the whole `Context_t` on top of that (either on the
//! current stack or a temporary one), then repoints `Eip`/`UserEsp` at
//! the handler and its new stack. Real segment selectors and GPRs are
//! architecture-specific and out of scope per §1, so this crate keeps
//! only the parts of `Context_t` spec.md §4.4 actually names: the
//! instruction/stack/frame pointers and a fixed argument area.

use vali_core::error::{OsError, OsResult};

use crate::stack::Stack;

/// Sentinel written into a freshly reset ring-3 or signal context,
/// taken verbatim from `CONTEXT_RESET_IDENTIFIER` in `context.c`.
pub const CONTEXT_RESET_IDENTIFIER: u64 = 0x00B0_0B1E5;

/// The three context levels spec.md §4.4 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextLevel {
    /// Runs in kernel mode; never receives a pushed interceptor.
    Kernel,
    /// A thread's normal user-mode execution context.
    User,
    /// The context a signal/interceptor handler runs under.
    Signal,
}

/// An architecture-neutral saved register image.
///
/// Stands in for the teacher's `Context_t`: the fields §4.4 actually
/// specifies (instruction pointer, stack pointer, frame pointer, a
/// fixed argument area) plus the reset sentinel. Real general-purpose
/// registers and segment selectors are architecture state this crate
/// does not model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Which level this context was last reset for.
    pub level: ContextLevel,
    /// Saved instruction pointer.
    pub instruction_pointer: u64,
    /// Saved stack pointer.
    pub stack_pointer: u64,
    /// Saved frame pointer, set to the stack top on reset.
    pub frame_pointer: u64,
    /// Fixed argument area: `[return_address, arg, 0, 0]` after
    /// `reset`; overwritten with `[new_stack_top, a0, a1, a2]` by
    /// [`push_interceptor`].
    pub arguments: [u64; 4],
    marker: u64,
}

impl Context {
    /// An all-zero context with no level assigned yet. Not runnable
    /// until [`reset`](Self::reset) is called.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            level: ContextLevel::Kernel,
            instruction_pointer: 0,
            stack_pointer: 0,
            frame_pointer: 0,
            arguments: [0; 4],
            marker: 0,
        }
    }

    /// Zeroes the context, selects the stack/frame pointer for `level`
    /// from `stack_top`, and sets the entry point and single argument.
    ///
    /// Mirrors `ContextReset`: kernel-level (`THREADING_CONTEXT_LEVEL0`)
    /// contexts are never intercepted and get no reset marker; user and
    /// signal contexts get [`CONTEXT_RESET_IDENTIFIER`] written into
    /// their argument area, letting [`is_freshly_reset`](Self::is_freshly_reset)
    /// detect a context that has never been entered.
    pub fn reset(&mut self, level: ContextLevel, stack_top: u64, entry: u64, arg: u64) {
        *self = Self::empty();
        self.level = level;
        self.frame_pointer = stack_top;
        self.stack_pointer = stack_top;
        self.instruction_pointer = entry;
        self.arguments = [0, arg, 0, 0];
        if level != ContextLevel::Kernel {
            self.marker = CONTEXT_RESET_IDENTIFIER;
        }
    }

    /// Returns `true` if this context was reset but has not yet had an
    /// interceptor pushed onto it (the reset sentinel is still intact).
    #[must_use]
    pub fn is_freshly_reset(&self) -> bool {
        self.marker == CONTEXT_RESET_IDENTIFIER
    }
}

/// Pushes a context interceptor (§4.4).
///
/// Pushes `ctx.instruction_pointer` as a return address onto `stack` at
/// `ctx.stack_pointer`, then pushes a full copy of `ctx` (as it stood
/// before this call) onto `target` — `altstack` if given, `stack`
/// otherwise — mirroring `ContextPushInterceptor`'s `TemporaryStack`
/// branch. `ctx` is then rewritten in place: `instruction_pointer`
/// becomes `handler`, `arguments` becomes
/// `[new_stack_top, args[0], args[1], args[2]]`, and `stack_pointer`
/// becomes that same new stack top.
///
/// Returns [`OsError::Overflow`] if either stack lacks room.
pub fn push_interceptor(
    ctx: &mut Context,
    stack: &mut Stack,
    altstack: Option<&mut Stack>,
    handler: u64,
    args: [u64; 3],
) -> OsResult<()> {
    let saved = *ctx;

    let mut retaddr_sp = ctx.stack_pointer;
    stack.push_u64(&mut retaddr_sp, saved.instruction_pointer)?;

    let new_sp = match altstack {
        Some(alt) => {
            let mut sp = alt.top();
            alt.push_context(&mut sp, &saved)?;
            sp
        }
        None => {
            let mut sp = retaddr_sp;
            stack.push_context(&mut sp, &saved)?;
            sp
        }
    };

    ctx.instruction_pointer = handler;
    ctx.arguments = [new_sp, args[0], args[1], args[2]];
    ctx.stack_pointer = new_sp;
    Ok(())
}

/// Restores a context previously saved by [`push_interceptor`] from
/// `stack` at `saved_at` (the `new_stack_top` value `push_interceptor`
/// returned via `ctx.arguments[0]`).
///
/// Models the kernel-side of the interceptor restore syscall: the
/// interceptor's user-side tail stub calls it with the stack pointer it
/// was entered with, and the kernel hands back the exact [`Context`]
/// that was running right before the interceptor was pushed.
pub fn pop_interceptor(stack: &Stack, saved_at: u64) -> OsResult<Context> {
    stack.read_context(saved_at)
}
