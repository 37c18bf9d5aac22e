//! The closed error enum shared by every fallible operation in the
//! substrate (§7 of the error-handling design).
//!
//! Propagation policy: every fallible operation returns an [`OsError`];
//! callers decide whether to retry ([`OsError::Busy`],
//! [`OsError::Interrupted`]), fail ([`OsError::InvalidParams`],
//! [`OsError::Permissions`], [`OsError::NotFound`]), or escalate
//! ([`OsError::DeviceFault`], [`OsError::OutOfMemory`]). There is no
//! exception-like unwinding; a fatal kernel condition is out of scope
//! for this crate and is handled by the (unspecified) arch layer via a
//! `fatal(scope, fmt, ..)` sink per §7.

use core::fmt;

/// The closed error kind enum used throughout the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    /// Operation completed successfully. Rarely constructed directly —
    /// most call sites use `Result<T, OsError>` instead — but kept for
    /// parity with the wire-level status code callers may see over IPC.
    Ok,
    /// Unclassified failure.
    Unknown,
    /// The resource being created already exists.
    Exists,
    /// The requested resource could not be found.
    NotFound,
    /// Arguments failed validation.
    InvalidParams,
    /// The caller lacks the rights to perform the operation.
    Permissions,
    /// A blocking call's deadline elapsed before it completed.
    Timeout,
    /// A blocking call was interrupted by thread termination.
    Interrupted,
    /// The operation is not implemented by this backend.
    NotSupported,
    /// Frame, region, or heap allocation failed.
    OutOfMemory,
    /// The resource is held by another operation right now; retry.
    Busy,
    /// The operation only partially completed.
    Incomplete,
    /// The target object was destroyed while the call was in flight.
    Cancelled,
    /// The calling thread has been placed on a wait list.
    Blocked,
    /// The operation is still running asynchronously.
    InProgress,
    /// A counter or buffer would overflow its bounds.
    Overflow,
    /// Expected a directory, found something else.
    NotDirectory,
    /// Expected a file, found a directory.
    IsDirectory,
    /// A symbolic link target is invalid.
    LinkInvalid,
    /// Too many link hops were followed while resolving a path.
    TooManyLinks,
    /// A directory delete was attempted while it still had entries.
    DirNotEmpty,
    /// The underlying device reported an I/O failure.
    DeviceFault,
    /// A peer violated the expected wire protocol.
    ProtocolError,
    /// A connection attempt was refused by the peer.
    ConnectionRefused,
    /// An established connection was aborted.
    ConnectionAborted,
    /// The destination host is unreachable.
    HostUnreachable,
    /// The operation requires a connection that does not exist.
    NotConnected,
    /// The operation requires no existing connection, but one exists.
    AlreadyConnected,
}

impl OsError {
    /// Returns `true` for error kinds that indicate the caller should
    /// retry the operation rather than propagate failure.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Busy | Self::Interrupted)
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Unknown => "unknown",
            Self::Exists => "exists",
            Self::NotFound => "not-found",
            Self::InvalidParams => "invalid-params",
            Self::Permissions => "permissions",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::NotSupported => "not-supported",
            Self::OutOfMemory => "out-of-memory",
            Self::Busy => "busy",
            Self::Incomplete => "incomplete",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
            Self::InProgress => "in-progress",
            Self::Overflow => "overflow",
            Self::NotDirectory => "not-directory",
            Self::IsDirectory => "is-directory",
            Self::LinkInvalid => "link-invalid",
            Self::TooManyLinks => "too-many-links",
            Self::DirNotEmpty => "dir-not-empty",
            Self::DeviceFault => "device-fault",
            Self::ProtocolError => "protocol-error",
            Self::ConnectionRefused => "connection-refused",
            Self::ConnectionAborted => "connection-aborted",
            Self::HostUnreachable => "host-unreachable",
            Self::NotConnected => "not-connected",
            Self::AlreadyConnected => "already-connected",
        };
        f.write_str(s)
    }
}

/// Convenience alias used across the workspace.
pub type OsResult<T> = Result<T, OsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_spec_spelling() {
        assert_eq!(format!("{}", OsError::NotFound), "not-found");
        assert_eq!(format!("{}", OsError::OutOfMemory), "out-of-memory");
        assert_eq!(format!("{}", OsError::DeviceFault), "device-fault");
    }

    #[test]
    fn retryable_kinds() {
        assert!(OsError::Busy.is_retryable());
        assert!(OsError::Interrupted.is_retryable());
        assert!(!OsError::NotFound.is_retryable());
        assert!(!OsError::Permissions.is_retryable());
    }
}
