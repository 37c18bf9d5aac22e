//! The shared-access rule governing concurrent handles on one entry
//! (§4.7 "Shared-access rule", §3 "VFS handle" invariant, testable
//! property 7).

use bitflags::bitflags;

bitflags! {
    /// Access bits requested when opening an entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        /// Open for reading.
        const READ = 1 << 0;
        /// Open for writing.
        const WRITE = 1 << 1;
        /// Tolerate other readers while this handle is open.
        const READ_SHARE = 1 << 2;
        /// Tolerate other writers while this handle is open.
        const WRITE_SHARE = 1 << 3;
    }
}

impl AccessFlags {
    /// Whether this request is exclusive for `side` (a read or write
    /// request without its matching share bit).
    fn exclusive_for(self, side: Self, share: Self) -> bool {
        self.contains(side) && !self.contains(share)
    }

    fn is_exclusive(self) -> bool {
        self.exclusive_for(Self::READ, Self::READ_SHARE)
            || self.exclusive_for(Self::WRITE, Self::WRITE_SHARE)
    }
}

/// Returns `true` if a new open request with `requested` access may
/// join an entry already held by `existing` handles, per §4.7:
///
/// "Opening an entry is denied iff any existing handle has exclusive
/// read ... and the new request requests read, or symmetrically for
/// write; or iff the new request itself requests exclusive access and
/// any other handle exists."
#[must_use]
pub fn access_allowed(existing: &[AccessFlags], requested: AccessFlags) -> bool {
    if requested.is_exclusive() && !existing.is_empty() {
        return false;
    }
    for other in existing {
        if other.exclusive_for(AccessFlags::READ, AccessFlags::READ_SHARE) && requested.contains(AccessFlags::READ)
        {
            return false;
        }
        if other.exclusive_for(AccessFlags::WRITE, AccessFlags::WRITE_SHARE) && requested.contains(AccessFlags::WRITE)
        {
            return false;
        }
    }
    true
}
