//! Type-safe identifiers for resources shared across the substrate.
//!
//! These newtypes prevent accidental mixing of process ids, thread ids,
//! handle ids, device ids and driver ids at compile time. Every id is a
//! process-unique (or kernel-unique, for [`DeviceId`]/[`DriverId`])
//! 32-bit integer per §3 of the data model.

use core::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new identifier from its raw value.
            pub const fn new(val: u32) -> Self {
                Self(val)
            }

            /// Returns the raw `u32` value.
            pub const fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(val: u32) -> Self {
                Self(val)
            }
        }
    };
}

id_newtype!(
    /// Process identifier, unique within the running system.
    ProcessId
);
id_newtype!(
    /// Thread identifier, unique within the running system.
    ThreadId
);
id_newtype!(
    /// CPU identifier.
    CpuId
);
id_newtype!(
    /// Process-unique handle identifier (C1).
    HandleId
);
id_newtype!(
    /// Device record identifier (C6).
    DeviceId
);
id_newtype!(
    /// Driver record identifier (C6).
    DriverId
);
id_newtype!(
    /// Filesystem-storage identifier (C7).
    FsStorageId
);
id_newtype!(
    /// VFS entry identifier within a filesystem's entry cache (C7).
    EntryId
);

impl HandleId {
    /// Sentinel value used in place of a real handle before one is
    /// assigned (mirrors `UUID_INVALID` in the original implementation).
    pub const INVALID: Self = Self(u32::MAX);

    /// Returns `true` if this is the invalid sentinel.
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl DriverId {
    /// Sentinel for "not yet attached", mirroring `UUID_INVALID` used by
    /// `Device::driver-handle` in §3.
    pub const INVALID: Self = Self(u32::MAX);

    /// Returns `true` if this is the invalid sentinel.
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let pid = ProcessId::new(42);
        assert_eq!(pid.as_u32(), 42);
    }

    #[test]
    fn display() {
        let tid = ThreadId::new(7);
        assert_eq!(format!("{tid}"), "7");
    }

    #[test]
    fn ordering() {
        assert!(HandleId::new(1) < HandleId::new(2));
    }

    #[test]
    fn handle_invalid_sentinel() {
        assert!(HandleId::INVALID.is_invalid());
        assert!(!HandleId::new(0).is_invalid());
    }

    #[test]
    fn driver_invalid_sentinel() {
        assert!(DriverId::INVALID.is_invalid());
        assert!(!DriverId::new(3).is_invalid());
    }

    #[test]
    fn from_u32() {
        let id: DeviceId = 9u32.into();
        assert_eq!(id.as_u32(), 9);
    }
}
