//! The 16-byte GUID type used to tag features in a VaFs image.
//!
//! Grounded on `VaFsGuid` in `original_source/tools/rd/libvafs/include/vafs/vafs.h`
//! (`Data1: u32, Data2: u16, Data3: u16, Data4: [u8; 8]`); §6 gives one
//! literal instance, the filter feature GUID.

use core::fmt;

/// A 16-byte GUID, laid out little-endian on the wire exactly as the
/// reference `VaFsGuid` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    /// Builds a GUID from its canonical `Data1-Data2-Data3-Data4` parts.
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub(crate) const WIRE_LEN: usize = 16;

    pub(crate) fn to_le_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    pub(crate) fn from_le_bytes(buf: &[u8; Self::WIRE_LEN]) -> Self {
        Self {
            data1: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            data2: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            data3: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            data4: buf[8..16].try_into().unwrap(),
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

/// The filter feature's GUID, given literally in §6:
/// `99C25D91-FA99-4A71-9CB5-961AA93DDFBB`.
pub const FILTER_FEATURE_GUID: Guid = Guid::new(
    0x99C2_5D91,
    0xFA99,
    0x4A71,
    [0x9C, 0xB5, 0x96, 0x1A, 0xA9, 0x3D, 0xDF, 0xBB],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_guid_display_matches_spec_spelling() {
        assert_eq!(
            format!("{FILTER_FEATURE_GUID}"),
            "99C25D91-FA99-4A71-9CB5-961AA93DDFBB"
        );
    }

    #[test]
    fn roundtrips_through_wire_bytes() {
        let bytes = FILTER_FEATURE_GUID.to_le_bytes();
        assert_eq!(Guid::from_le_bytes(&bytes), FILTER_FEATURE_GUID);
    }
}
