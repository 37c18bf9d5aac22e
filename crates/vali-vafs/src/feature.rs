//! The feature table: a list of `{GUID, length, payload}` records
//! following the header, plus the filter-ops seam a caller supplies at
//! open time (§6; `VaFsFeatureHeader`/`VaFsFeatureFilterOps` in
//! `original_source/tools/rd/libvafs/include/vafs/vafs.h`).
//!
//! Only the persisted [`FILTER_FEATURE_GUID`] feature travels on disk —
//! it simply marks that file entries may carry a filter id. The actual
//! encode/decode callback pair (`VaFsFeatureFilterOps`) is never
//! persisted; the reference header's doc comment calls this out
//! explicitly ("This feature data is not transferred to the disk
//! image"), so here it is a trait object the caller installs when
//! opening the image, not something [`FeatureTable::parse`] reads back.

use alloc::vec::Vec;

use vali_core::error::{OsError, OsResult};

use crate::guid::Guid;

/// One parsed feature record: its GUID plus the payload bytes trailing
/// the fixed `{Guid, Length}` header.
#[derive(Debug, Clone, Copy)]
pub struct Feature<'a> {
    /// The feature's identifying GUID.
    pub guid: Guid,
    /// The feature's payload, excluding the `{Guid, Length}` header.
    pub payload: &'a [u8],
}

const FEATURE_HEADER_LEN: usize = Guid::WIRE_LEN + 4;

/// The parsed feature table: every feature record following the
/// header's `feature_table_offset`.
pub struct FeatureTable<'a> {
    features: Vec<Feature<'a>>,
}

impl<'a> FeatureTable<'a> {
    /// Parses the feature table starting at `data[offset..]`: a `u32`
    /// count followed by that many `{Guid, Length, payload}` records.
    pub(crate) fn parse(data: &'a [u8], offset: u64) -> OsResult<Self> {
        let offset = offset as usize;
        let count_bytes = data.get(offset..offset + 4).ok_or(OsError::ProtocolError)?;
        let count = u32::from_le_bytes(count_bytes.try_into().unwrap());
        let mut cursor = offset + 4;
        let mut features = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let header = data
                .get(cursor..cursor + FEATURE_HEADER_LEN)
                .ok_or(OsError::ProtocolError)?;
            let guid = Guid::from_le_bytes(header[0..Guid::WIRE_LEN].try_into().unwrap());
            let length =
                u32::from_le_bytes(header[Guid::WIRE_LEN..FEATURE_HEADER_LEN].try_into().unwrap())
                    as usize;
            if length < FEATURE_HEADER_LEN {
                return Err(OsError::ProtocolError);
            }
            let payload_start = cursor + FEATURE_HEADER_LEN;
            let payload_end = cursor + length;
            let payload = data
                .get(payload_start..payload_end)
                .ok_or(OsError::ProtocolError)?;
            features.push(Feature { guid, payload });
            cursor = payload_end;
        }
        Ok(Self { features })
    }

    /// Returns the feature matching `guid`, if installed (§4.1-style
    /// `vafs_feature_query`).
    #[must_use]
    pub fn query(&self, guid: Guid) -> Option<Feature<'a>> {
        self.features.iter().find(|f| f.guid == guid).copied()
    }

    /// Serializes `features` into the on-disk feature-table format used
    /// by [`FeatureTable::parse`]. Used by test fixtures to build images
    /// the reader can then open.
    pub(crate) fn write(features: &[(Guid, &[u8])], out: &mut Vec<u8>) {
        out.extend_from_slice(&(features.len() as u32).to_le_bytes());
        for (guid, payload) in features {
            let length = (FEATURE_HEADER_LEN + payload.len()) as u32;
            out.extend_from_slice(&guid.to_le_bytes());
            out.extend_from_slice(&length.to_le_bytes());
            out.extend_from_slice(payload);
        }
    }
}

/// The decode/encode callback pair a caller installs for a filtered
/// image (the non-persisted `VaFsFeatureFilterOps` half of the filter
/// feature). The reader only ever calls [`decode`](Self::decode).
pub trait FilterOps: Send + Sync {
    /// Decodes `input` into `output`, returning the number of bytes
    /// actually written. `output` is sized to the entry's uncompressed
    /// `length`.
    fn decode(&self, input: &[u8], output: &mut [u8]) -> OsResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::FILTER_FEATURE_GUID;

    #[test]
    fn write_then_parse_roundtrips_payload() {
        let mut buf = Vec::new();
        FeatureTable::write(&[(FILTER_FEATURE_GUID, &[1, 2, 3])], &mut buf);
        let table = FeatureTable::parse(&buf, 0).unwrap();
        let feature = table.query(FILTER_FEATURE_GUID).unwrap();
        assert_eq!(feature.payload, &[1, 2, 3]);
    }

    #[test]
    fn query_missing_feature_is_none() {
        let mut buf = Vec::new();
        FeatureTable::write(&[], &mut buf);
        let table = FeatureTable::parse(&buf, 0).unwrap();
        assert!(table.query(FILTER_FEATURE_GUID).is_none());
    }
}
