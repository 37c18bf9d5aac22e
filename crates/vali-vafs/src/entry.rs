//! Wire format and parsing for one directory entry (§6: "directories are
//! flat lists of `{name, type, child_offset}`; files carry `{length,
//! compressed_length, data_offset}`").

use alloc::string::String;
use alloc::vec::Vec;

use vali_core::error::{OsError, OsResult};

/// Whether a directory entry names a file or a nested directory,
/// mirroring `VaFsEntryType` (`original_source/tools/rd/libvafs/include/vafs/vafs.h`)
/// minus its `Unknown` sentinel, which this reader never produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// A regular file.
    File,
    /// A nested directory.
    Directory,
}

/// One parsed directory entry: a name plus type-specific tail data.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) name: String,
    pub(crate) kind: EntryKind,
}

/// The type-specific fields trailing an entry's name (§3: "A directory
/// entry references either a child directory offset or a file with
/// {size, compressed-size, offset, filter-id}").
#[derive(Debug, Clone, Copy)]
pub(crate) enum EntryKind {
    Directory { child_offset: u64 },
    File {
        length: u64,
        compressed_length: u64,
        data_offset: u64,
        filtered: bool,
    },
}

impl EntryKind {
    pub(crate) fn entry_type(self) -> EntryType {
        match self {
            Self::Directory { .. } => EntryType::Directory,
            Self::File { .. } => EntryType::File,
        }
    }
}

/// Parses one entry starting at `data[cursor..]`, returning it along
/// with the cursor position of the entry that follows.
pub(crate) fn parse_entry(data: &[u8], cursor: usize) -> OsResult<(Entry, usize)> {
    let name_len = u16::from_le_bytes(
        data.get(cursor..cursor + 2)
            .ok_or(OsError::ProtocolError)?
            .try_into()
            .unwrap(),
    ) as usize;
    let mut cursor = cursor + 2;

    let name_bytes = data.get(cursor..cursor + name_len).ok_or(OsError::ProtocolError)?;
    let name = core::str::from_utf8(name_bytes)
        .map_err(|_| OsError::ProtocolError)?
        .into();
    cursor += name_len;

    let type_tag = *data.get(cursor).ok_or(OsError::ProtocolError)?;
    cursor += 1;

    let kind = match type_tag {
        0 => {
            let child_offset = u64::from_le_bytes(
                data.get(cursor..cursor + 8)
                    .ok_or(OsError::ProtocolError)?
                    .try_into()
                    .unwrap(),
            );
            cursor += 8;
            EntryKind::Directory { child_offset }
        }
        1 => {
            let tail = data.get(cursor..cursor + 25).ok_or(OsError::ProtocolError)?;
            let length = u64::from_le_bytes(tail[0..8].try_into().unwrap());
            let compressed_length = u64::from_le_bytes(tail[8..16].try_into().unwrap());
            let data_offset = u64::from_le_bytes(tail[16..24].try_into().unwrap());
            let filtered = tail[24] != 0;
            cursor += 25;
            EntryKind::File {
                length,
                compressed_length,
                data_offset,
                filtered,
            }
        }
        _ => return Err(OsError::ProtocolError),
    };

    Ok((Entry { name, kind }, cursor))
}

/// Serializes a directory's entry list, used by test fixtures.
pub(crate) fn write_directory(entries: &[(&str, EntryKind)], out: &mut Vec<u8>) {
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (name, kind) in entries {
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        match *kind {
            EntryKind::Directory { child_offset } => {
                out.push(0);
                out.extend_from_slice(&child_offset.to_le_bytes());
            }
            EntryKind::File {
                length,
                compressed_length,
                data_offset,
                filtered,
            } => {
                out.push(1);
                out.extend_from_slice(&length.to_le_bytes());
                out.extend_from_slice(&compressed_length.to_le_bytes());
                out.extend_from_slice(&data_offset.to_le_bytes());
                out.push(u8::from(filtered));
            }
        }
    }
}
