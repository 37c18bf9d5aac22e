//! Test-only image builder: the reverse of [`crate::image::VaFsImage`],
//! used to construct fixtures the reader's own test suite opens back
//! up. Not the archive-creation tool named out of scope by §1 (that
//! tool additionally handles on-disk layout optimization, compression
//! selection and CLI plumbing this has no need to reproduce) — just
//! enough serialization to exercise the reader end to end.

use alloc::string::String;
use alloc::vec::Vec;

use crate::entry::EntryKind;
use crate::feature::FeatureTable;
use crate::guid::FILTER_FEATURE_GUID;
use crate::header::{Architecture, Header};

#[derive(Clone)]
enum PendingEntry {
    File {
        name: String,
        data: Vec<u8>,
        uncompressed_len: usize,
        filtered: bool,
    },
    Dir {
        name: String,
        builder: DirBuilder,
    },
}

#[derive(Clone, Default)]
pub(crate) struct DirBuilder {
    entries: Vec<PendingEntry>,
}

impl DirBuilder {
    fn push_file(mut self, name: &str, data: &[u8], uncompressed_len: usize, filtered: bool) -> Self {
        self.entries.push(PendingEntry::File {
            name: name.into(),
            data: data.into(),
            uncompressed_len,
            filtered,
        });
        self
    }

    pub(crate) fn file(self, name: &str, data: &[u8]) -> Self {
        self.push_file(name, data, data.len(), false)
    }

    pub(crate) fn subdirectory(mut self, name: &str, f: impl FnOnce(DirBuilder) -> DirBuilder) -> Self {
        self.entries.push(PendingEntry::Dir {
            name: name.into(),
            builder: f(DirBuilder::default()),
        });
        self
    }
}

/// Builds a minimal x64 VaFs image byte-for-byte compatible with
/// [`crate::image::VaFsImage::open_memory`].
#[derive(Default)]
pub(crate) struct ImageBuilder {
    root: DirBuilder,
    any_filtered: bool,
}

impl ImageBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.root = self.root.file(name, data);
        self
    }

    pub(crate) fn filtered_file(mut self, name: &str, encoded: &[u8], uncompressed_len: usize) -> Self {
        self.any_filtered = true;
        self.root = self.root.push_file(name, encoded, uncompressed_len, true);
        self
    }

    pub(crate) fn subdirectory(mut self, name: &str, f: impl FnOnce(DirBuilder) -> DirBuilder) -> Self {
        self.root = self.root.subdirectory(name, f);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut feature_bytes = Vec::new();
        if self.any_filtered {
            FeatureTable::write(&[(FILTER_FEATURE_GUID, &[])], &mut feature_bytes);
        } else {
            FeatureTable::write(&[], &mut feature_bytes);
        }

        let header_len = Header::WIRE_LEN as u64;
        let data_base = header_len + feature_bytes.len() as u64;

        let mut data_section = Vec::new();
        collect_files(&self.root, &mut data_section);

        let dir_base = data_base + data_section.len() as u64;
        let mut dir_section = Vec::new();
        let mut data_cursor = 0usize;
        let root_offset = flatten_dirs(&self.root, &mut dir_section, &mut data_cursor, data_base, dir_base);

        let header = Header {
            architecture: Architecture::X64,
            feature_table_offset: header_len,
            root_directory_offset: root_offset,
        };
        let mut out = alloc::vec![0u8; Header::WIRE_LEN];
        header.write_into(&mut out);
        out.extend_from_slice(&feature_bytes);
        out.extend_from_slice(&data_section);
        out.extend_from_slice(&dir_section);
        out
    }
}

fn collect_files(dir: &DirBuilder, data_section: &mut Vec<u8>) {
    for entry in &dir.entries {
        match entry {
            PendingEntry::File { data, .. } => data_section.extend_from_slice(data),
            PendingEntry::Dir { builder, .. } => collect_files(builder, data_section),
        }
    }
}

fn flatten_dirs(
    dir: &DirBuilder,
    dir_section: &mut Vec<u8>,
    data_cursor: &mut usize,
    data_base: u64,
    dir_base: u64,
) -> u64 {
    let mut entries: Vec<(String, EntryKind)> = Vec::new();
    for entry in &dir.entries {
        match entry {
            PendingEntry::File {
                name,
                data,
                uncompressed_len,
                filtered,
            } => {
                let offset = data_base + *data_cursor as u64;
                *data_cursor += data.len();
                entries.push((
                    name.clone(),
                    EntryKind::File {
                        length: *uncompressed_len as u64,
                        compressed_length: data.len() as u64,
                        data_offset: offset,
                        filtered: *filtered,
                    },
                ));
            }
            PendingEntry::Dir { name, builder } => {
                let child_offset = flatten_dirs(builder, dir_section, data_cursor, data_base, dir_base);
                entries.push((name.clone(), EntryKind::Directory { child_offset }));
            }
        }
    }
    let my_offset = dir_base + dir_section.len() as u64;
    let refs: Vec<(&str, EntryKind)> = entries.iter().map(|(n, k)| (n.as_str(), *k)).collect();
    crate::entry::write_directory(&refs, dir_section);
    my_offset
}
