//! Directory traversal: `directory_open`/`directory_read`/
//! `directory_open_file` (§4.8).

use vali_core::error::{OsError, OsResult};

use crate::entry::{parse_entry, EntryKind, EntryType};
use crate::file::FileHandle;
use crate::image::VaFsImage;

/// An open directory, positioned at `offset` with a read cursor over
/// its flat entry list.
pub struct DirectoryHandle<'a> {
    pub(crate) image: &'a VaFsImage<'a>,
    offset: u64,
    cursor: usize,
    remaining: u32,
}

/// One entry returned by [`DirectoryHandle::read`], mirroring
/// `VaFsEntry { Name, Type }`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// The entry's name within its parent directory.
    pub name: alloc::string::String,
    /// Whether the entry is a file or a nested directory.
    pub entry_type: EntryType,
}

impl<'a> DirectoryHandle<'a> {
    pub(crate) fn at_offset(image: &'a VaFsImage<'a>, offset: u64) -> OsResult<Self> {
        let data = image.data();
        let count = u32::from_le_bytes(
            data.get(offset as usize..offset as usize + 4)
                .ok_or(OsError::ProtocolError)?
                .try_into()
                .unwrap(),
        );
        Ok(Self {
            image,
            offset,
            cursor: offset as usize + 4,
            remaining: count,
        })
    }

    /// Reads the next entry, or `None` once the directory is exhausted
    /// (`vafs_directory_read` returning -1 at end-of-directory, modelled
    /// here as `Ok(None)` rather than an error since running off the end
    /// of a directory listing is expected control flow, not a failure).
    pub fn read(&mut self) -> OsResult<Option<DirEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let (entry, next) = parse_entry(self.image.data(), self.cursor)?;
        self.cursor = next;
        self.remaining -= 1;
        Ok(Some(DirEntry {
            entry_type: entry.kind.entry_type(),
            name: entry.name,
        }))
    }

    /// Resets the read cursor to the first entry (`rewinddir`-style;
    /// needed after a `read` loop so a caller can resolve a second
    /// name without reopening the directory).
    pub fn rewind(&mut self) {
        self.cursor = self.offset as usize + 4;
        self.remaining = Self::entry_count(self.image.data(), self.offset);
    }

    fn entry_count(data: &[u8], offset: u64) -> u32 {
        u32::from_le_bytes(data[offset as usize..offset as usize + 4].try_into().unwrap())
    }

    /// Opens the nested directory named `name` directly under this one.
    pub fn open_directory(&self, name: &str) -> OsResult<DirectoryHandle<'a>> {
        match self.find(name)?.kind {
            EntryKind::Directory { child_offset } => {
                DirectoryHandle::at_offset(self.image, child_offset)
            }
            EntryKind::File { .. } => Err(OsError::NotDirectory),
        }
    }

    /// Opens the file named `name` directly under this directory
    /// (§4.8 `directory_open_file`).
    pub fn open_file(&self, name: &str) -> OsResult<FileHandle<'a>> {
        match self.find(name)?.kind {
            EntryKind::File {
                length,
                compressed_length,
                data_offset,
                filtered,
            } => Ok(FileHandle::new(
                self.image,
                length,
                compressed_length,
                data_offset,
                filtered,
            )),
            EntryKind::Directory { .. } => Err(OsError::IsDirectory),
        }
    }

    fn find(&self, name: &str) -> OsResult<crate::entry::Entry> {
        let data = self.image.data();
        let mut cursor = self.offset as usize + 4;
        let count = Self::entry_count(data, self.offset);
        for _ in 0..count {
            let (entry, next) = parse_entry(data, cursor)?;
            if entry.name == name {
                return Ok(entry);
            }
            cursor = next;
        }
        Err(OsError::NotFound)
    }
}

/// Resolves an absolute, `/`-separated path from `root` to the
/// directory it names, opening a nested [`DirectoryHandle`] at each
/// component (§4.8 `directory_open`, §9: "pick one [convention] and
/// document it" — this reader resolves absolute paths only, consistent
/// with `vali-vfs`'s choice for the same open question).
pub(crate) fn open_path<'a>(root: DirectoryHandle<'a>, path: &str) -> OsResult<DirectoryHandle<'a>> {
    if !path.starts_with('/') {
        return Err(OsError::InvalidParams);
    }
    let mut current = root;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        current = current.open_directory(component)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ImageBuilder;

    #[test]
    fn reads_entries_in_order_then_ends() {
        let image_bytes = ImageBuilder::new()
            .file("a.txt", b"hello")
            .file("b.txt", b"world")
            .build();
        let image = VaFsImage::open_memory(&image_bytes).unwrap();
        let mut dir = image.directory_open("/").unwrap();

        let first = dir.read().unwrap().unwrap();
        assert_eq!(first.name, "a.txt");
        assert_eq!(first.entry_type, EntryType::File);
        let second = dir.read().unwrap().unwrap();
        assert_eq!(second.name, "b.txt");
        assert!(dir.read().unwrap().is_none());
    }

    #[test]
    fn nested_directory_resolves_by_path() {
        let image_bytes = ImageBuilder::new()
            .subdirectory("services", |d| d.file("echo", b"ping\npng"))
            .build();
        let image = VaFsImage::open_memory(&image_bytes).unwrap();
        let mut dir = image.directory_open("/services").unwrap();
        let entry = dir.read().unwrap().unwrap();
        assert_eq!(entry.name, "echo");
    }

    #[test]
    fn open_file_on_directory_entry_is_is_directory() {
        let image_bytes = ImageBuilder::new()
            .subdirectory("etc", |d| d)
            .build();
        let image = VaFsImage::open_memory(&image_bytes).unwrap();
        let dir = image.directory_open("/").unwrap();
        assert_eq!(dir.open_file("etc").unwrap_err(), OsError::IsDirectory);
    }

    #[test]
    fn open_directory_on_file_entry_is_not_directory() {
        let image_bytes = ImageBuilder::new().file("a.txt", b"hi").build();
        let image = VaFsImage::open_memory(&image_bytes).unwrap();
        let dir = image.directory_open("/").unwrap();
        assert_eq!(
            dir.open_directory("a.txt").unwrap_err(),
            OsError::NotDirectory
        );
    }

    #[test]
    fn missing_name_is_not_found() {
        let image_bytes = ImageBuilder::new().build();
        let image = VaFsImage::open_memory(&image_bytes).unwrap();
        let dir = image.directory_open("/").unwrap();
        assert_eq!(dir.open_file("missing").unwrap_err(), OsError::NotFound);
    }
}
