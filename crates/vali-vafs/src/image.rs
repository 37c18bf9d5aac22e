//! The top-level image handle: header + feature table parsing, and the
//! `directory_open` entry point (§4.8).

use vali_core::error::{OsError, OsResult};

use crate::directory::{open_path, DirectoryHandle};
use crate::feature::{FeatureTable, FilterOps};
use crate::guid::FILTER_FEATURE_GUID;
use crate::header::{Architecture, Header};

/// A parsed, read-only VaFs image over a byte slice (file or in-memory
/// buffer — per §4.8 "accepts either a file path or a byte slice"; in
/// this `no_std`-first reader a file path is read into a buffer by the
/// caller and handed in as bytes, the same seam `vali-mm`'s
/// `PageFaultHandler` uses to stay independent of how bytes actually
/// reach memory).
pub struct VaFsImage<'a> {
    data: &'a [u8],
    header: Header,
    features: FeatureTable<'a>,
    filter: Option<&'a dyn FilterOps>,
}

impl<'a> VaFsImage<'a> {
    /// Opens an image with no filter installed. Reading a filtered
    /// entry later fails with [`OsError::ProtocolError`]; use
    /// [`VaFsImage::open_memory_with_filter`] for an image that carries
    /// filtered entries.
    pub fn open_memory(data: &'a [u8]) -> OsResult<Self> {
        Self::open(data, None)
    }

    /// Opens an image and installs `filter` for decoding filtered file
    /// entries (§2.8: "resolves the filter-ops feature if present").
    pub fn open_memory_with_filter(data: &'a [u8], filter: &'a dyn FilterOps) -> OsResult<Self> {
        Self::open(data, Some(filter))
    }

    fn open(data: &'a [u8], filter: Option<&'a dyn FilterOps>) -> OsResult<Self> {
        let header = Header::parse(data)?;
        let features = FeatureTable::parse(data, header.feature_table_offset)?;
        Ok(Self {
            data,
            header,
            features,
            filter,
        })
    }

    /// The image's declared target architecture.
    #[must_use]
    pub const fn architecture(&self) -> Architecture {
        self.header.architecture
    }

    /// Whether the image declares the filter feature (§6; installed by
    /// the writer when at least one entry is filtered).
    #[must_use]
    pub fn has_filter_feature(&self) -> bool {
        self.features.query(FILTER_FEATURE_GUID).is_some()
    }

    /// Opens the directory at an absolute path (§4.8 `directory_open`).
    /// Only absolute paths are accepted; see §9's open-question note on
    /// path canonicalization.
    pub fn directory_open(&'a self, path: &str) -> OsResult<DirectoryHandle<'a>> {
        let root = DirectoryHandle::at_offset(self, self.header.root_directory_offset)?;
        if path == "/" {
            return Ok(root);
        }
        open_path(root, path)
    }

    /// Opens the file at an absolute path directly, a convenience over
    /// opening the parent directory and calling
    /// [`DirectoryHandle::open_file`].
    pub fn file_open(&'a self, path: &str) -> OsResult<crate::file::FileHandle<'a>> {
        let (dir_path, name) = path.rsplit_once('/').ok_or(OsError::InvalidParams)?;
        let dir_path = if dir_path.is_empty() { "/" } else { dir_path };
        self.directory_open(dir_path)?.open_file(name)
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.data
    }

    pub(crate) fn filter(&self) -> Option<&'a dyn FilterOps> {
        self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ImageBuilder;

    #[test]
    fn opens_and_reports_architecture() {
        let data = ImageBuilder::new().build();
        let image = VaFsImage::open_memory(&data).unwrap();
        assert_eq!(image.architecture(), Architecture::X64);
        assert!(!image.has_filter_feature());
    }

    #[test]
    fn rejects_truncated_image() {
        assert_eq!(VaFsImage::open_memory(&[]).unwrap_err(), OsError::ProtocolError);
    }

    #[test]
    fn file_open_resolves_absolute_path_directly() {
        let data = ImageBuilder::new()
            .subdirectory("services", |d| d.file("echo", b"ping\npng"))
            .build();
        let image = VaFsImage::open_memory(&data).unwrap();
        let mut file = image.file_open("/services/echo").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"ping\npng");
    }
}
