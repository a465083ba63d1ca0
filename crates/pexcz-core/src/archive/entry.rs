//! Entry descriptors produced by the enumerator

use serde::{Serialize, Serializer};
use zip::read::ZipFile;
use zip::CompressionMethod;

/// Read-only view of one record inside an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Position in the archive's central directory
    pub index: usize,
    /// Archive-relative path; directories end with `/`
    pub name: String,
    /// Whether this is a directory entry
    pub is_dir: bool,
    /// Compression method the entry is stored with
    #[serde(serialize_with = "serialize_method")]
    pub compression: CompressionMethod,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Unix permissions (if recorded)
    pub unix_mode: Option<u32>,
    /// Offset of the local header from the start of the file
    #[serde(skip)]
    pub header_start: u64,
}

impl Entry {
    pub(crate) fn from_zip_file(index: usize, file: &ZipFile<'_>) -> Self {
        Self {
            index,
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            compression: file.compression(),
            size: file.size(),
            compressed_size: file.compressed_size(),
            unix_mode: file.unix_mode(),
            header_start: file.header_start(),
        }
    }
}

fn serialize_method<S: Serializer>(
    method: &CompressionMethod,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&method_name(*method))
}

/// Human readable name of a zip compression method
pub fn method_name(method: CompressionMethod) -> String {
    match method {
        CompressionMethod::Stored => "stored".to_string(),
        CompressionMethod::Deflated => "deflated".to_string(),
        CompressionMethod::Bzip2 => "bzip2".to_string(),
        CompressionMethod::Zstd => "zstd".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}
