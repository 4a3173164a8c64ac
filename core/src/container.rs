//! Zip container access with size limits.
//!
//! Wraps a `ZipArchive` over any seekable reader and enforces entry-count and
//! uncompressed-size limits before member bytes are read into memory.

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error_codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLimits {
    pub max_entries: usize,
    pub max_part_uncompressed_bytes: u64,
    pub max_total_uncompressed_bytes: u64,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_part_uncompressed_bytes: 512 * 1024 * 1024,
            max_total_uncompressed_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContainerError {
    #[error("[TABDOC_PKG_001] I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("[TABDOC_PKG_002] ZIP error: {0}")]
    Zip(String),
    #[error("[TABDOC_PKG_003] not a ZIP container")]
    NotZipContainer,
    #[error("[TABDOC_PKG_004] archive has too many entries: {entries} (limit: {max_entries})")]
    TooManyEntries { entries: usize, max_entries: usize },
    #[error("[TABDOC_PKG_005] member '{path}' is too large: {size} bytes (limit: {limit} bytes)")]
    PartTooLarge { path: String, size: u64, limit: u64 },
    #[error("[TABDOC_PKG_006] total uncompressed size exceeds limit: would exceed {limit} bytes")]
    TotalTooLarge { limit: u64 },
    #[error("[TABDOC_PKG_002] failed to read ZIP entry '{path}': {reason}")]
    ZipRead { path: String, reason: String },
    #[error("[TABDOC_PKG_002] member not found in archive: {path}")]
    FileNotFound { path: String },
}

impl ContainerError {
    pub fn code(&self) -> &'static str {
        match self {
            ContainerError::Io(_) => error_codes::CONTAINER_IO,
            ContainerError::Zip(_) => error_codes::CONTAINER_ZIP,
            ContainerError::NotZipContainer => error_codes::CONTAINER_NOT_ZIP,
            ContainerError::TooManyEntries { .. } => error_codes::CONTAINER_TOO_MANY_ENTRIES,
            ContainerError::PartTooLarge { .. } => error_codes::CONTAINER_PART_TOO_LARGE,
            ContainerError::TotalTooLarge { .. } => error_codes::CONTAINER_TOTAL_TOO_LARGE,
            ContainerError::ZipRead { .. } => error_codes::CONTAINER_ZIP,
            ContainerError::FileNotFound { .. } => error_codes::CONTAINER_ZIP,
        }
    }
}

fn read_error(name: &str, err: ZipError) -> ContainerError {
    match err {
        ZipError::FileNotFound => ContainerError::FileNotFound {
            path: name.to_string(),
        },
        other => ContainerError::ZipRead {
            path: name.to_string(),
            reason: other.to_string(),
        },
    }
}

pub(crate) trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub struct ZipContainer {
    pub(crate) archive: ZipArchive<Box<dyn ReadSeek>>,
    names: Vec<String>,
    limits: ContainerLimits,
    total_read: u64,
}

impl ZipContainer {
    pub fn open_from_reader<R: Read + Seek + 'static>(
        reader: R,
    ) -> Result<ZipContainer, ContainerError> {
        Self::open_from_reader_with_limits(reader, ContainerLimits::default())
    }

    pub fn open_from_reader_with_limits<R: Read + Seek + 'static>(
        reader: R,
        limits: ContainerLimits,
    ) -> Result<ZipContainer, ContainerError> {
        let reader: Box<dyn ReadSeek> = Box::new(reader);
        let mut archive = ZipArchive::new(reader).map_err(|err| match err {
            ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_) => {
                ContainerError::NotZipContainer
            }
            ZipError::Io(e) => ContainerError::Io(e),
            other => ContainerError::Zip(other.to_string()),
        })?;

        if archive.len() > limits.max_entries {
            return Err(ContainerError::TooManyEntries {
                entries: archive.len(),
                max_entries: limits.max_entries,
            });
        }

        let mut names = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let entry = archive
                .by_index_raw(idx)
                .map_err(|e| ContainerError::Zip(e.to_string()))?;
            names.push(entry.name().to_string());
        }

        Ok(ZipContainer {
            archive,
            names,
            limits,
            total_read: 0,
        })
    }

    #[cfg(feature = "std-fs")]
    pub fn open_from_path(
        path: impl AsRef<std::path::Path>,
    ) -> Result<ZipContainer, ContainerError> {
        Self::open_from_path_with_limits(path, ContainerLimits::default())
    }

    #[cfg(feature = "std-fs")]
    pub fn open_from_path_with_limits(
        path: impl AsRef<std::path::Path>,
        limits: ContainerLimits,
    ) -> Result<ZipContainer, ContainerError> {
        let file = std::fs::File::open(path)?;
        Self::open_from_reader_with_limits(file, limits)
    }

    /// Reads a member into memory, counting it against the size limits.
    pub fn read_file_checked(&mut self, name: &str) -> Result<Vec<u8>, ContainerError> {
        let size = self
            .archive
            .by_name(name)
            .map_err(|e| read_error(name, e))?
            .size();

        if size > self.limits.max_part_uncompressed_bytes {
            return Err(ContainerError::PartTooLarge {
                path: name.to_string(),
                size,
                limit: self.limits.max_part_uncompressed_bytes,
            });
        }

        let new_total = self.total_read.saturating_add(size);
        if new_total > self.limits.max_total_uncompressed_bytes {
            return Err(ContainerError::TotalTooLarge {
                limit: self.limits.max_total_uncompressed_bytes,
            });
        }

        let mut file = self.archive.by_name(name).map_err(|e| read_error(name, e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| ContainerError::ZipRead {
                path: name.to_string(),
                reason: e.to_string(),
            })?;

        self.total_read = new_total;
        Ok(buf)
    }

    /// Member names in archive order. Directory entries keep their trailing `/`.
    pub fn member_names(&self) -> &[String] {
        &self.names
    }

    /// Members at the archive root with the given extension, compared
    /// case-insensitively.
    pub fn top_level_members_with_extension(&self, extension: &str) -> Vec<String> {
        let suffix = format!(".{}", extension.to_ascii_lowercase());
        self.names
            .iter()
            .filter(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(&suffix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limits(&self) -> &ContainerLimits {
        &self.limits
    }
}
