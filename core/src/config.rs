//! Configuration for the container packager.
//!
//! `PackageConfig` collects the archive limits, paths and naming knobs the
//! packager uses, so none of them are hardcoded at call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::ContainerLimits;
use crate::error_codes;
use crate::serializer::DEFAULT_EXTRACT_DIR;

/// Compression applied to members the packager writes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveCompression {
    Stored,
    Deflated,
}

impl ArchiveCompression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            ArchiveCompression::Stored => zip::CompressionMethod::Stored,
            ArchiveCompression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    pub limits: ContainerLimits,
    /// Archive directory generated extracts are stored under.
    pub extract_dir: String,
    /// Prefix of the scratch directories created in the working directory.
    pub scratch_prefix: String,
    /// Highest ordinal tried when probing for a free output filename.
    pub max_name_probes: u32,
    pub compression: ArchiveCompression,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            limits: ContainerLimits::default(),
            extract_dir: DEFAULT_EXTRACT_DIR.to_string(),
            scratch_prefix: ".tabdoc-".to_string(),
            max_name_probes: 10_000,
            compression: ArchiveCompression::Deflated,
        }
    }
}

impl PackageConfig {
    pub fn builder() -> PackageConfigBuilder {
        PackageConfigBuilder {
            inner: PackageConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_not_blank(&self.extract_dir, "extract_dir")?;
        ensure_not_blank(&self.scratch_prefix, "scratch_prefix")?;

        let dir = self.extract_dir.as_str();
        if dir.starts_with('/')
            || dir.starts_with('\\')
            || dir.split(['/', '\\']).any(|part| part == "..")
        {
            return Err(ConfigError::InvalidExtractDir {
                value: self.extract_dir.clone(),
            });
        }
        if self.scratch_prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidScratchPrefix {
                value: self.scratch_prefix.clone(),
            });
        }

        ensure_positive(self.max_name_probes as u64, "max_name_probes")?;
        ensure_positive(self.limits.max_entries as u64, "limits.max_entries")?;
        ensure_positive(
            self.limits.max_part_uncompressed_bytes,
            "limits.max_part_uncompressed_bytes",
        )?;
        ensure_positive(
            self.limits.max_total_uncompressed_bytes,
            "limits.max_total_uncompressed_bytes",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("[TABDOC_CFG_002] {field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("[TABDOC_CFG_002] {field} must be greater than zero (got {value})")]
    NonPositiveLimit { field: &'static str, value: u64 },
    #[error("[TABDOC_CFG_002] extract_dir must be a relative archive path (got '{value}')")]
    InvalidExtractDir { value: String },
    #[error("[TABDOC_CFG_002] scratch_prefix must not contain path separators (got '{value}')")]
    InvalidScratchPrefix { value: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        error_codes::PACKAGE_CONFIG
    }
}

fn ensure_not_blank(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField { field });
    }
    Ok(())
}

fn ensure_positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositiveLimit { field, value });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PackageConfigBuilder {
    inner: PackageConfig,
}

impl Default for PackageConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageConfigBuilder {
    pub fn new() -> Self {
        PackageConfig::builder()
    }

    pub fn limits(mut self, value: ContainerLimits) -> Self {
        self.inner.limits = value;
        self
    }

    pub fn extract_dir(mut self, value: impl Into<String>) -> Self {
        self.inner.extract_dir = value.into();
        self
    }

    pub fn scratch_prefix(mut self, value: impl Into<String>) -> Self {
        self.inner.scratch_prefix = value.into();
        self
    }

    pub fn max_name_probes(mut self, value: u32) -> Self {
        self.inner.max_name_probes = value;
        self
    }

    pub fn compression(mut self, value: ArchiveCompression) -> Self {
        self.inner.compression = value;
        self
    }

    pub fn build(self) -> Result<PackageConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PackageConfig::default();
        assert_eq!(cfg.extract_dir, "Data/Extracts");
        assert_eq!(cfg.max_name_probes, 10_000);
        assert_eq!(cfg.compression, ArchiveCompression::Deflated);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip_preserves_defaults() {
        let cfg = PackageConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize default config");
        let parsed: PackageConfig = serde_json::from_str(&json).expect("deserialize default config");
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PackageConfig =
            serde_json::from_str(r#"{ "compression": "stored", "max_name_probes": 3 }"#)
                .expect("deserialize partial config");
        assert_eq!(cfg.compression, ArchiveCompression::Stored);
        assert_eq!(cfg.max_name_probes, 3);
        assert_eq!(cfg.scratch_prefix, ".tabdoc-");
    }

    #[test]
    fn builder_rejects_escaping_extract_dir() {
        for bad in ["../Extracts", "/abs", "Data/../../x"] {
            let err = PackageConfig::builder()
                .extract_dir(bad)
                .build()
                .expect_err("builder should reject path");
            assert!(matches!(err, ConfigError::InvalidExtractDir { .. }), "{bad}");
        }
    }

    #[test]
    fn builder_rejects_zero_limits_and_blank_fields() {
        let err = PackageConfig::builder()
            .max_name_probes(0)
            .build()
            .expect_err("zero probes");
        assert_eq!(
            err,
            ConfigError::NonPositiveLimit {
                field: "max_name_probes",
                value: 0
            }
        );
        let err = PackageConfig::builder()
            .scratch_prefix("  ")
            .build()
            .expect_err("blank prefix");
        assert_eq!(err.code(), error_codes::PACKAGE_CONFIG);
    }
}
