//! Errors raised while building, loading, or rendering documents.

use std::path::Path;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::error_codes;

/// Errors produced by the document model and serializer.
///
/// Every variant names the field, section, or path it concerns so callers can
/// report the offending input without inspecting the document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("[TABDOC_CFG_001] invalid value '{value}' for {field}: {reason}")]
    Configuration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("[TABDOC_DOC_001] {section} already exists")]
    AlreadyExists { section: String },

    #[error("[TABDOC_DOC_002] no {kind} named '{name}'")]
    NoMatch { kind: &'static str, name: String },

    #[error("[TABDOC_DOC_003] {feature} is not supported by the {dialect} dialect")]
    UnsupportedVersion {
        feature: &'static str,
        dialect: Dialect,
    },

    #[error("[TABDOC_XML_001] XML error in {section}: {message}")]
    Xml { section: String, message: String },

    #[error("[TABDOC_IO_001] I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[TABDOC_EXT_001] extract generation failed for {filename}: {source}")]
    ExtractGeneration {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

impl DocumentError {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::Configuration { .. } => error_codes::DOC_CONFIGURATION,
            DocumentError::AlreadyExists { .. } => error_codes::DOC_ALREADY_EXISTS,
            DocumentError::NoMatch { .. } => error_codes::DOC_NO_MATCH,
            DocumentError::UnsupportedVersion { .. } => error_codes::DOC_UNSUPPORTED_VERSION,
            DocumentError::Xml { .. } => error_codes::DOC_XML,
            DocumentError::Io { .. } => error_codes::DOC_IO,
            DocumentError::ExtractGeneration { .. } => error_codes::DOC_EXTRACT_GENERATION,
        }
    }

    pub(crate) fn config(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DocumentError::Configuration {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn xml(section: impl Into<String>, message: impl ToString) -> Self {
        DocumentError::Xml {
            section: section.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        DocumentError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Builds the `Configuration` error for a string that names no enum variant.
pub(crate) fn unknown_variant(field: &'static str, value: &str, expected: &[&str]) -> DocumentError {
    DocumentError::config(field, value, format!("expected one of: {}", expected.join(", ")))
}
