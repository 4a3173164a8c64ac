//! Stable error codes surfaced by `code()` on every error type.

pub const DOC_CONFIGURATION: &str = "TABDOC_CFG_001";
pub const DOC_ALREADY_EXISTS: &str = "TABDOC_DOC_001";
pub const DOC_NO_MATCH: &str = "TABDOC_DOC_002";
pub const DOC_UNSUPPORTED_VERSION: &str = "TABDOC_DOC_003";
pub const DOC_XML: &str = "TABDOC_XML_001";
pub const DOC_IO: &str = "TABDOC_IO_001";
pub const DOC_EXTRACT_GENERATION: &str = "TABDOC_EXT_001";

pub const CONTAINER_IO: &str = "TABDOC_PKG_001";
pub const CONTAINER_ZIP: &str = "TABDOC_PKG_002";
pub const CONTAINER_NOT_ZIP: &str = "TABDOC_PKG_003";
pub const CONTAINER_TOO_MANY_ENTRIES: &str = "TABDOC_PKG_004";
pub const CONTAINER_PART_TOO_LARGE: &str = "TABDOC_PKG_005";
pub const CONTAINER_TOTAL_TOO_LARGE: &str = "TABDOC_PKG_006";

pub const PACKAGE_MISSING_DOCUMENT: &str = "TABDOC_PKG_010";
pub const PACKAGE_AMBIGUOUS_DOCUMENT: &str = "TABDOC_PKG_011";
pub const PACKAGE_NAMES_EXHAUSTED: &str = "TABDOC_PKG_012";
pub const PACKAGE_IO: &str = "TABDOC_PKG_013";
pub const PACKAGE_CONFIG: &str = "TABDOC_CFG_002";
