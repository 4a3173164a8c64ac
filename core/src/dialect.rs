//! Schema dialects of the data-source document format.
//!
//! The format went through three structurally different revisions. Instead of
//! a class per revision, every dialect-dependent choice is a lookup on
//! [`Dialect`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// A single direct `<connection>`; no named-connection wrapper.
    Legacy,
    /// Federated connections with data-engine (`.tde`) extracts.
    FederatedV1,
    /// Federated connections with hyper (`.hyper`) extracts.
    FederatedV2,
}

impl Dialect {
    /// Classifies a version marker such as `9.3`, `10.2` or `18.1`.
    ///
    /// The same rule is used when loading a snapshot and when creating a
    /// document from a version string: major below 10 is legacy, 10.0 through
    /// 10.4 is federated-v1, everything newer is federated-v2.
    pub fn from_version(version: &str) -> Result<Dialect, DocumentError> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::config(
                "version",
                version,
                "a version marker is required to choose a dialect",
            ));
        }

        let mut parts = trimmed.split('.');
        let major = parse_component(parts.next(), version)?;
        let minor = match parts.next() {
            Some(part) => parse_component(Some(part), version)?,
            None => 0,
        };

        Ok(if major < 10 {
            Dialect::Legacy
        } else if major == 10 && minor < 5 {
            Dialect::FederatedV1
        } else {
            Dialect::FederatedV2
        })
    }

    /// Version marker written into documents created from scratch.
    pub fn version(self) -> &'static str {
        match self {
            Dialect::Legacy => "9.3",
            Dialect::FederatedV1 => "10.0",
            Dialect::FederatedV2 => "18.1",
        }
    }

    pub fn is_federated(self) -> bool {
        !matches!(self, Dialect::Legacy)
    }

    pub fn extract_extension(self) -> &'static str {
        match self {
            Dialect::FederatedV2 => "hyper",
            Dialect::Legacy | Dialect::FederatedV1 => "tde",
        }
    }

    pub fn extract_connection_class(self) -> &'static str {
        match self {
            Dialect::FederatedV2 => "hyper",
            Dialect::Legacy | Dialect::FederatedV1 => "dataengine",
        }
    }

    pub fn supports_inline_extract(self) -> bool {
        self.is_federated()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Legacy => "legacy",
            Dialect::FederatedV1 => "federated-v1",
            Dialect::FederatedV2 => "federated-v2",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Dialect::Legacy),
            "federated-v1" => Ok(Dialect::FederatedV1),
            "federated-v2" => Ok(Dialect::FederatedV2),
            other => Err(crate::error::unknown_variant(
                "dialect",
                other,
                &["legacy", "federated-v1", "federated-v2"],
            )),
        }
    }
}

fn parse_component(part: Option<&str>, version: &str) -> Result<u32, DocumentError> {
    part.and_then(|p| p.trim().parse::<u32>().ok())
        .ok_or_else(|| DocumentError::config("version", version, "expected <major>.<minor>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_boundaries() {
        assert_eq!(Dialect::from_version("9.3").unwrap(), Dialect::Legacy);
        assert_eq!(Dialect::from_version("10.0").unwrap(), Dialect::FederatedV1);
        assert_eq!(Dialect::from_version("10.4").unwrap(), Dialect::FederatedV1);
        assert_eq!(Dialect::from_version("10.5").unwrap(), Dialect::FederatedV2);
        assert_eq!(Dialect::from_version("18.1").unwrap(), Dialect::FederatedV2);
        assert_eq!(Dialect::from_version("2020.1").unwrap(), Dialect::FederatedV2);
        assert_eq!(Dialect::from_version("10").unwrap(), Dialect::FederatedV1);
    }

    #[test]
    fn canonical_versions_classify_to_themselves() {
        for dialect in [Dialect::Legacy, Dialect::FederatedV1, Dialect::FederatedV2] {
            assert_eq!(Dialect::from_version(dialect.version()).unwrap(), dialect);
        }
    }

    #[test]
    fn empty_or_garbage_version_is_a_configuration_error() {
        for bad in ["", "  ", "ten.one", "10.x"] {
            let err = Dialect::from_version(bad).expect_err("should reject");
            assert!(matches!(err, DocumentError::Configuration { field: "version", .. }));
        }
    }

    #[test]
    fn extract_properties_follow_dialect() {
        assert_eq!(Dialect::FederatedV2.extract_extension(), "hyper");
        assert_eq!(Dialect::FederatedV1.extract_extension(), "tde");
        assert_eq!(Dialect::Legacy.extract_extension(), "tde");
        assert!(!Dialect::Legacy.supports_inline_extract());
        assert!(Dialect::FederatedV1.supports_inline_extract());
    }
}
