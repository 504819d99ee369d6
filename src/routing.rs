//! Routing table mapping logical image types to provider candidates.
//!
//! The table is loaded once at orchestration start and is immutable for the
//! process lifetime. Each logical image type resolves to an ordered list of
//! [`CandidateMapping`] entries; many candidates may satisfy one type.

use std::collections::BTreeMap;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time-to-live applied when a candidate does not specify one, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// One provider-specific way to satisfy a logical image type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CandidateMapping {
    /// Provider name; a key into the registered-provider set.
    pub provider: String,
    /// Provider-native image identifier.
    pub image: String,
    /// Provider-native size or shape identifier.
    pub size: String,
    /// Selection priority; lower values are preferred, ties preserve the
    /// original list order.
    pub priority: i64,
    /// Optional time-to-live in seconds; [`DEFAULT_TTL_SECS`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl CandidateMapping {
    /// Returns the candidate's TTL, applying the default when unset.
    #[must_use]
    pub const fn effective_ttl(&self) -> u64 {
        match self.ttl {
            Some(value) => value,
            None => DEFAULT_TTL_SECS,
        }
    }
}

/// Immutable mapping from logical image type to ordered candidate lists.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    entries: BTreeMap<String, Vec<CandidateMapping>>,
}

impl RoutingTable {
    /// Builds a table from pre-validated entries.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Invalid`] when any entry fails structural
    /// validation.
    pub fn new(entries: BTreeMap<String, Vec<CandidateMapping>>) -> Result<Self, RoutingError> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    /// Parses a table from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Parse`] when the document is malformed and
    /// [`RoutingError::Invalid`] when it fails structural validation.
    pub fn from_json_str(document: &str) -> Result<Self, RoutingError> {
        let table: Self =
            serde_json::from_str(document).map_err(|err| RoutingError::Parse {
                message: err.to_string(),
            })?;
        table.validate()?;
        Ok(table)
    }

    /// Loads and parses a table from a JSON file.
    ///
    /// A missing or malformed file is fatal to orchestration construction;
    /// there is no fallback table.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Read`] when the file cannot be read,
    /// [`RoutingError::Parse`] when it is malformed, and
    /// [`RoutingError::Invalid`] when validation fails.
    pub fn load(path: &Utf8Path) -> Result<Self, RoutingError> {
        let document = read_to_string_ambient(path).map_err(|message| RoutingError::Read {
            path: path.to_string(),
            message,
        })?;
        Self::from_json_str(&document)
    }

    /// Returns the ordered candidates for a logical image type, or `None`
    /// when the type has no routing entry.
    #[must_use]
    pub fn candidates(&self, image_type: &str) -> Option<&[CandidateMapping]> {
        self.entries.get(image_type).map(Vec::as_slice)
    }

    /// Lists the known logical image types in sorted order.
    #[must_use]
    pub fn image_types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn validate(&self) -> Result<(), RoutingError> {
        for (image_type, candidates) in &self.entries {
            if image_type.trim().is_empty() {
                return Err(RoutingError::Invalid {
                    image_type: image_type.clone(),
                    message: String::from("image type name is empty"),
                });
            }
            if candidates.is_empty() {
                return Err(RoutingError::Invalid {
                    image_type: image_type.clone(),
                    message: String::from("candidate list is empty"),
                });
            }
            for candidate in candidates {
                Self::validate_candidate(image_type, candidate)?;
            }
        }
        Ok(())
    }

    fn validate_candidate(
        image_type: &str,
        candidate: &CandidateMapping,
    ) -> Result<(), RoutingError> {
        for (field, value) in [
            ("provider", &candidate.provider),
            ("image", &candidate.image),
            ("size", &candidate.size),
        ] {
            if value.trim().is_empty() {
                return Err(RoutingError::Invalid {
                    image_type: image_type.to_owned(),
                    message: format!("candidate {field} is empty"),
                });
            }
        }
        Ok(())
    }
}

/// Errors raised while loading or validating a routing table.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RoutingError {
    /// Raised when the table file cannot be read.
    #[error("failed to read routing table `{path}`: {message}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the table document cannot be parsed.
    #[error("failed to parse routing table: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when the table is structurally invalid.
    #[error("invalid routing entry for image type '{image_type}': {message}")]
    Invalid {
        /// Image type whose entry failed validation.
        image_type: String,
        /// Description of the violation.
        message: String,
    },
}

fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path}"))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: &str, priority: i64) -> CandidateMapping {
        CandidateMapping {
            provider: provider.to_owned(),
            image: String::from("img"),
            size: String::from("small"),
            priority,
            ttl: None,
        }
    }

    #[test]
    fn effective_ttl_defaults_to_one_hour() {
        assert_eq!(candidate("p1", 1).effective_ttl(), DEFAULT_TTL_SECS);
        let explicit = CandidateMapping {
            ttl: Some(7200),
            ..candidate("p1", 1)
        };
        assert_eq!(explicit.effective_ttl(), 7200);
    }

    #[test]
    fn parses_table_from_json() {
        let table = RoutingTable::from_json_str(
            r#"{
                "ubuntu-22-small": [
                    {"provider": "p1", "image": "img-a", "size": "s", "priority": 1},
                    {"provider": "p2", "image": "img-b", "size": "s", "priority": 2, "ttl": 7200}
                ]
            }"#,
        )
        .unwrap_or_else(|err| panic!("table should parse: {err}"));
        let candidates = table
            .candidates("ubuntu-22-small")
            .unwrap_or_else(|| panic!("image type should resolve"));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].provider, "p1");
        assert_eq!(candidates[1].ttl, Some(7200));
        assert_eq!(table.image_types(), vec!["ubuntu-22-small"]);
    }

    #[test]
    fn unknown_image_type_resolves_to_none() {
        let table = RoutingTable::default();
        assert_eq!(table.candidates("nonexistent"), None);
    }

    #[test]
    fn rejects_malformed_document() {
        let result = RoutingTable::from_json_str("{not json");
        assert!(matches!(result, Err(RoutingError::Parse { .. })));
    }

    #[test]
    fn rejects_empty_candidate_list() {
        let result = RoutingTable::from_json_str(r#"{"ubuntu-22-small": []}"#);
        assert!(matches!(
            result,
            Err(RoutingError::Invalid { ref image_type, .. }) if image_type == "ubuntu-22-small"
        ));
    }

    #[test]
    fn rejects_blank_provider_name() {
        let result = RoutingTable::from_json_str(
            r#"{"t": [{"provider": " ", "image": "i", "size": "s", "priority": 1}]}"#,
        );
        assert!(matches!(result, Err(RoutingError::Invalid { .. })));
    }
}
