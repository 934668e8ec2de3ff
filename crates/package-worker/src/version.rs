//! Package versions and cross-backend version comparison
//!
//! Every backend reports a different kind of version record (file size and
//! mtime, HTTP etag and content-length, Quantel clone id, JSON payload size).
//! Both actual and expected versions are normalized into a [`UniversalVersion`],
//! a map of named scalar properties, and compared field by field. A property
//! marked `omit` on either side is skipped.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CheckResult, Rejection};

/// Version record reported by a backend for an existing package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageVersion {
    #[serde(rename_all = "camelCase")]
    File {
        file_size: u64,
        /// Milliseconds since the Unix epoch.
        modified_date: i64,
    },
    #[serde(rename_all = "camelCase")]
    Http {
        #[serde(default)]
        content_type: Option<String>,
        #[serde(default)]
        content_length: Option<u64>,
        #[serde(default)]
        modified_date: Option<i64>,
        #[serde(default)]
        etags: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Quantel {
        #[serde(default)]
        clone_id: Option<u64>,
        #[serde(default)]
        guid: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        frames: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Json { payload_size: u64 },
}

impl PackageVersion {
    /// Last modification time, when the backend reports one.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        let millis = match self {
            PackageVersion::File { modified_date, .. } => Some(*modified_date),
            PackageVersion::Http { modified_date, .. } => *modified_date,
            PackageVersion::Quantel { .. } | PackageVersion::Json { .. } => None,
        }?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn to_universal(&self) -> UniversalVersion {
        let mut version = UniversalVersion::new();
        match self {
            PackageVersion::File {
                file_size,
                modified_date,
            } => {
                version.set("fileSize", "File size", Some(VersionValue::from(*file_size)));
                version.set(
                    "modifiedDate",
                    "Modified date",
                    Some(VersionValue::Int(*modified_date)),
                );
            }
            PackageVersion::Http {
                content_type,
                content_length,
                modified_date,
                etags,
            } => {
                version.set(
                    "contentType",
                    "Content type",
                    content_type.clone().map(VersionValue::Text),
                );
                version.set(
                    "contentLength",
                    "Content length",
                    content_length.map(VersionValue::from),
                );
                version.set(
                    "modifiedDate",
                    "Modified date",
                    modified_date.map(VersionValue::Int),
                );
                let etags = (!etags.is_empty()).then(|| VersionValue::Text(etags.join(",")));
                version.set("etags", "ETags", etags);
            }
            PackageVersion::Quantel {
                clone_id,
                guid,
                title,
                frames,
            } => {
                version.set("cloneId", "Clone id", clone_id.map(VersionValue::from));
                version.set("guid", "GUID", guid.clone().map(VersionValue::Text));
                version.set("title", "Title", title.clone().map(VersionValue::Text));
                version.set("frames", "Frames", frames.map(VersionValue::from));
            }
            PackageVersion::Json { payload_size } => {
                version.set(
                    "payloadSize",
                    "Payload size",
                    Some(VersionValue::from(*payload_size)),
                );
            }
        }
        version
    }
}

/// What the Expectation Manager expects a package version to be.
/// Unset fields are not compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectedVersion {
    #[serde(rename_all = "camelCase")]
    File {
        #[serde(default)]
        file_size: Option<u64>,
        #[serde(default)]
        modified_date: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Http {
        #[serde(default)]
        content_type: Option<String>,
        #[serde(default)]
        content_length: Option<u64>,
        #[serde(default)]
        modified_date: Option<i64>,
        #[serde(default)]
        etags: Option<Vec<String>>,
    },
    #[serde(rename_all = "camelCase")]
    Quantel {
        #[serde(default)]
        clone_id: Option<u64>,
        #[serde(default)]
        guid: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        frames: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Json {
        #[serde(default)]
        payload_size: Option<u64>,
    },
}

impl ExpectedVersion {
    pub fn to_universal(&self) -> UniversalVersion {
        let mut version = UniversalVersion::new();
        match self {
            ExpectedVersion::File {
                file_size,
                modified_date,
            } => {
                version.expect("fileSize", "File size", file_size.map(VersionValue::from));
                version.expect(
                    "modifiedDate",
                    "Modified date",
                    modified_date.map(VersionValue::Int),
                );
            }
            ExpectedVersion::Http {
                content_type,
                content_length,
                modified_date,
                etags,
            } => {
                version.expect(
                    "contentType",
                    "Content type",
                    content_type.clone().map(VersionValue::Text),
                );
                version.expect(
                    "contentLength",
                    "Content length",
                    content_length.map(VersionValue::from),
                );
                version.expect(
                    "modifiedDate",
                    "Modified date",
                    modified_date.map(VersionValue::Int),
                );
                version.expect(
                    "etags",
                    "ETags",
                    etags.as_ref().map(|tags| VersionValue::Text(tags.join(","))),
                );
            }
            ExpectedVersion::Quantel {
                clone_id,
                guid,
                title,
                frames,
            } => {
                version.expect("cloneId", "Clone id", clone_id.map(VersionValue::from));
                version.expect("guid", "GUID", guid.clone().map(VersionValue::Text));
                version.expect("title", "Title", title.clone().map(VersionValue::Text));
                version.expect("frames", "Frames", frames.map(VersionValue::from));
            }
            ExpectedVersion::Json { payload_size } => {
                version.expect(
                    "payloadSize",
                    "Payload size",
                    payload_size.map(VersionValue::from),
                );
            }
        }
        version
    }
}

/// A scalar version property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

impl From<u64> for VersionValue {
    fn from(value: u64) -> Self {
        // Sizes and counts beyond i64::MAX do not occur in practice; saturate.
        VersionValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl std::fmt::Display for VersionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionValue::Flag(b) => write!(f, "{b}"),
            VersionValue::Int(i) => write!(f, "{i}"),
            VersionValue::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// One named property of a [`UniversalVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionProperty {
    /// Human-readable property name, used in mismatch reasons.
    pub name: String,
    pub value: Option<VersionValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub omit: bool,
}

/// Normalized version: property key → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniversalVersion {
    properties: BTreeMap<String, VersionProperty>,
}

impl UniversalVersion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property that always takes part in comparisons.
    pub fn set(&mut self, key: &str, name: &str, value: Option<VersionValue>) {
        self.properties.insert(
            key.to_string(),
            VersionProperty {
                name: name.to_string(),
                value,
                omit: false,
            },
        );
    }

    /// Set an expected property; an unset expectation is omitted from comparisons.
    pub fn expect(&mut self, key: &str, name: &str, value: Option<VersionValue>) {
        let omit = value.is_none();
        self.properties.insert(
            key.to_string(),
            VersionProperty {
                name: name.to_string(),
                value,
                omit,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&VersionProperty> {
        self.properties.get(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties that differ between `self` and `other`, as
    /// `(name, self value, other value)`. Omitted properties are skipped;
    /// a property missing on one side compares as unset.
    fn mismatches(&self, other: &UniversalVersion) -> Vec<(String, String, String)> {
        let mut keys: Vec<&String> = self.properties.keys().collect();
        keys.extend(other.properties.keys().filter(|k| !self.properties.contains_key(*k)));

        let mut out = Vec::new();
        for key in keys {
            let a = self.properties.get(key);
            let b = other.properties.get(key);
            if a.is_some_and(|p| p.omit) || b.is_some_and(|p| p.omit) {
                continue;
            }
            let a_value = a.and_then(|p| p.value.as_ref());
            let b_value = b.and_then(|p| p.value.as_ref());
            if a_value != b_value {
                let name = a.or(b).map(|p| p.name.clone()).unwrap_or_else(|| key.clone());
                out.push((name, render(a_value), render(b_value)));
            }
        }
        out
    }
}

fn render(value: Option<&VersionValue>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

/// Compare two normalized versions field by field.
pub fn compare_universal_versions(a: &UniversalVersion, b: &UniversalVersion) -> CheckResult {
    let mismatches = a.mismatches(b);
    if mismatches.is_empty() {
        return Ok(());
    }
    let details: Vec<String> = mismatches
        .iter()
        .map(|(name, a, b)| format!("{name}: {a} vs {b}"))
        .collect();
    Err(Rejection::known(
        "Package version differs",
        format!("Mismatch on properties: {}", details.join(", ")),
    ))
}

/// Compare a backend's actual version against what the expectation asks for.
pub fn compare_actual_expect_versions(
    actual: &PackageVersion,
    expected: &ExpectedVersion,
) -> CheckResult {
    let actual = actual.to_universal();
    let expected = expected.to_universal();
    let mismatches = actual.mismatches(&expected);
    if mismatches.is_empty() {
        return Ok(());
    }
    let details: Vec<String> = mismatches
        .iter()
        .map(|(name, actual, expected)| format!("{name}: actual {actual}, expected {expected}"))
        .collect();
    Err(Rejection::known(
        "Actual version doesn't match expected version",
        format!("Mismatch on properties: {}", details.join(", ")),
    ))
}

/// Stable content hash of a version, used as the job's `actualVersionHash`
/// and stored in target metadata.
pub fn hash_version(version: &UniversalVersion) -> String {
    // BTreeMap keeps key order stable, so the serialized form is canonical.
    let canonical = serde_json::to_vec(version).unwrap_or_default();
    blake3::hash(&canonical).to_hex().to_string()
}
