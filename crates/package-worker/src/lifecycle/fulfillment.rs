//! Fulfillment helpers: compare the target's metadata sidecar against the
//! current source version.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use super::Fulfillment;
use crate::accessor::{fetch_metadata_as, AccessorHandle};
use crate::error::{Rejection, WorkerResult};
use crate::version::{hash_version, UniversalVersion};

/// Metadata records that remember which source version produced the target.
pub trait SourceVersioned {
    fn source_version_hash(&self) -> Option<&str>;
}

/// The sidecar most handlers store beside their target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub source_version_hash: String,
    #[serde(default)]
    pub source_version: Option<UniversalVersion>,
}

impl VersionMetadata {
    pub fn new(source_version: UniversalVersion) -> Self {
        Self {
            source_version_hash: hash_version(&source_version),
            source_version: Some(source_version),
        }
    }
}

impl SourceVersioned for VersionMetadata {
    fn source_version_hash(&self) -> Option<&str> {
        Some(&self.source_version_hash)
    }
}

/// Fulfilled when the target's sidecar records `source_version_hash`. A
/// match touches nothing. When the target was fulfilled before and no
/// longer matches, the stale package is removed (best effort).
pub async fn check_target_fulfilled<M>(
    target: &dyn AccessorHandle,
    source_version_hash: &str,
    was_fulfilled: bool,
) -> WorkerResult<Fulfillment>
where
    M: DeserializeOwned + SourceVersioned,
{
    let metadata = fetch_metadata_as::<M>(target).await?;
    let rejection = match metadata.as_ref().map(SourceVersioned::source_version_hash) {
        Some(Some(hash)) if hash == source_version_hash => return Ok(Fulfillment::Fulfilled),
        Some(recorded) => Rejection::known(
            "Target version doesn't match source version",
            format!(
                "Target records source version {}, source is at {}",
                recorded.unwrap_or("(none)"),
                source_version_hash
            ),
        ),
        None => Rejection::known(
            "Target package not found",
            format!("No metadata found for accessor \"{}\"", target.accessor_id()),
        ),
    };

    if was_fulfilled {
        info!(accessor = %target.accessor_id(), "Removing outdated target package");
        if let Err(err) = target.remove_package("Target no longer matches source").await {
            warn!(accessor = %target.accessor_id(), error = %err, "Failed to remove outdated target");
        }
    }
    Ok(Fulfillment::NotFulfilled(rejection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionValue;

    #[test]
    fn test_metadata_hash_follows_version() {
        let mut version = UniversalVersion::new();
        version.set("fileSize", "File size", Some(VersionValue::Int(100)));
        let metadata = VersionMetadata::new(version.clone());
        assert_eq!(metadata.source_version_hash, hash_version(&version));

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json["sourceVersionHash"].is_string());
    }
}
