//! Accessor handle contract
//!
//! An [`AccessorHandle`] is the runtime capability surface over one
//! [`Accessor`] for one task: bound to the worker, the accessor config and the
//! package content. Handles are created per lookup and never cached; they are
//! cheap to construct, the methods they expose are what touch the backend.
//!
//! Concrete backends (local folder, file share, HTTP, Quantel, ATEM, Core
//! package info) implement [`AccessorHandle`] plus an [`AccessorFactory`] and
//! are registered once in the [`AccessorRegistry`].
//!
//! ## Check layers
//!
//! ```text
//! check_handle_basic / _read / _write        local, synchronous config sanity
//! check_package_read_access                   touches the backend (stat, HEAD)
//! try_package_read                            + package_exists / placeholder info
//! check_package_container_write_access        touches the backend
//! ```

mod registry;
mod stream;

pub use registry::{AccessorRegistry, AccessorRegistryBuilder, StaticAccessor};
pub use stream::{pipe_package, PackageReadStream, PutPackageHandler};

pub use crate::container::AccessType;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::cancelable::CancelableTask;
use crate::container::Accessor;
use crate::error::{CheckResult, Rejection, WorkerError, WorkerResult};
use crate::expectation::WorkOptions;
use crate::version::PackageVersion;
use crate::worker::WorkerContext;

/// Failure of [`AccessorHandle::try_package_read`], with what the backend
/// could still tell about the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadProbeFailure {
    pub rejection: Rejection,
    pub package_exists: bool,
    /// The source is a stand-in for content not materialized yet.
    pub source_is_placeholder: bool,
}

impl ReadProbeFailure {
    pub fn missing(rejection: Rejection) -> Self {
        Self {
            rejection,
            package_exists: false,
            source_is_placeholder: false,
        }
    }
}

/// Opaque backend-specific description for non-stream bulk transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageReadInfo {
    pub access_type: AccessType,
    pub info: serde_json::Value,
}

/// Token returned by [`AccessorHandle::prepare_for_operation`] and consumed
/// by [`AccessorHandle::finalize_package`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageOperation {
    pub id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// Backend-specific state (temporary paths, job ids).
    #[serde(default)]
    pub state: serde_json::Value,
}

impl PackageOperation {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            started_at: Utc::now(),
            state: serde_json::Value::Null,
        }
    }

    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = state;
        self
    }
}

/// Per-lookup context bound into every handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleContext {
    pub expectation_id: Option<String>,
    /// Short description of what the handle is used for, for logs.
    pub usage: String,
}

/// Everything a factory gets to build a handle.
pub struct HandleArguments<'a> {
    pub worker: &'a WorkerContext,
    pub accessor_id: &'a str,
    pub accessor: &'a Accessor,
    pub context: &'a HandleContext,
    pub content: &'a serde_json::Value,
    pub work_options: &'a WorkOptions,
}

/// Capability contract every storage backend implements.
#[async_trait]
pub trait AccessorHandle: Send + Sync {
    fn access_type(&self) -> AccessType;

    fn accessor_id(&self) -> &str;

    /// Config sanity that applies to any use of the handle.
    fn check_handle_basic(&self) -> CheckResult;

    /// Config sanity for reading (e.g. read allowed, path configured).
    fn check_handle_read(&self) -> CheckResult;

    /// Config sanity for writing.
    fn check_handle_write(&self) -> CheckResult;

    /// Whether the package can be read right now.
    async fn check_package_read_access(&self) -> CheckResult;

    /// Try to open the package for reading.
    async fn try_package_read(&self) -> Result<(), ReadProbeFailure>;

    /// Whether the container can be written to right now.
    async fn check_package_container_write_access(&self) -> CheckResult;

    /// Backend-specific version record. Only called once the read checks
    /// above have passed.
    async fn get_package_actual_version(&self) -> WorkerResult<PackageVersion>;

    async fn remove_package(&self, reason: &str) -> WorkerResult<()>;

    async fn get_package_read_stream(&self) -> WorkerResult<PackageReadStream> {
        Err(WorkerError::Unsupported {
            access_type: self.access_type(),
            operation: "getPackageReadStream",
        })
    }

    async fn put_package_stream(&self) -> WorkerResult<PutPackageHandler> {
        Err(WorkerError::Unsupported {
            access_type: self.access_type(),
            operation: "putPackageStream",
        })
    }

    async fn get_package_read_info(&self) -> WorkerResult<PackageReadInfo> {
        Err(WorkerError::Unsupported {
            access_type: self.access_type(),
            operation: "getPackageReadInfo",
        })
    }

    async fn put_package_info(&self, _info: PackageReadInfo) -> WorkerResult<CancelableTask<()>> {
        Err(WorkerError::Unsupported {
            access_type: self.access_type(),
            operation: "putPackageInfo",
        })
    }

    async fn prepare_for_operation(
        &self,
        label: &str,
        _source: Option<&dyn AccessorHandle>,
    ) -> WorkerResult<PackageOperation> {
        Ok(PackageOperation::new(label))
    }

    async fn finalize_package(&self, _operation: PackageOperation) -> WorkerResult<()> {
        Ok(())
    }

    /// Sidecar record stored beside the package, if any.
    async fn fetch_metadata(&self) -> WorkerResult<Option<serde_json::Value>>;

    async fn update_metadata(&self, metadata: serde_json::Value) -> WorkerResult<()>;

    async fn remove_metadata(&self) -> WorkerResult<()>;
}

impl std::fmt::Debug for dyn AccessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorHandle")
            .field("type", &self.access_type())
            .field("accessor_id", &self.accessor_id())
            .finish()
    }
}

/// Builds handles for one access type.
pub trait AccessorFactory: Send + Sync {
    /// Whether this worker can reach the accessor at all.
    fn does_support_access(&self, worker: &WorkerContext, accessor: &Accessor) -> bool {
        accessor.is_reachable_from(&worker.location)
    }

    fn create_handle(&self, args: HandleArguments<'_>) -> WorkerResult<Arc<dyn AccessorHandle>>;
}

/// Fetch the handle's metadata sidecar as a typed record.
pub async fn fetch_metadata_as<M: DeserializeOwned>(
    handle: &dyn AccessorHandle,
) -> WorkerResult<Option<M>> {
    match handle.fetch_metadata().await? {
        None => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Store a typed record as the handle's metadata sidecar.
pub async fn update_metadata_from<M: Serialize>(
    handle: &dyn AccessorHandle,
    metadata: &M,
) -> WorkerResult<()> {
    let value = serde_json::to_value(metadata)?;
    handle.update_metadata(value).await
}
