//! Shared fakes for integration tests: a scriptable in-memory backend, its
//! accessor factory, and a worker wired up with them.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use package_worker::accessor::{AccessorFactory, AccessorHandle, HandleArguments, ReadProbeFailure};
use package_worker::{
    AccessType, Accessor, AccessorKind, AccessorRegistry, CheckResult, ManagerLink, ManagerMessage,
    PackageVersion, Rejection, WorkerConfig, WorkerContext, WorkerError, WorkerLocation,
    WorkerResult,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("package_worker=debug")
        .with_test_writer()
        .try_init();
}

/// How one fake accessor behaves. Everything passes by default.
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    pub fail_basic: bool,
    pub fail_read: bool,
    pub fail_read_access: bool,
    pub fail_write: bool,
    pub fail_write_access: bool,
    pub read_probe_failure: Option<ReadProbeFailure>,
    /// Versions handed out by successive `get_package_actual_version` calls;
    /// the last one repeats.
    pub versions: Vec<PackageVersion>,
    pub read_access_delay: Option<Duration>,
}

/// In-memory state behind every fake handle, keyed by accessor id.
#[derive(Default)]
pub struct FakeBackend {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    version_cursor: Mutex<HashMap<String, usize>>,
    metadata: Mutex<HashMap<String, serde_json::Value>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn configure(&self, accessor_id: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(accessor_id.to_string(), behavior);
    }

    pub fn set_metadata(&self, accessor_id: &str, metadata: serde_json::Value) {
        self.metadata
            .lock()
            .unwrap()
            .insert(accessor_id.to_string(), metadata);
    }

    pub fn metadata(&self, accessor_id: &str) -> Option<serde_json::Value> {
        self.metadata.lock().unwrap().get(accessor_id).cloned()
    }

    /// Every recorded call, as `"<accessor id>:<operation>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, accessor_id: &str, operation: &str) -> bool {
        let entry = format!("{accessor_id}:{operation}");
        self.calls.lock().unwrap().iter().any(|c| *c == entry)
    }

    /// Calls that would change the backend.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| {
                c.ends_with(":removePackage")
                    || c.ends_with(":updateMetadata")
                    || c.ends_with(":removeMetadata")
            })
            .collect()
    }

    fn record(&self, accessor_id: &str, operation: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{accessor_id}:{operation}"));
    }

    fn behavior(&self, accessor_id: &str) -> FakeBehavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(accessor_id)
            .cloned()
            .unwrap_or_default()
    }

    fn next_version(&self, accessor_id: &str) -> Option<PackageVersion> {
        let versions = self.behavior(accessor_id).versions;
        let mut cursors = self.version_cursor.lock().unwrap();
        let cursor = cursors.entry(accessor_id.to_string()).or_insert(0);
        let version = versions.get((*cursor).min(versions.len().saturating_sub(1))).cloned();
        *cursor += 1;
        version
    }
}

fn fail(accessor_id: &str, operation: &str) -> Rejection {
    Rejection::known(
        format!("{operation} failed"),
        format!("{accessor_id} refused {operation}"),
    )
}

pub struct FakeHandle {
    access_type: AccessType,
    accessor_id: String,
    backend: Arc<FakeBackend>,
}

impl FakeHandle {
    fn check(&self, operation: &str, failing: bool) -> CheckResult {
        self.backend.record(&self.accessor_id, operation);
        if failing {
            Err(fail(&self.accessor_id, operation))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccessorHandle for FakeHandle {
    fn access_type(&self) -> AccessType {
        self.access_type
    }

    fn accessor_id(&self) -> &str {
        &self.accessor_id
    }

    fn check_handle_basic(&self) -> CheckResult {
        let failing = self.backend.behavior(&self.accessor_id).fail_basic;
        self.check("checkHandleBasic", failing)
    }

    fn check_handle_read(&self) -> CheckResult {
        let failing = self.backend.behavior(&self.accessor_id).fail_read;
        self.check("checkHandleRead", failing)
    }

    fn check_handle_write(&self) -> CheckResult {
        let failing = self.backend.behavior(&self.accessor_id).fail_write;
        self.check("checkHandleWrite", failing)
    }

    async fn check_package_read_access(&self) -> CheckResult {
        let behavior = self.backend.behavior(&self.accessor_id);
        if let Some(delay) = behavior.read_access_delay {
            tokio::time::sleep(delay).await;
        }
        self.check("checkPackageReadAccess", behavior.fail_read_access)
    }

    async fn try_package_read(&self) -> Result<(), ReadProbeFailure> {
        self.backend.record(&self.accessor_id, "tryPackageRead");
        match self.backend.behavior(&self.accessor_id).read_probe_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn check_package_container_write_access(&self) -> CheckResult {
        let failing = self.backend.behavior(&self.accessor_id).fail_write_access;
        self.check("checkPackageContainerWriteAccess", failing)
    }

    async fn get_package_actual_version(&self) -> WorkerResult<PackageVersion> {
        self.backend
            .record(&self.accessor_id, "getPackageActualVersion");
        self.backend
            .next_version(&self.accessor_id)
            .ok_or_else(|| WorkerError::backend(&self.accessor_id, "package not found"))
    }

    async fn remove_package(&self, _reason: &str) -> WorkerResult<()> {
        self.backend.record(&self.accessor_id, "removePackage");
        Ok(())
    }

    async fn fetch_metadata(&self) -> WorkerResult<Option<serde_json::Value>> {
        self.backend.record(&self.accessor_id, "fetchMetadata");
        Ok(self.backend.metadata(&self.accessor_id))
    }

    async fn update_metadata(&self, metadata: serde_json::Value) -> WorkerResult<()> {
        self.backend.record(&self.accessor_id, "updateMetadata");
        self.backend.set_metadata(&self.accessor_id, metadata);
        Ok(())
    }

    async fn remove_metadata(&self) -> WorkerResult<()> {
        self.backend.record(&self.accessor_id, "removeMetadata");
        self.backend
            .metadata
            .lock()
            .unwrap()
            .remove(&self.accessor_id);
        Ok(())
    }
}

pub struct FakeFactory {
    access_type: AccessType,
    backend: Arc<FakeBackend>,
}

impl AccessorFactory for FakeFactory {
    fn create_handle(&self, args: HandleArguments<'_>) -> WorkerResult<Arc<dyn AccessorHandle>> {
        self.backend.record(args.accessor_id, "createHandle");
        Ok(Arc::new(FakeHandle {
            access_type: self.access_type,
            accessor_id: args.accessor_id.to_string(),
            backend: self.backend.clone(),
        }))
    }
}

pub struct NoManager;

#[async_trait]
impl ManagerLink for NoManager {
    async fn send_message_to_manager(
        &self,
        manager_id: &str,
        _message: ManagerMessage,
    ) -> WorkerResult<serde_json::Value> {
        Err(WorkerError::Manager {
            manager_id: manager_id.to_string(),
            message: "no manager in tests".to_string(),
        })
    }
}

pub fn location() -> WorkerLocation {
    WorkerLocation {
        local_computer_id: Some("pc-1".to_string()),
        local_network_ids: vec!["studio".to_string()],
    }
}

/// A worker with the fake backend registered for every access type.
pub fn worker(backend: &Arc<FakeBackend>, config: WorkerConfig) -> WorkerContext {
    let registry = AccessType::ALL
        .into_iter()
        .fold(AccessorRegistry::builder(), |builder, access_type| {
            builder.register(
                access_type,
                Arc::new(FakeFactory {
                    access_type,
                    backend: backend.clone(),
                }),
            )
        })
        .build();
    WorkerContext::new(
        "worker0",
        location(),
        config,
        Arc::new(registry),
        Arc::new(NoManager),
    )
}

pub fn local_folder() -> Accessor {
    Accessor::new(AccessorKind::LocalFolder {
        folder_path: Some("/media/source".to_string()),
        file_path: Some("clip.mxf".to_string()),
        resource_id: Some("pc-1".to_string()),
    })
    .with_read()
    .with_write()
}

pub fn file_share() -> Accessor {
    Accessor::new(AccessorKind::FileShare {
        folder_path: Some("\\\\nas\\media".to_string()),
        file_path: Some("clip.mxf".to_string()),
        user_name: None,
        password: None,
        network_id: Some("studio".to_string()),
    })
    .with_read()
    .with_write()
}

pub fn http() -> Accessor {
    Accessor::new(AccessorKind::Http {
        base_url: Some("http://media.studio".to_string()),
        url: Some("clip.mxf".to_string()),
        is_immutable: false,
        network_id: Some("studio".to_string()),
    })
    .with_read()
}

pub fn file_version(file_size: u64, modified_date: i64) -> PackageVersion {
    PackageVersion::File {
        file_size,
        modified_date,
    }
}
