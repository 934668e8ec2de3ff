//! Worker identity and the collaborators a worker consumes
//!
//! [`WorkerContext`] is built once at startup and shared read-only between
//! all concurrently handled expectations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::accessor::AccessorRegistry;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Where this worker runs: used by accessor reachability checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLocation {
    #[serde(default)]
    pub local_computer_id: Option<String>,
    #[serde(default)]
    pub local_network_ids: Vec<String>,
}

/// An RPC call to an Expectation Manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub arguments: Vec<serde_json::Value>,
}

impl ManagerMessage {
    pub fn new(message_type: impl Into<String>, arguments: Vec<serde_json::Value>) -> Self {
        Self {
            message_type: message_type.into(),
            arguments,
        }
    }
}

/// Transport to the Expectation Managers. The reply shape is call-specific.
#[async_trait]
pub trait ManagerLink: Send + Sync {
    async fn send_message_to_manager(
        &self,
        manager_id: &str,
        message: ManagerMessage,
    ) -> WorkerResult<serde_json::Value>;
}

/// Static identity, configuration and registries of one worker process.
#[derive(Clone)]
pub struct WorkerContext {
    pub worker_id: String,
    pub location: WorkerLocation,
    pub config: WorkerConfig,
    pub accessors: Arc<AccessorRegistry>,
    manager_link: Arc<dyn ManagerLink>,
}

impl WorkerContext {
    pub fn new(
        worker_id: impl Into<String>,
        location: WorkerLocation,
        config: WorkerConfig,
        accessors: Arc<AccessorRegistry>,
        manager_link: Arc<dyn ManagerLink>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            location,
            config,
            accessors,
            manager_link,
        }
    }

    /// Forward a call to the owning Expectation Manager.
    pub async fn send_message_to_manager(
        &self,
        manager_id: &str,
        message: ManagerMessage,
    ) -> WorkerResult<serde_json::Value> {
        debug!(
            worker = %self.worker_id,
            manager = %manager_id,
            message_type = %message.message_type,
            "Sending message to manager"
        );
        self.manager_link
            .send_message_to_manager(manager_id, message)
            .await
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("location", &self.location)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
