//! Package containers and their accessors
//!
//! A [`PackageContainer`] is a named storage location; each of its
//! [`Accessor`]s is one way into it. Accessors are static configuration and
//! are never mutated by the worker.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::worker::WorkerLocation;

/// Closed set of storage backends a worker can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    LocalFolder,
    FileShare,
    Http,
    HttpProxy,
    Quantel,
    CorePackageInfo,
    AtemMediaStore,
}

impl AccessType {
    /// Every variant, in declaration order.
    pub const ALL: [AccessType; 7] = [
        AccessType::LocalFolder,
        AccessType::FileShare,
        AccessType::Http,
        AccessType::HttpProxy,
        AccessType::Quantel,
        AccessType::CorePackageInfo,
        AccessType::AtemMediaStore,
    ];

    /// Relative cost of moving data through this kind of accessor.
    pub const fn relative_cost(self) -> u32 {
        match self {
            AccessType::LocalFolder | AccessType::Quantel | AccessType::AtemMediaStore => 1,
            AccessType::CorePackageInfo | AccessType::FileShare => 2,
            AccessType::Http | AccessType::HttpProxy => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::LocalFolder => "LOCAL_FOLDER",
            AccessType::FileShare => "FILE_SHARE",
            AccessType::Http => "HTTP",
            AccessType::HttpProxy => "HTTP_PROXY",
            AccessType::Quantel => "QUANTEL",
            AccessType::CorePackageInfo => "CORE_PACKAGE_INFO",
            AccessType::AtemMediaStore => "ATEM_MEDIA_STORE",
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific connection fields, tagged by access type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessorKind {
    #[serde(rename_all = "camelCase")]
    LocalFolder {
        #[serde(default)]
        folder_path: Option<String>,
        #[serde(default)]
        file_path: Option<String>,
        /// Computer the folder lives on; unset means "any computer".
        #[serde(default)]
        resource_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FileShare {
        #[serde(default)]
        folder_path: Option<String>,
        #[serde(default)]
        file_path: Option<String>,
        #[serde(default)]
        user_name: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        network_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Http {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        is_immutable: bool,
        #[serde(default)]
        network_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    HttpProxy {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        network_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Quantel {
        #[serde(default)]
        quantel_gateway_url: Option<String>,
        #[serde(default)]
        iscodes: Option<String>,
        #[serde(default)]
        zone_id: Option<String>,
        #[serde(default)]
        server_id: Option<u32>,
        #[serde(default)]
        guid: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        file_flow_base_url: Option<String>,
        #[serde(default)]
        network_id: Option<String>,
    },
    CorePackageInfo {},
    #[serde(rename_all = "camelCase")]
    AtemMediaStore {
        #[serde(default)]
        atem_host: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        bank_index: Option<u32>,
        #[serde(default)]
        network_id: Option<String>,
    },
}

impl AccessorKind {
    pub fn access_type(&self) -> AccessType {
        match self {
            AccessorKind::LocalFolder { .. } => AccessType::LocalFolder,
            AccessorKind::FileShare { .. } => AccessType::FileShare,
            AccessorKind::Http { .. } => AccessType::Http,
            AccessorKind::HttpProxy { .. } => AccessType::HttpProxy,
            AccessorKind::Quantel { .. } => AccessType::Quantel,
            AccessorKind::CorePackageInfo {} => AccessType::CorePackageInfo,
            AccessorKind::AtemMediaStore { .. } => AccessType::AtemMediaStore,
        }
    }

    /// Network the accessor is reachable on, for network-bound variants.
    pub fn network_id(&self) -> Option<&str> {
        match self {
            AccessorKind::FileShare { network_id, .. }
            | AccessorKind::Http { network_id, .. }
            | AccessorKind::HttpProxy { network_id, .. }
            | AccessorKind::Quantel { network_id, .. }
            | AccessorKind::AtemMediaStore { network_id, .. } => network_id.as_deref(),
            AccessorKind::LocalFolder { .. } | AccessorKind::CorePackageInfo {} => None,
        }
    }
}

/// One access method into a package container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub allow_read: bool,
    #[serde(default)]
    pub allow_write: bool,
    /// Lower is preferred. Unset sorts as [`DEFAULT_ACCESSOR_PRIORITY`].
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(flatten)]
    pub kind: AccessorKind,
}

/// Priority used for accessors that do not configure one.
pub const DEFAULT_ACCESSOR_PRIORITY: i32 = 0;

impl Accessor {
    pub fn new(kind: AccessorKind) -> Self {
        Self {
            label: String::new(),
            allow_read: false,
            allow_write: false,
            priority: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_read(mut self) -> Self {
        self.allow_read = true;
        self
    }

    pub fn with_write(mut self) -> Self {
        self.allow_write = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn access_type(&self) -> AccessType {
        self.kind.access_type()
    }

    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_ACCESSOR_PRIORITY)
    }

    /// Label for messages, falling back to the accessor id.
    pub fn display_label<'a>(&'a self, accessor_id: &'a str) -> &'a str {
        if self.label.is_empty() {
            accessor_id
        } else {
            &self.label
        }
    }

    /// Generic reachability rule: a local folder must live on this computer,
    /// a network-bound accessor must be on one of this worker's networks.
    /// Unset ids are always reachable.
    pub fn is_reachable_from(&self, location: &WorkerLocation) -> bool {
        match &self.kind {
            AccessorKind::LocalFolder { resource_id, .. } => match resource_id {
                None => true,
                Some(id) => location.local_computer_id.as_deref() == Some(id.as_str()),
            },
            AccessorKind::CorePackageInfo {} => true,
            kind => match kind.network_id() {
                None => true,
                Some(network) => location.local_network_ids.iter().any(|n| n == network),
            },
        }
    }
}

/// A named storage location holding one or more accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContainer {
    pub container_id: String,
    pub label: String,
    /// Keyed by accessor id, in configured order.
    #[serde(default)]
    pub accessors: IndexMap<String, Accessor>,
}

impl PackageContainer {
    pub fn new(container_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            label: label.into(),
            accessors: IndexMap::new(),
        }
    }

    pub fn with_accessor(mut self, accessor_id: impl Into<String>, accessor: Accessor) -> Self {
        self.accessors.insert(accessor_id.into(), accessor);
        self
    }
}
