//! Expectations: immutable work requests from an Expectation Manager

use serde::{Deserialize, Serialize};

use crate::container::PackageContainer;
use crate::version::ExpectedVersion;

/// Discriminant selecting the task-handler plugin for an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectationType {
    FileCopy,
    FileVerify,
    MediaFileScan,
    MediaFileDeepScan,
    MediaFileThumbnail,
    MediaFilePreview,
    QuantelClipCopy,
    QuantelClipThumbnail,
    QuantelClipPreview,
    JsonDataCopy,
    RenderHtml,
}

impl ExpectationType {
    pub const ALL: [ExpectationType; 11] = [
        ExpectationType::FileCopy,
        ExpectationType::FileVerify,
        ExpectationType::MediaFileScan,
        ExpectationType::MediaFileDeepScan,
        ExpectationType::MediaFileThumbnail,
        ExpectationType::MediaFilePreview,
        ExpectationType::QuantelClipCopy,
        ExpectationType::QuantelClipThumbnail,
        ExpectationType::QuantelClipPreview,
        ExpectationType::JsonDataCopy,
        ExpectationType::RenderHtml,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpectationType::FileCopy => "FILE_COPY",
            ExpectationType::FileVerify => "FILE_VERIFY",
            ExpectationType::MediaFileScan => "MEDIA_FILE_SCAN",
            ExpectationType::MediaFileDeepScan => "MEDIA_FILE_DEEP_SCAN",
            ExpectationType::MediaFileThumbnail => "MEDIA_FILE_THUMBNAIL",
            ExpectationType::MediaFilePreview => "MEDIA_FILE_PREVIEW",
            ExpectationType::QuantelClipCopy => "QUANTEL_CLIP_COPY",
            ExpectationType::QuantelClipThumbnail => "QUANTEL_CLIP_THUMBNAIL",
            ExpectationType::QuantelClipPreview => "QUANTEL_CLIP_PREVIEW",
            ExpectationType::JsonDataCopy => "JSON_DATA_COPY",
            ExpectationType::RenderHtml => "RENDER_HTML",
        }
    }
}

impl std::fmt::Display for ExpectationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the package comes from, and which version of it is expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequirement {
    #[serde(default)]
    pub sources: Vec<PackageContainer>,
    #[serde(default)]
    pub version: Option<ExpectedVersion>,
}

/// Where the package should end up, and in what form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequirement {
    #[serde(default)]
    pub targets: Vec<PackageContainer>,
    /// Per-task content description (file path, clip guid, ...).
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub version: Option<ExpectedVersion>,
}

/// Free-form per-task options. Known keys are typed, the rest pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOptions {
    /// Delay before a removed target is actually deleted, in seconds.
    #[serde(default)]
    pub remove_delay: Option<u64>,
    /// Write to a temporary path and rename when finalizing.
    #[serde(default)]
    pub use_temporary_file_path: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An immutable work request. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub id: String,
    #[serde(rename = "type")]
    pub expectation_type: ExpectationType,
    #[serde(default)]
    pub label: String,
    pub manager_id: String,
    #[serde(default)]
    pub start_requirement: StartRequirement,
    #[serde(default)]
    pub end_requirement: EndRequirement,
    #[serde(default)]
    pub work_options: WorkOptions,
}

impl Expectation {
    pub fn new(
        id: impl Into<String>,
        expectation_type: ExpectationType,
        manager_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            expectation_type,
            label: String::new(),
            manager_id: manager_id.into(),
            start_requirement: StartRequirement::default(),
            end_requirement: EndRequirement::default(),
            work_options: WorkOptions::default(),
        }
    }

    pub fn with_source(mut self, container: PackageContainer) -> Self {
        self.start_requirement.sources.push(container);
        self
    }

    pub fn with_target(mut self, container: PackageContainer) -> Self {
        self.end_requirement.targets.push(container);
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.end_requirement.content = content;
        self
    }

    pub fn with_source_version(mut self, version: ExpectedVersion) -> Self {
        self.start_requirement.version = Some(version);
        self
    }

    pub fn sources(&self) -> &[PackageContainer] {
        &self.start_requirement.sources
    }

    pub fn targets(&self) -> &[PackageContainer] {
        &self.end_requirement.targets
    }
}
