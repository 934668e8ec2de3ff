//! Accessor selection
//!
//! Picks which (container, accessor) pair a task should use.
//!
//! ```text
//! containers ──flatten──▶ pairs ──sort by priority──▶ walk in order
//!                                                       │
//!   per pair: create handle → basic → read → read package → version
//!             → write → write container → custom
//!                                                       │
//!   first pair passing every requested check ─────────▶ Ready
//!   none pass ────────────────────────────────────────▶ NotReady(last rejection)
//! ```
//!
//! The walk is sequential: a slow pair delays every pair behind it. Each
//! remote check has its own budget (`remote_check_timeout`) and the whole
//! walk has one outer budget (`inner_action_timeout`).
//!
//! [`find_best_package_container_with_access_to_package`] is the cheap
//! sibling: no handles, no backend calls, only the static tables and the
//! reachability rule. It feeds the cost model and the support phase.

use std::sync::Arc;
use tracing::debug;

use crate::accessor::{AccessType, AccessorHandle, HandleArguments, HandleContext};
use crate::container::{Accessor, PackageContainer};
use crate::error::{CheckResult, Rejection};
use crate::expectation::{Expectation, WorkOptions};
use crate::timeout::{check_with_timeout, try_with_timeout, with_timeout};
use crate::version::{compare_actual_expect_versions, ExpectedVersion};
use crate::worker::WorkerContext;

/// Caller-supplied extra check, run last.
pub type CustomCheck =
    Box<dyn Fn(&PackageContainer, &str, &Accessor) -> CheckResult + Send + Sync>;

/// Which checks a lookup runs on each pair. All off by default; the basic
/// handle check always runs.
#[derive(Default)]
pub struct LookupChecks {
    pub read: bool,
    pub read_package: bool,
    pub package_version: Option<ExpectedVersion>,
    pub write: bool,
    pub write_package_container: bool,
    custom_check: Option<CustomCheck>,
}

impl LookupChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read(mut self) -> Self {
        self.read = true;
        self
    }

    pub fn with_read_package(mut self) -> Self {
        self.read_package = true;
        self
    }

    pub fn with_package_version(mut self, version: Option<ExpectedVersion>) -> Self {
        self.package_version = version;
        self
    }

    pub fn with_write(mut self) -> Self {
        self.write = true;
        self
    }

    pub fn with_write_package_container(mut self) -> Self {
        self.write_package_container = true;
        self
    }

    pub fn with_custom_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&PackageContainer, &str, &Accessor) -> CheckResult + Send + Sync + 'static,
    {
        self.custom_check = Some(Box::new(check));
        self
    }
}

impl std::fmt::Debug for LookupChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupChecks")
            .field("read", &self.read)
            .field("read_package", &self.read_package)
            .field("package_version", &self.package_version)
            .field("write", &self.write)
            .field("write_package_container", &self.write_package_container)
            .field("custom_check", &self.custom_check.is_some())
            .finish()
    }
}

/// What gets bound into every handle the lookup creates.
#[derive(Debug, Clone)]
pub struct LookupContext<'a> {
    pub handle: HandleContext,
    pub content: &'a serde_json::Value,
    pub work_options: &'a WorkOptions,
}

/// The winning pair of a lookup.
#[derive(Clone)]
pub struct LookupReady {
    pub container: PackageContainer,
    pub accessor_id: String,
    pub accessor: Accessor,
    pub handle: Arc<dyn AccessorHandle>,
}

impl std::fmt::Debug for LookupReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupReady")
            .field("container", &self.container.container_id)
            .field("accessor_id", &self.accessor_id)
            .field("handle", &self.handle)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    Ready(LookupReady),
    NotReady(Rejection),
}

impl LookupResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, LookupResult::Ready(_))
    }

    pub fn into_ready(self) -> Result<LookupReady, Rejection> {
        match self {
            LookupResult::Ready(ready) => Ok(ready),
            LookupResult::NotReady(rejection) => Err(rejection),
        }
    }
}

/// All (container, accessor id, accessor) pairs, lowest priority value
/// first. Ties keep container order, then the order accessors were
/// configured in.
pub fn prioritize_accessors(
    containers: &[PackageContainer],
) -> Vec<(&PackageContainer, &str, &Accessor)> {
    let mut pairs: Vec<_> = containers
        .iter()
        .flat_map(|container| {
            container
                .accessors
                .iter()
                .map(move |(id, accessor)| (container, id.as_str(), accessor))
        })
        .collect();
    pairs.sort_by_key(|(_, _, accessor)| accessor.effective_priority());
    pairs
}

/// Walk the candidate pairs and return the first one passing every requested
/// check. When none does, only the last pair's rejection is returned; the
/// earlier ones are logged at debug level.
pub async fn lookup_accessor_handles(
    worker: &WorkerContext,
    containers: &[PackageContainer],
    checks: &LookupChecks,
    context: &LookupContext<'_>,
) -> LookupResult {
    let budget = worker.config.inner_action_timeout();
    match with_timeout(
        budget,
        "lookupAccessorHandles",
        walk_pairs(worker, containers, checks, context),
    )
    .await
    {
        Ok(result) => result,
        Err(err) => LookupResult::NotReady(Rejection::unknown(
            "Timeout when looking up accessors",
            err.to_string(),
        )),
    }
}

async fn walk_pairs(
    worker: &WorkerContext,
    containers: &[PackageContainer],
    checks: &LookupChecks,
    context: &LookupContext<'_>,
) -> LookupResult {
    let mut last_rejection = Rejection::known(
        "No accessors configured",
        format!(
            "No accessors found in package containers [{}]",
            container_labels(containers)
        ),
    );

    for (container, accessor_id, accessor) in prioritize_accessors(containers) {
        match check_pair(worker, container, accessor_id, accessor, checks, context).await {
            Ok(handle) => {
                debug!(
                    container = %container.label,
                    accessor = %accessor_id,
                    usage = %context.handle.usage,
                    "Accessor selected"
                );
                return LookupResult::Ready(LookupReady {
                    container: container.clone(),
                    accessor_id: accessor_id.to_string(),
                    accessor: accessor.clone(),
                    handle,
                });
            }
            Err(rejection) => {
                debug!(
                    container = %container.label,
                    accessor = %accessor_id,
                    known = rejection.known_reason,
                    tech = %rejection.reason.tech,
                    "Accessor rejected"
                );
                last_rejection = rejection;
            }
        }
    }
    LookupResult::NotReady(last_rejection)
}

async fn check_pair(
    worker: &WorkerContext,
    container: &PackageContainer,
    accessor_id: &str,
    accessor: &Accessor,
    checks: &LookupChecks,
    context: &LookupContext<'_>,
) -> Result<Arc<dyn AccessorHandle>, Rejection> {
    let tech_prefix = format!(
        "{}: Accessor \"{}\": ",
        container.label,
        accessor.display_label(accessor_id)
    );
    let label = |rejection: Rejection| Rejection {
        reason: rejection.reason.prefixed("", &tech_prefix),
        known_reason: rejection.known_reason,
    };
    let remote = worker.config.remote_check_timeout();

    let handle = worker
        .accessors
        .create_handle(HandleArguments {
            worker,
            accessor_id,
            accessor,
            context: &context.handle,
            content: context.content,
            work_options: context.work_options,
        })
        .map_err(|err| label(err.to_rejection()))?;

    handle.check_handle_basic().map_err(label)?;

    if checks.read {
        handle.check_handle_read().map_err(label)?;
    }
    if checks.read_package {
        check_with_timeout(
            remote,
            "checkPackageReadAccess",
            handle.check_package_read_access(),
        )
        .await
        .map_err(label)?;
    }
    if let Some(expected) = &checks.package_version {
        let actual = try_with_timeout(
            remote,
            "getPackageActualVersion",
            handle.get_package_actual_version(),
        )
        .await
        .map_err(|err| label(err.to_rejection()))?;
        compare_actual_expect_versions(&actual, expected).map_err(label)?;
    }
    if checks.write {
        handle.check_handle_write().map_err(label)?;
    }
    if checks.write_package_container {
        check_with_timeout(
            remote,
            "checkPackageContainerWriteAccess",
            handle.check_package_container_write_access(),
        )
        .await
        .map_err(label)?;
    }
    if let Some(custom) = &checks.custom_check {
        custom(container, accessor_id, accessor).map_err(label)?;
    }
    Ok(handle)
}

fn expectation_context<'a>(expectation: &'a Expectation, usage: &str) -> LookupContext<'a> {
    LookupContext {
        handle: HandleContext {
            expectation_id: Some(expectation.id.clone()),
            usage: usage.to_string(),
        },
        content: &expectation.end_requirement.content,
        work_options: &expectation.work_options,
    }
}

/// Lookup over the expectation's sources.
pub async fn lookup_sources(
    worker: &WorkerContext,
    expectation: &Expectation,
    checks: &LookupChecks,
) -> LookupResult {
    let context = expectation_context(expectation, "source");
    lookup_accessor_handles(worker, expectation.sources(), checks, &context).await
}

/// Lookup over the expectation's targets.
pub async fn lookup_targets(
    worker: &WorkerContext,
    expectation: &Expectation,
    checks: &LookupChecks,
) -> LookupResult {
    let context = expectation_context(expectation, "target");
    lookup_accessor_handles(worker, expectation.targets(), checks, &context).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    fn allows(self, accessor: &Accessor) -> bool {
        match self {
            AccessMode::Read => accessor.allow_read,
            AccessMode::Write => accessor.allow_write,
        }
    }
}

/// Cheapest reachable accessor found by the static pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestAccessor {
    pub container_id: String,
    pub accessor_id: String,
    pub access_type: AccessType,
    pub cost: u32,
}

/// Cheapest accessor this worker could use in `mode`, without touching any
/// backend. Ties go to the first candidate in container order.
pub fn find_best_package_container_with_access_to_package(
    worker: &WorkerContext,
    containers: &[PackageContainer],
    mode: AccessMode,
) -> Option<BestAccessor> {
    let mut best: Option<BestAccessor> = None;
    for container in containers {
        for (accessor_id, accessor) in &container.accessors {
            if !mode.allows(accessor) {
                continue;
            }
            let Ok(entry) = worker
                .accessors
                .get_accessor_static_handle(accessor.access_type())
            else {
                continue;
            };
            if !entry.factory.does_support_access(worker, accessor) {
                continue;
            }
            if best.as_ref().is_some_and(|b| b.cost <= entry.relative_cost) {
                continue;
            }
            best = Some(BestAccessor {
                container_id: container.container_id.clone(),
                accessor_id: accessor_id.clone(),
                access_type: entry.access_type,
                cost: entry.relative_cost,
            });
        }
    }
    best
}

/// Support-phase helper: reject when any requested side has no reachable
/// accessor at all.
pub fn check_worker_has_access_to_package_containers(
    worker: &WorkerContext,
    sources: Option<&[PackageContainer]>,
    targets: Option<&[PackageContainer]>,
) -> CheckResult {
    if let Some(sources) = sources {
        if find_best_package_container_with_access_to_package(worker, sources, AccessMode::Read)
            .is_none()
        {
            return Err(Rejection::known(
                "There are no accessible sources",
                format!("No source ({}) is accessible", container_labels(sources)),
            ));
        }
    }
    if let Some(targets) = targets {
        if find_best_package_container_with_access_to_package(worker, targets, AccessMode::Write)
            .is_none()
        {
            return Err(Rejection::known(
                "There are no accessible targets",
                format!("No target ({}) is accessible", container_labels(targets)),
            ));
        }
    }
    Ok(())
}

fn container_labels(containers: &[PackageContainer]) -> String {
    containers
        .iter()
        .map(|c| c.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
