//! Package Worker Engine
//!
//! The worker side of package reconciliation: given an Expectation (the
//! desired end state of a media package), decide whether this worker can do
//! the work, estimate its cost, wait until the source is stable, run the work
//! as a cancelable job and report how it ended.
//!
//! # Layers
//!
//! - **Accessors**: [`AccessorHandle`] hides each storage backend behind one
//!   capability contract; [`AccessorRegistry`] maps access types to factories.
//! - **Selection**: [`lookup_accessor_handles`] walks candidate accessors in
//!   priority order and returns the first one that passes every requested
//!   check.
//! - **Cost**: [`get_standard_cost`] turns the cheapest reachable accessors
//!   into an advisory number for the scheduler.
//! - **Jobs**: [`CancelableTask`] and [`WorkInProgress`] are the cancelable,
//!   progress-reporting primitives every long-running operation uses.
//! - **Lifecycle**: [`ExpectationHandler`] is the six-phase contract task
//!   handlers implement; [`GenericWorker`] dispatches to them by type.
//!
//! Concrete backends and task handlers live outside this crate and plug in
//! through [`AccessorFactory`] and [`ExpectationHandler`].

pub mod accessor;
pub mod cancelable;
pub mod config;
pub mod container;
pub mod cost;
pub mod error;
pub mod expectation;
pub mod lifecycle;
pub mod selector;
pub mod timeout;
pub mod version;
pub mod work;
pub mod worker;

// Re-export key accessor types
pub use accessor::{
    fetch_metadata_as, pipe_package, update_metadata_from, AccessType, AccessorFactory,
    AccessorHandle, AccessorRegistry, HandleArguments, HandleContext, PackageOperation,
    PackageReadStream, PutPackageHandler, ReadProbeFailure,
};
pub use container::{Accessor, AccessorKind, PackageContainer};

// Re-export selection and cost
pub use cost::{get_accessor_cost, get_standard_cost};
pub use selector::{
    check_worker_has_access_to_package_containers,
    find_best_package_container_with_access_to_package, lookup_accessor_handles, AccessMode,
    LookupChecks, LookupResult,
};

// Re-export job primitives
pub use cancelable::{CancelScope, CancelableTask};
pub use work::{WorkEvent, WorkInProgress, WorkOutcome, WorkProperties, WorkReporter};

// Re-export lifecycle types
pub use lifecycle::{
    ExpectationHandler, ExpectationHandlers, Fulfillment, GenericWorker, Readiness, Removal,
};

pub use config::WorkerConfig;
pub use error::{CheckResult, Reason, Rejection, WorkerError, WorkerResult};
pub use expectation::{Expectation, ExpectationType};
pub use version::{PackageVersion, UniversalVersion};
pub use worker::{ManagerLink, ManagerMessage, WorkerContext, WorkerLocation};
