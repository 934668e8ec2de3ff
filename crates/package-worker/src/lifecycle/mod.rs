//! Expectation lifecycle
//!
//! Every task handler implements the six phases of [`ExpectationHandler`].
//! The Expectation Manager drives them in order and may poll phases 2–4
//! repeatedly:
//!
//! ```text
//! 1 do_you_support_expectation        no side effects
//! 2 get_cost_for_expectation          Some(cost) | None (cannot do it)
//! 3 is_expectation_ready_to_start...  Ready | NotReady (may wait for stability)
//! 4 is_expectation_fulfilled          Fulfilled | NotFulfilled (may remove stale target)
//! 5 work_on_expectation               → WorkInProgress
//! 6 remove_expectation                Removed | NotRemoved
//! ```
//!
//! [`GenericWorker`] routes each call to the handler for the expectation's
//! type.

mod fulfillment;
mod generic_worker;
mod readiness;

pub use fulfillment::{check_target_fulfilled, SourceVersioned, VersionMetadata};
pub use generic_worker::{ExpectationHandlers, GenericWorker};
pub use readiness::{check_source_ready, check_source_stability};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cost::get_standard_cost;
use crate::error::{CheckResult, Rejection, WorkerError, WorkerResult};
use crate::expectation::{Expectation, ExpectationType};
use crate::work::WorkInProgress;
use crate::worker::WorkerContext;

/// Answer of the readiness phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Readiness {
    #[serde(rename_all = "camelCase")]
    Ready { source_exists: Option<bool> },
    #[serde(rename_all = "camelCase")]
    NotReady {
        rejection: Rejection,
        source_exists: Option<bool>,
        source_is_placeholder: bool,
    },
}

impl Readiness {
    pub fn not_ready(rejection: Rejection) -> Self {
        Readiness::NotReady {
            rejection,
            source_exists: None,
            source_is_placeholder: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Readiness::Ready { .. } => None,
            Readiness::NotReady { rejection, .. } => Some(rejection),
        }
    }
}

/// Answer of the fulfillment phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "rejection", rename_all = "camelCase")]
pub enum Fulfillment {
    Fulfilled,
    NotFulfilled(Rejection),
}

impl Fulfillment {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Fulfillment::Fulfilled)
    }
}

impl From<CheckResult> for Fulfillment {
    fn from(result: CheckResult) -> Self {
        match result {
            Ok(()) => Fulfillment::Fulfilled,
            Err(rejection) => Fulfillment::NotFulfilled(rejection),
        }
    }
}

/// Answer of the removal phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "rejection", rename_all = "camelCase")]
pub enum Removal {
    Removed,
    NotRemoved(Rejection),
}

impl Removal {
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed)
    }
}

impl From<CheckResult> for Removal {
    fn from(result: CheckResult) -> Self {
        match result {
            Ok(()) => Removal::Removed,
            Err(rejection) => Removal::NotRemoved(rejection),
        }
    }
}

/// The contract every task handler implements, once per expectation type.
///
/// `Err` is reserved for programming errors and unexpected faults; anything
/// the Expectation Manager should simply retry later is a negative `Ok`.
#[async_trait]
pub trait ExpectationHandler: Send + Sync {
    fn expectation_type(&self) -> ExpectationType;

    async fn do_you_support_expectation(
        &self,
        expectation: &Expectation,
        worker: &WorkerContext,
    ) -> WorkerResult<CheckResult>;

    async fn get_cost_for_expectation(
        &self,
        expectation: &Expectation,
        worker: &WorkerContext,
    ) -> WorkerResult<Option<u32>> {
        ensure_expectation_type(expectation, self.expectation_type())?;
        Ok(get_standard_cost(expectation, worker))
    }

    async fn is_expectation_ready_to_start_working_on(
        &self,
        expectation: &Expectation,
        worker: &WorkerContext,
    ) -> WorkerResult<Readiness>;

    async fn is_expectation_fulfilled(
        &self,
        expectation: &Expectation,
        was_fulfilled: bool,
        worker: &WorkerContext,
    ) -> WorkerResult<Fulfillment>;

    /// Errors here abort the call; no job is produced.
    async fn work_on_expectation(
        &self,
        expectation: &Expectation,
        worker: &WorkerContext,
    ) -> WorkerResult<WorkInProgress>;

    async fn remove_expectation(
        &self,
        expectation: &Expectation,
        reason: &str,
        worker: &WorkerContext,
    ) -> WorkerResult<Removal>;
}

/// Guard for handlers: the expectation must be of the handler's own type.
pub fn ensure_expectation_type(
    expectation: &Expectation,
    expected: ExpectationType,
) -> WorkerResult<()> {
    if expectation.expectation_type != expected {
        return Err(WorkerError::WrongExpectationType {
            expected,
            actual: expectation.expectation_type,
        });
    }
    Ok(())
}
