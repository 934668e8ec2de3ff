//! Type dispatch from an incoming expectation to its task handler
//!
//! ```text
//! GenericWorker::<phase>(exp)
//!   → handlers.get(exp.type)          closed match, one slot per type
//!   → handler.<phase>(exp, ctx)       bounded by inner_action_timeout
//!   → timeout: negative answer with known_reason = false
//! ```
//!
//! Non-timeout errors propagate unchanged; they are programming errors or
//! faults the Expectation Manager must see as such.

use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use super::{ExpectationHandler, Fulfillment, Readiness, Removal};
use crate::error::{CheckResult, Rejection, WorkerError, WorkerResult};
use crate::expectation::{Expectation, ExpectationType};
use crate::timeout::try_with_timeout;
use crate::work::WorkInProgress;
use crate::worker::WorkerContext;

// ── Handler table ────────────────────────────────────────────────────────────

/// One task handler per expectation type. Adding a type means adding a
/// field here, and the compiler then points at every dispatch site.
#[derive(Clone)]
pub struct ExpectationHandlers {
    pub file_copy: Arc<dyn ExpectationHandler>,
    pub file_verify: Arc<dyn ExpectationHandler>,
    pub media_file_scan: Arc<dyn ExpectationHandler>,
    pub media_file_deep_scan: Arc<dyn ExpectationHandler>,
    pub media_file_thumbnail: Arc<dyn ExpectationHandler>,
    pub media_file_preview: Arc<dyn ExpectationHandler>,
    pub quantel_clip_copy: Arc<dyn ExpectationHandler>,
    pub quantel_clip_thumbnail: Arc<dyn ExpectationHandler>,
    pub quantel_clip_preview: Arc<dyn ExpectationHandler>,
    pub json_data_copy: Arc<dyn ExpectationHandler>,
    pub render_html: Arc<dyn ExpectationHandler>,
}

impl ExpectationHandlers {
    pub fn get(&self, expectation_type: ExpectationType) -> &Arc<dyn ExpectationHandler> {
        match expectation_type {
            ExpectationType::FileCopy => &self.file_copy,
            ExpectationType::FileVerify => &self.file_verify,
            ExpectationType::MediaFileScan => &self.media_file_scan,
            ExpectationType::MediaFileDeepScan => &self.media_file_deep_scan,
            ExpectationType::MediaFileThumbnail => &self.media_file_thumbnail,
            ExpectationType::MediaFilePreview => &self.media_file_preview,
            ExpectationType::QuantelClipCopy => &self.quantel_clip_copy,
            ExpectationType::QuantelClipThumbnail => &self.quantel_clip_thumbnail,
            ExpectationType::QuantelClipPreview => &self.quantel_clip_preview,
            ExpectationType::JsonDataCopy => &self.json_data_copy,
            ExpectationType::RenderHtml => &self.render_html,
        }
    }

    /// Every slot must hold the handler for its own type.
    fn validate(&self) -> WorkerResult<()> {
        for expected in ExpectationType::ALL {
            let actual = self.get(expected).expectation_type();
            if actual != expected {
                return Err(WorkerError::WrongExpectationType { expected, actual });
            }
        }
        Ok(())
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

pub struct GenericWorker {
    context: WorkerContext,
    handlers: ExpectationHandlers,
}

impl std::fmt::Debug for GenericWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericWorker")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl GenericWorker {
    /// Fails if a handler sits in another type's slot.
    pub fn new(context: WorkerContext, handlers: ExpectationHandlers) -> WorkerResult<Self> {
        handlers.validate()?;
        Ok(Self { context, handlers })
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub fn get_expectation_handler(&self, expectation: &Expectation) -> &dyn ExpectationHandler {
        self.handlers.get(expectation.expectation_type).as_ref()
    }

    /// Run one phase under the inner action budget; a timeout becomes the
    /// phase's negative answer.
    async fn run_phase<T, F>(
        &self,
        phase: &str,
        expectation: &Expectation,
        fut: F,
        on_timeout: impl FnOnce(Rejection) -> T,
    ) -> WorkerResult<T>
    where
        F: Future<Output = WorkerResult<T>>,
    {
        match try_with_timeout(self.context.config.inner_action_timeout(), phase, fut).await {
            Err(err) if err.is_timeout() => {
                warn!(expectation = %expectation.id, phase, error = %err, "Phase timed out");
                Ok(on_timeout(err.to_rejection()))
            }
            other => other,
        }
    }

    pub async fn do_you_support_expectation(
        &self,
        expectation: &Expectation,
    ) -> WorkerResult<CheckResult> {
        let handler = self.get_expectation_handler(expectation);
        self.run_phase(
            "doYouSupportExpectation",
            expectation,
            handler.do_you_support_expectation(expectation, &self.context),
            Err,
        )
        .await
    }

    /// A timed-out cost estimate answers `None`: this worker should not be
    /// picked.
    pub async fn get_cost_for_expectation(
        &self,
        expectation: &Expectation,
    ) -> WorkerResult<Option<u32>> {
        let handler = self.get_expectation_handler(expectation);
        self.run_phase(
            "getCostForExpectation",
            expectation,
            handler.get_cost_for_expectation(expectation, &self.context),
            |_| None,
        )
        .await
    }

    pub async fn is_expectation_ready_to_start_working_on(
        &self,
        expectation: &Expectation,
    ) -> WorkerResult<Readiness> {
        let handler = self.get_expectation_handler(expectation);
        self.run_phase(
            "isExpectationReadyToStartWorkingOn",
            expectation,
            handler.is_expectation_ready_to_start_working_on(expectation, &self.context),
            Readiness::not_ready,
        )
        .await
    }

    pub async fn is_expectation_fulfilled(
        &self,
        expectation: &Expectation,
        was_fulfilled: bool,
    ) -> WorkerResult<Fulfillment> {
        let handler = self.get_expectation_handler(expectation);
        self.run_phase(
            "isExpectationFulfilled",
            expectation,
            handler.is_expectation_fulfilled(expectation, was_fulfilled, &self.context),
            Fulfillment::NotFulfilled,
        )
        .await
    }

    /// Only the job setup is bounded; the job itself runs until it ends or
    /// is cancelled. A setup timeout is an error since there is no job.
    pub async fn work_on_expectation(
        &self,
        expectation: &Expectation,
    ) -> WorkerResult<WorkInProgress> {
        let handler = self.get_expectation_handler(expectation);
        try_with_timeout(
            self.context.config.inner_action_timeout(),
            "workOnExpectation",
            handler.work_on_expectation(expectation, &self.context),
        )
        .await
    }

    pub async fn remove_expectation(
        &self,
        expectation: &Expectation,
        reason: &str,
    ) -> WorkerResult<Removal> {
        let handler = self.get_expectation_handler(expectation);
        self.run_phase(
            "removeExpectation",
            expectation,
            handler.remove_expectation(expectation, reason, &self.context),
            Removal::NotRemoved,
        )
        .await
    }
}
