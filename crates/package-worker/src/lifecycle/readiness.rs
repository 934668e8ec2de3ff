//! Readiness helpers shared by task handlers

use chrono::Utc;
use tracing::debug;

use super::Readiness;
use crate::accessor::AccessorHandle;
use crate::config::WorkerConfig;
use crate::error::{CheckResult, Rejection};
use crate::expectation::Expectation;
use crate::selector::{lookup_sources, LookupChecks};
use crate::timeout::{try_with_timeout, with_timeout};
use crate::version::{compare_universal_versions, PackageVersion};
use crate::worker::WorkerContext;

async fn read_version(
    handle: &dyn AccessorHandle,
    config: &WorkerConfig,
) -> Result<PackageVersion, Rejection> {
    try_with_timeout(
        config.remote_check_timeout(),
        "getPackageActualVersion",
        handle.get_package_actual_version(),
    )
    .await
    .map_err(|err| err.to_rejection())
}

/// Read the source version twice, `source_package_stability_threshold`
/// apart, and reject if anything changed in between. Sources last modified
/// longer ago than `stability_bypass_age` pass without waiting.
pub async fn check_source_stability(
    handle: &dyn AccessorHandle,
    config: &WorkerConfig,
) -> CheckResult {
    let threshold = config.source_package_stability_threshold();
    if threshold.is_zero() {
        return Ok(());
    }

    let first = read_version(handle, config).await?;
    if let Some(modified) = first.modified_at() {
        let age = Utc::now().signed_duration_since(modified);
        if age.to_std().is_ok_and(|age| age > config.stability_bypass_age()) {
            debug!(accessor = %handle.accessor_id(), "Source is old, skipping stability wait");
            return Ok(());
        }
    }

    tokio::time::sleep(threshold).await;
    let second = read_version(handle, config).await?;

    compare_universal_versions(&first.to_universal(), &second.to_universal()).map_err(|rejection| {
        Rejection::known(
            "Waiting for source file to stop growing",
            format!(
                "Source is not stable after {}ms: {}",
                threshold.as_millis(),
                rejection.reason.tech
            ),
        )
    })
}

/// Common readiness check for handlers that read one source package: find a
/// readable source at the expected version, probe it, then wait for it to
/// be stable.
pub async fn check_source_ready(worker: &WorkerContext, expectation: &Expectation) -> Readiness {
    let checks = LookupChecks::new()
        .with_read()
        .with_read_package()
        .with_package_version(expectation.start_requirement.version.clone());
    let source = match lookup_sources(worker, expectation, &checks).await.into_ready() {
        Ok(source) => source,
        Err(rejection) => return Readiness::not_ready(rejection),
    };

    let probe = with_timeout(
        worker.config.remote_check_timeout(),
        "tryPackageRead",
        source.handle.try_package_read(),
    )
    .await;
    match probe {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => {
            return Readiness::NotReady {
                rejection: failure.rejection,
                source_exists: Some(failure.package_exists),
                source_is_placeholder: failure.source_is_placeholder,
            }
        }
        Err(err) => return Readiness::not_ready(err.to_rejection()),
    }

    if let Err(rejection) = check_source_stability(source.handle.as_ref(), &worker.config).await {
        return Readiness::NotReady {
            rejection,
            source_exists: Some(true),
            source_is_placeholder: false,
        };
    }

    Readiness::Ready {
        source_exists: Some(true),
    }
}
