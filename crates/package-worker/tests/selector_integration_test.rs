//! Accessor selection and cost model against the in-memory fake backend.

mod common;

use std::time::Duration;

use common::{file_share, file_version, http, local_folder, worker, FakeBackend, FakeBehavior};
use package_worker::expectation::WorkOptions;
use package_worker::selector::{lookup_sources, LookupContext};
use package_worker::version::ExpectedVersion;
use package_worker::{
    get_standard_cost, lookup_accessor_handles, Accessor, AccessorKind, Expectation,
    ExpectationType, HandleContext, LookupChecks, PackageContainer, Rejection, WorkerConfig,
};

fn context<'a>(
    content: &'a serde_json::Value,
    options: &'a WorkOptions,
) -> LookupContext<'a> {
    LookupContext {
        handle: HandleContext {
            expectation_id: Some("exp-1".to_string()),
            usage: "test".to_string(),
        },
        content,
        work_options: options,
    }
}

fn read_checks() -> LookupChecks {
    LookupChecks::new().with_read().with_read_package()
}

// ── Priority ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn picks_lowest_priority_regardless_of_input_order() {
    common::init_tracing();
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![
        PackageContainer::new("c3", "Third").with_accessor("p3", http().with_priority(3)),
        PackageContainer::new("c1", "First").with_accessor("p1", http().with_priority(1)),
        PackageContainer::new("c2", "Second").with_accessor("p2", http().with_priority(2)),
    ];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let ready = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "p1");
    assert_eq!(ready.container.container_id, "c1");
    // The winner stops the walk.
    assert!(!backend.was_called("p2", "createHandle"));
    assert!(!backend.was_called("p3", "createHandle"));
}

#[tokio::test]
async fn falls_through_in_priority_order() {
    let backend = FakeBackend::new();
    backend.configure(
        "p1",
        FakeBehavior {
            fail_read_access: true,
            ..Default::default()
        },
    );
    backend.configure(
        "p2",
        FakeBehavior {
            fail_read: true,
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![PackageContainer::new("c", "Media")
        .with_accessor("p3", http().with_priority(3))
        .with_accessor("p2", http().with_priority(2))
        .with_accessor("p1", http().with_priority(1))];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let ready = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "p3");

    let created: Vec<String> = backend
        .calls()
        .into_iter()
        .filter(|c| c.ends_with(":createHandle"))
        .collect();
    assert_eq!(created, vec!["p1:createHandle", "p2:createHandle", "p3:createHandle"]);
}

// ── Fail-fast ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_local_check_skips_remote_checks_for_that_pair() {
    let backend = FakeBackend::new();
    backend.configure(
        "a",
        FakeBehavior {
            fail_read: true,
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![
        PackageContainer::new("c1", "One").with_accessor("a", http().with_priority(1)),
        PackageContainer::new("c2", "Two").with_accessor("b", http().with_priority(2)),
    ];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let ready = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "b");
    assert!(backend.was_called("a", "checkHandleRead"));
    assert!(!backend.was_called("a", "checkPackageReadAccess"));
    assert!(backend.was_called("b", "checkPackageReadAccess"));
}

#[tokio::test]
async fn checks_run_in_fixed_order() {
    let backend = FakeBackend::new();
    backend.configure(
        "a",
        FakeBehavior {
            versions: vec![file_version(100, 1_700_000_000_000)],
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![PackageContainer::new("c", "Media").with_accessor("a", local_folder())];
    let checks = LookupChecks::new()
        .with_read()
        .with_read_package()
        .with_package_version(Some(ExpectedVersion::File {
            file_size: Some(100),
            modified_date: None,
        }))
        .with_write()
        .with_write_package_container();
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    assert!(
        lookup_accessor_handles(&worker, &containers, &checks, &context(&content, &options))
            .await
            .is_ready()
    );
    assert_eq!(
        backend.calls(),
        vec![
            "a:createHandle",
            "a:checkHandleBasic",
            "a:checkHandleRead",
            "a:checkPackageReadAccess",
            "a:getPackageActualVersion",
            "a:checkHandleWrite",
            "a:checkPackageContainerWriteAccess",
        ]
    );
}

// ── Failure reasons ──────────────────────────────────────────────────────────

#[tokio::test]
async fn only_the_last_rejection_is_returned() {
    let backend = FakeBackend::new();
    backend.configure(
        "first",
        FakeBehavior {
            fail_basic: true,
            ..Default::default()
        },
    );
    backend.configure(
        "second",
        FakeBehavior {
            fail_read_access: true,
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![PackageContainer::new("c", "Archive")
        .with_accessor("first", http().with_priority(1))
        .with_accessor("second", http().with_priority(2).with_label("Archive HTTP"))];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let rejection = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap_err();
    assert!(rejection.known_reason);
    assert_eq!(rejection.reason.user, "checkPackageReadAccess failed");
    assert_eq!(
        rejection.reason.tech,
        "Archive: Accessor \"Archive HTTP\": second refused checkPackageReadAccess"
    );
}

#[tokio::test]
async fn version_mismatch_rejects_pair() {
    let backend = FakeBackend::new();
    backend.configure(
        "a",
        FakeBehavior {
            versions: vec![file_version(100, 1_700_000_000_000)],
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![PackageContainer::new("c", "Media").with_accessor("a", local_folder())];
    let checks = read_checks().with_package_version(Some(ExpectedVersion::File {
        file_size: Some(200),
        modified_date: None,
    }));
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let rejection = lookup_accessor_handles(&worker, &containers, &checks, &context(&content, &options))
        .await
        .into_ready()
        .unwrap_err();
    assert!(rejection.known_reason);
    assert_eq!(rejection.reason.user, "Actual version doesn't match expected version");
    assert!(rejection.reason.tech.contains("actual 100, expected 200"));
}

#[tokio::test]
async fn custom_check_runs_last() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let containers = vec![
        PackageContainer::new("c1", "Blocked").with_accessor("a", http().with_priority(1)),
        PackageContainer::new("c2", "Allowed").with_accessor("b", http().with_priority(2)),
    ];
    let checks = read_checks().with_custom_check(|container, _id, _accessor| {
        if container.container_id == "c1" {
            Err(Rejection::known("Container is blocked", "c1 blocked by custom check"))
        } else {
            Ok(())
        }
    });
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let ready = lookup_accessor_handles(&worker, &containers, &checks, &context(&content, &options))
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "b");
    assert!(backend.was_called("a", "checkPackageReadAccess"));
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hung_remote_check_times_out_and_falls_back() {
    let backend = FakeBackend::new();
    backend.configure(
        "slow",
        FakeBehavior {
            read_access_delay: Some(Duration::from_secs(3600)),
            ..Default::default()
        },
    );
    let config = WorkerConfig {
        remote_check_timeout_ms: 1_000,
        inner_action_timeout_ms: 30_000,
        ..WorkerConfig::default()
    };
    let worker = worker(&backend, config);
    let containers = vec![
        PackageContainer::new("c1", "Slow").with_accessor("slow", http().with_priority(1)),
        PackageContainer::new("c2", "Fast").with_accessor("fast", http().with_priority(2)),
    ];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let ready = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "fast");
}

#[tokio::test(start_paused = true)]
async fn whole_walk_is_bounded() {
    let backend = FakeBackend::new();
    for id in ["a", "b", "c"] {
        backend.configure(
            id,
            FakeBehavior {
                read_access_delay: Some(Duration::from_secs(3600)),
                ..Default::default()
            },
        );
    }
    let config = WorkerConfig {
        remote_check_timeout_ms: 10_000,
        inner_action_timeout_ms: 15_000,
        ..WorkerConfig::default()
    };
    let worker = worker(&backend, config);
    let containers = vec![PackageContainer::new("c", "Hung")
        .with_accessor("a", http())
        .with_accessor("b", http())
        .with_accessor("c", http())];
    let (content, options) = (serde_json::Value::Null, WorkOptions::default());

    let rejection = lookup_accessor_handles(&worker, &containers, &read_checks(), &context(&content, &options))
        .await
        .into_ready()
        .unwrap_err();
    assert!(!rejection.known_reason);
    // Two pairs started; the third never got its turn.
    assert!(backend.was_called("b", "createHandle"));
    assert!(!backend.was_called("c", "createHandle"));
}

// ── Scenario: source priorities FILE_SHARE(2), LOCAL_FOLDER(1) ───────────────

fn copy_expectation() -> Expectation {
    Expectation::new("exp-copy", ExpectationType::FileCopy, "manager0")
        .with_source(
            PackageContainer::new("nas", "NAS").with_accessor("share", file_share().with_priority(2)),
        )
        .with_source(
            PackageContainer::new("disk", "Local disk")
                .with_accessor("local", local_folder().with_priority(1)),
        )
}

#[tokio::test]
async fn prefers_local_folder_over_file_share() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let ready = lookup_sources(&worker, &copy_expectation(), &read_checks())
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "local");
    assert_eq!(ready.handle.accessor_id(), "local");
}

#[tokio::test]
async fn falls_back_to_file_share_when_local_read_fails() {
    let backend = FakeBackend::new();
    backend.configure(
        "local",
        FakeBehavior {
            fail_read: true,
            ..Default::default()
        },
    );
    let worker = worker(&backend, WorkerConfig::default());
    let ready = lookup_sources(&worker, &copy_expectation(), &read_checks())
        .await
        .into_ready()
        .unwrap();
    assert_eq!(ready.accessor_id, "share");
    assert_eq!(ready.container.container_id, "nas");
}

// ── Cost ─────────────────────────────────────────────────────────────────────

#[test]
fn standard_cost_uses_cheapest_reachable_accessors() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let exp = copy_expectation().with_target(
        PackageContainer::new("playout", "Playout").with_accessor("target", file_share()),
    );
    // LOCAL_FOLDER (1) + FILE_SHARE (2)
    assert_eq!(get_standard_cost(&exp, &worker), Some(90));
}

#[test]
fn standard_cost_without_sources_counts_target_only() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let exp = Expectation::new("exp-render", ExpectationType::RenderHtml, "manager0")
        .with_target(PackageContainer::new("out", "Output").with_accessor("t", local_folder()));
    let cost = get_standard_cost(&exp, &worker).unwrap();
    assert_eq!(cost, 30);
    assert_eq!(cost % 30, 0);
}

#[test]
fn standard_cost_is_none_without_reachable_target() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());

    let no_targets = copy_expectation();
    assert_eq!(get_standard_cost(&no_targets, &worker), None);

    let elsewhere = Accessor::new(AccessorKind::LocalFolder {
        folder_path: Some("/media".to_string()),
        file_path: None,
        resource_id: Some("pc-9".to_string()),
    })
    .with_write();
    let unreachable = copy_expectation()
        .with_target(PackageContainer::new("far", "Other computer").with_accessor("t", elsewhere));
    assert_eq!(get_standard_cost(&unreachable, &worker), None);
}

#[test]
fn standard_cost_is_none_without_reachable_source() {
    let backend = FakeBackend::new();
    let worker = worker(&backend, WorkerConfig::default());
    let write_only_source = Accessor::new(AccessorKind::LocalFolder {
        folder_path: Some("/media".to_string()),
        file_path: None,
        resource_id: None,
    })
    .with_write();
    let exp = Expectation::new("exp", ExpectationType::FileCopy, "manager0")
        .with_source(PackageContainer::new("src", "Source").with_accessor("s", write_only_source))
        .with_target(PackageContainer::new("dst", "Target").with_accessor("t", local_folder()));
    assert_eq!(get_standard_cost(&exp, &worker), None);
}
