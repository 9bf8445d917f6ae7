//! End-to-end tests of template assignment through the service layer.
//!
//! Every test drives a [`CertificateService`] over an in-memory store and
//! checks both the service mirror and the store contents, so a mutation that
//! only reached one side shows up as a mismatch.

use std::collections::BTreeMap;

use certify_engine::{
    CertificateService, CertificateState, CertifyError, Config, Eligibility, MemoryStore,
    NewTemplate, ResolutionSource,
};
use certify_report::CoverageReport;
use certify_store::{Course, CourseId, RetryPolicy, TemplateFields, TemplateId};

/// Courses 1-3 registered, no templates.
fn store() -> MemoryStore {
    let state = CertificateState::with_courses([
        Course::new(1, "Rust 101"),
        Course::new(2, "Async Rust"),
        Course::new(3, "Unsafe Rust"),
    ]);
    MemoryStore::new(state, &Config::default())
}

async fn connect(store: &MemoryStore) -> CertificateService<MemoryStore> {
    CertificateService::connect(store.clone(), RetryPolicy::immediate(3))
        .await
        .expect("Failed to connect service")
}

/// Templates A (default) and B, no per-course rows.
async fn two_templates(service: &mut CertificateService<MemoryStore>) -> (TemplateId, TemplateId) {
    let a = service
        .create(NewTemplate::new(TemplateFields::named("A")).as_default())
        .await
        .expect("Failed to create A")
        .template
        .id;
    let b = service
        .create(NewTemplate::new(TemplateFields::named("B")))
        .await
        .expect("Failed to create B")
        .template
        .id;
    (a, b)
}

fn resolved(service: &CertificateService<MemoryStore>, course: u64) -> Option<TemplateId> {
    service.resolve(CourseId(course)).map(|t| t.id)
}

/// Checks that no course has two active rows and at most one default exists.
fn assert_invariants(state: &CertificateState) {
    let mut active: BTreeMap<CourseId, Vec<TemplateId>> = BTreeMap::new();
    for row in state.snapshot().assignments.iter().filter(|r| r.is_active) {
        active.entry(row.course_id).or_default().push(row.template_id);
    }
    for (course, owners) in &active {
        assert_eq!(owners.len(), 1, "Course {course} has owners {owners:?}");
    }

    let defaults = state
        .catalog()
        .all()
        .iter()
        .filter(|t| t.is_default)
        .count();
    assert!(defaults <= 1, "Found {defaults} default templates");
    assert!(state.integrity_issues().is_empty());
}

async fn assert_mirror_matches_store(
    service: &CertificateService<MemoryStore>,
    store: &MemoryStore,
) {
    let stored = store.state().await;
    assert_invariants(&stored);
    assert_invariants(service.state());
    for course in 1..=3 {
        assert_eq!(
            service.resolve(CourseId(course)).map(|t| t.id),
            stored.resolve(CourseId(course)).map(|t| t.id),
            "Mirror and store disagree on course {course}"
        );
    }
}

#[tokio::test]
async fn test_courses_without_assignment_use_default() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, _) = two_templates(&mut service).await;

    assert_eq!(resolved(&service, 1), Some(a));
    assert_eq!(resolved(&service, 2), Some(a));
    assert_eq!(
        service.resolve_detailed(CourseId(1)).source,
        ResolutionSource::Default
    );
}

#[tokio::test]
async fn test_bulk_activation_and_reclaim() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;

    let report = service
        .activate_for_courses(b, &[CourseId(2), CourseId(3)])
        .await
        .unwrap();
    assert_eq!(report.activated, vec![CourseId(2), CourseId(3)]);
    assert_eq!(resolved(&service, 2), Some(b));
    assert_eq!(resolved(&service, 3), Some(b));
    assert_eq!(resolved(&service, 1), Some(a));

    let report = service.activate_for_courses(a, &[CourseId(2)]).await.unwrap();
    assert_eq!(report.revocations.len(), 1);
    assert_eq!(report.revocations[0].previous_template, b);
    assert_eq!(resolved(&service, 2), Some(a));
    let remaining: Vec<_> = service
        .state()
        .assignments()
        .active_courses_of(b)
        .into_iter()
        .collect();
    assert_eq!(remaining, vec![CourseId(3)]);

    assert_mirror_matches_store(&service, &store).await;
}

#[tokio::test]
async fn test_delete_releases_courses_to_default() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;
    service
        .activate_for_courses(b, &[CourseId(3)])
        .await
        .unwrap();

    let deleted = service.delete(b).await.unwrap();

    assert_eq!(deleted.released_courses, vec![CourseId(3)]);
    assert!(!deleted.was_default);
    assert_eq!(resolved(&service, 3), Some(a));
    assert_mirror_matches_store(&service, &store).await;
}

#[tokio::test]
async fn test_deleting_default_leaves_no_default() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(1)]).await.unwrap();

    let deleted = service.delete(a).await.unwrap();

    assert!(deleted.was_default);
    assert_eq!(deleted.promoted, None);
    assert_eq!(resolved(&service, 1), Some(b));
    assert_eq!(resolved(&service, 2), None);
    assert_eq!(
        service.resolve_detailed(CourseId(2)).source,
        ResolutionSource::Fallback
    );
}

#[tokio::test]
async fn test_invariants_hold_across_activation_sequence() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;
    let c = service
        .create(NewTemplate::new(TemplateFields::named("C")))
        .await
        .unwrap()
        .template
        .id;
    let templates = [a, b, c];

    // Linear congruential walk over templates and course subsets.
    let mut seed: u64 = 7;
    for step in 0..40 {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        let template = templates[usize::try_from((seed >> 33) % 3).unwrap()];
        let mask = (seed >> 40) % 7 + 1;
        let courses: Vec<CourseId> = (1..=3u64)
            .filter(|course| mask & (1 << (course - 1)) != 0)
            .map(CourseId)
            .collect();

        service
            .activate_for_courses(template, &courses)
            .await
            .unwrap_or_else(|e| panic!("Step {step} failed: {e}"));

        for &course in &courses {
            assert_eq!(
                service.resolve(course).map(|t| t.id),
                Some(template),
                "Step {step}: course {course} should resolve to {template}"
            );
        }
        assert_mirror_matches_store(&service, &store).await;
    }
}

#[tokio::test]
async fn test_repeated_activation_is_idempotent() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;

    service
        .activate_for_courses(b, &[CourseId(1), CourseId(2)])
        .await
        .unwrap();
    let before = store.state().await.snapshot().assignments;

    let report = service
        .activate_for_courses(b, &[CourseId(2), CourseId(1), CourseId(2)])
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(report.unchanged, vec![CourseId(1), CourseId(2)]);
    assert_eq!(store.state().await.snapshot().assignments, before);
}

#[tokio::test]
async fn test_unknown_course_aborts_whole_batch() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;
    let before = store.state().await.snapshot().assignments;

    let err = service
        .activate_for_courses(b, &[CourseId(1), CourseId(99)])
        .await
        .unwrap_err();

    match err {
        CertifyError::CourseNotFound { ids } => assert_eq!(ids, vec![CourseId(99)]),
        other => panic!("Expected CourseNotFound, got {other:?}"),
    }
    assert_eq!(store.state().await.snapshot().assignments, before);
    assert_eq!(
        service.resolve_detailed(CourseId(1)).source,
        ResolutionSource::Default
    );
}

#[tokio::test]
async fn test_transient_failures_commit_once() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;

    store.fail_next(2);
    service
        .activate_for_courses(b, &[CourseId(1), CourseId(3)])
        .await
        .unwrap();

    let rows: Vec<_> = store
        .state()
        .await
        .snapshot()
        .assignments
        .into_iter()
        .filter(|r| r.template_id == b)
        .collect();
    assert_eq!(rows.len(), 2);
    assert_mirror_matches_store(&service, &store).await;
}

#[tokio::test]
async fn test_exhausted_retries_leave_state_untouched() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;

    store.fail_next(10);
    let err = service
        .activate_for_courses(b, &[CourseId(2)])
        .await
        .unwrap_err();
    store.fail_next(0);

    assert!(matches!(err, CertifyError::TransientStore { .. }));
    assert_eq!(resolved(&service, 2), Some(a));
    assert_eq!(store.state().await.resolve(CourseId(2)).map(|t| t.id), Some(a));
}

#[tokio::test]
async fn test_availability_reports_owner() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(2)]).await.unwrap();

    let availability = service.availability_for(a).unwrap();

    let states: Vec<_> = availability.iter().map(|e| e.eligibility).collect();
    assert_eq!(
        states,
        vec![
            Eligibility::Available,
            Eligibility::Locked { owner: b },
            Eligibility::Available,
        ]
    );
    let selectable: Vec<_> = service
        .available_courses_for(a)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(selectable, vec![CourseId(1), CourseId(3)]);
}

#[tokio::test]
async fn test_create_with_courses_takes_them_over() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(3)]).await.unwrap();

    let created = service
        .create(NewTemplate::new(TemplateFields::named("C")).for_courses([CourseId(3)]))
        .await
        .unwrap();

    let activation = created.activation.expect("Expected an activation report");
    assert_eq!(activation.revocations.len(), 1);
    assert_eq!(resolved(&service, 3), Some(created.template.id));
    assert_mirror_matches_store(&service, &store).await;
}

#[tokio::test]
async fn test_set_default_moves_register() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;

    let previous = service.set_default(b).await.unwrap();

    assert_eq!(previous, Some(a));
    assert_eq!(resolved(&service, 1), Some(b));
    assert_mirror_matches_store(&service, &store).await;
}

#[tokio::test]
async fn test_update_keeps_assignments() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(2)]).await.unwrap();

    let updated = service
        .update(b, TemplateFields::named("B v2").with_colors("#102030", "#A0B0C0"))
        .await
        .unwrap();

    assert_eq!(updated.name(), "B v2");
    assert_eq!(
        service.resolve(CourseId(2)).map(|t| t.name().to_string()),
        Some("B v2".to_string())
    );
}

#[tokio::test]
async fn test_invalid_color_rejected_before_store() {
    let store = store();
    let mut service = connect(&store).await;
    let (a, _) = two_templates(&mut service).await;

    let err = service
        .update(a, TemplateFields::named("A").with_colors("blue", "#FFFFFF"))
        .await
        .unwrap_err();

    assert!(matches!(err, CertifyError::Validation { .. }));
    assert_eq!(
        store.state().await.catalog().get(a).map(|t| t.fields.primary_color.clone()),
        service.state().catalog().get(a).map(|t| t.fields.primary_color.clone())
    );
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let path = std::env::temp_dir().join("test_certify_integration_snapshot.json");
    let store = store();
    let mut service = connect(&store).await;
    let (a, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(3)]).await.unwrap();
    store.state().await.save(&path).await.unwrap();

    let restored = CertificateState::load(&path)
        .await
        .unwrap()
        .expect("Snapshot should exist");
    let store = MemoryStore::new(restored, &Config::default());
    let service = connect(&store).await;

    assert_eq!(resolved(&service, 1), Some(a));
    assert_eq!(resolved(&service, 3), Some(b));
    assert_eq!(service.state().courses().len(), 3);

    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn test_report_reflects_service_state() {
    let store = store();
    let mut service = connect(&store).await;
    let (_, b) = two_templates(&mut service).await;
    service.activate_for_courses(b, &[CourseId(2)]).await.unwrap();

    let report = CoverageReport::from_state(service.state());

    assert_eq!(report.summary.assigned_courses, 1);
    assert_eq!(report.summary.defaulted_courses, 2);
    assert_eq!(report.summary.uncovered_courses, 0);
    assert!(!report.has_warnings());
}
