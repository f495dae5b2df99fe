//! Domain tests for status ordering and upstream merge rules.

use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;

use super::support::SeedTask;
use crate::task::domain::{
    ErrorCategory, ExternalTaskId, Platform, TaskDomainError, TaskError, TaskErrorKind,
    TaskPayload, TaskStatus, UpstreamTaskRecord,
};

#[fixture]
fn clock() -> DefaultClock {
    DefaultClock
}

fn record(id: &str) -> UpstreamTaskRecord {
    UpstreamTaskRecord::new(ExternalTaskId::new(id))
}

#[rstest]
#[case::forward(TaskStatus::Submitted, TaskStatus::InProgress, true)]
#[case::same(TaskStatus::InProgress, TaskStatus::InProgress, true)]
#[case::to_failure(TaskStatus::Queued, TaskStatus::Failure, true)]
#[case::regression(TaskStatus::InProgress, TaskStatus::Submitted, false)]
#[case::unknown_over_known(TaskStatus::Queued, TaskStatus::Unknown, false)]
#[case::unknown_over_unknown(TaskStatus::Unknown, TaskStatus::Unknown, true)]
#[case::out_of_success(TaskStatus::Success, TaskStatus::Failure, false)]
#[case::out_of_failure(TaskStatus::Failure, TaskStatus::Success, false)]
fn status_transitions_only_move_forward(
    #[case] from: TaskStatus,
    #[case] to: TaskStatus,
    #[case] allowed: bool,
) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[rstest]
#[case("SUCCESS", TaskStatus::Success)]
#[case(" in_progress ", TaskStatus::InProgress)]
#[case("NOT_START", TaskStatus::NotStart)]
fn status_parses_storage_form(#[case] raw: &str, #[case] expected: TaskStatus) {
    assert_eq!(TaskStatus::try_from(raw), Ok(expected));
}

#[rstest]
fn status_rejects_foreign_words() {
    assert!(TaskStatus::try_from("completed").is_err());
}

#[rstest]
fn new_tasks_start_unstarted_at_zero_progress() {
    let task = SeedTask::new(Platform::Suno, "t-1").build();

    assert_eq!(task.progress(), "0%");
    assert!(task.submit_time() > 0);
    assert_eq!(task.start_time(), 0);
    assert!(!task.is_finished());
}

#[rstest]
fn merge_keeps_local_fields_the_upstream_omits(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::Suno, "t-1")
        .data(json!({"clips": ["a"]}))
        .build();
    let mut first = record("t-1");
    first.status = Some(TaskStatus::InProgress);
    first.progress = Some("40%".to_owned());
    first.start_time = 1_700_000_100;
    task.apply_upstream(first, &clock).expect("update applies");

    let mut sparse = record("t-1");
    sparse.status = Some(TaskStatus::Unknown);
    sparse.progress = Some("   ".to_owned());
    let outcome = task.apply_upstream(sparse, &clock).expect("update applies");

    assert_eq!(outcome.status, TaskStatus::InProgress);
    assert_eq!(task.progress(), "40%");
    assert_eq!(task.start_time(), 1_700_000_100);
    assert_eq!(task.data().as_value(), &json!({"clips": ["a"]}));
}

#[rstest]
fn terminal_reports_force_complete_progress_and_stamp_times(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::CustomPass, "t-2").build();
    let mut done = record("t-2");
    done.status = Some(TaskStatus::Success);
    done.progress = Some("90%".to_owned());

    task.apply_upstream(done, &clock).expect("update applies");

    assert_eq!(task.status(), TaskStatus::Success);
    assert_eq!(task.progress(), "100%");
    assert!(task.start_time() > 0);
    assert!(task.finish_time() >= task.start_time());
    assert!(task.is_finished());
}

#[rstest]
fn failure_is_reported_once(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::Kling, "t-3").quota(500).build();

    let first = task.fail("boom", &clock).expect("failure applies");
    let second = task.fail("boom again", &clock);

    assert!(first.became_failed);
    assert_eq!(task.fail_reason(), "boom");
    assert_eq!(
        second,
        Err(TaskDomainError::AlreadyFinished(ExternalTaskId::new("t-3")))
    );
}

#[rstest]
fn identical_reports_need_no_update(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::Suno, "t-4").build();
    let mut report = record("t-4");
    report.status = Some(TaskStatus::InProgress);
    report.progress = Some("10%".to_owned());
    report.data = Some(TaskPayload::new(json!({"a": 1, "b": [1, 2]})));
    task.apply_upstream(report.clone(), &clock)
        .expect("update applies");

    assert!(!task.needs_update(&report));
}

#[rstest]
fn reordered_payloads_need_no_update(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::Suno, "t-5").build();
    let mut report = record("t-5");
    report.status = Some(TaskStatus::InProgress);
    report.data = Some(TaskPayload::from_bytes(br#"{"a":1,"b":"x"}"#));
    task.apply_upstream(report, &clock).expect("update applies");

    let mut reordered = record("t-5");
    reordered.status = Some(TaskStatus::InProgress);
    reordered.data = Some(TaskPayload::from_bytes(br#"{"b":"x","a":1}"#));

    assert!(!task.needs_update(&reordered));
}

#[rstest]
fn changed_payloads_need_an_update() {
    let task = SeedTask::new(Platform::Suno, "t-6")
        .data(json!({"a": 1}))
        .build();
    let mut report = record("t-6");
    report.data = Some(TaskPayload::new(json!({"a": 2})));

    assert!(task.needs_update(&report));
}

#[rstest]
fn finished_tasks_never_need_updates(clock: DefaultClock) {
    let mut task = SeedTask::new(Platform::Suno, "t-7").build();
    task.fail("gone", &clock).expect("failure applies");
    let mut report = record("t-7");
    report.status = Some(TaskStatus::Success);

    assert!(!task.needs_update(&report));
}

#[rstest]
fn refunds_are_owed_only_for_charged_unfailed_tasks() {
    let charged = SeedTask::new(Platform::Suno, "a").quota(10).build();
    let free = SeedTask::new(Platform::Suno, "b").build();
    let failed = SeedTask::new(Platform::Suno, "c")
        .quota(10)
        .status(TaskStatus::Failure)
        .build();

    assert!(charged.owes_refund_on_failure());
    assert!(!free.owes_refund_on_failure());
    assert!(!failed.owes_refund_on_failure());
}

#[rstest]
fn non_json_payloads_are_kept_verbatim() {
    let payload = TaskPayload::from_bytes(b"plain text");

    assert_eq!(payload.as_value(), &json!("plain text"));
    assert!(TaskPayload::from_bytes(b"").is_empty());
}

#[rstest]
#[case(TaskErrorKind::InvalidRequest, "invalid_request", 400, ErrorCategory::Client)]
#[case(TaskErrorKind::QuotaNotEnough, "quota_not_enough", 403, ErrorCategory::Client)]
#[case(TaskErrorKind::UpstreamError, "upstream_error", 400, ErrorCategory::Upstream)]
#[case(TaskErrorKind::DoRequestFailed, "do_request_failed", 500, ErrorCategory::Transport)]
#[case(
    TaskErrorKind::InvalidApiPlatform,
    "invalid_api_platform",
    400,
    ErrorCategory::Configuration
)]
#[case(
    TaskErrorKind::InsertTaskFailed,
    "insert_task_failed",
    500,
    ErrorCategory::Persistence
)]
fn task_errors_carry_stable_codes(
    #[case] kind: TaskErrorKind,
    #[case] code: &str,
    #[case] status: u16,
    #[case] category: ErrorCategory,
) {
    let err = TaskError::local(kind, "detail");

    assert_eq!(err.code(), code);
    assert_eq!(err.status_code(), status);
    assert_eq!(err.category(), category);
    assert!(err.is_local());
    assert_eq!(err.to_string(), format!("{code}: detail"));
}

#[rstest]
fn wrapped_errors_may_override_status() {
    let err = TaskError::wrap(TaskErrorKind::FailToFetchTask, "bad gateway").with_status(503);

    assert!(!err.is_local());
    assert_eq!(err.status_code(), 503);
    assert_eq!(err.body().code, "fail_to_fetch_task");
    assert_eq!(err.body().message, "bad gateway");
}

#[rstest]
#[case("suno", Platform::Suno)]
#[case("Kling", Platform::Kling)]
#[case("midjourney", Platform::Midjourney)]
#[case("custompass", Platform::CustomPass)]
fn platforms_parse_case_insensitively(#[case] raw: &str, #[case] expected: Platform) {
    assert_eq!(Platform::try_from(raw), Ok(expected));
}
