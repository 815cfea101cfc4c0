use pdf_pipeline_core::config::ServiceSettings;
use pdf_pipeline_core::contract::{ManualClock, MockJobHandler, MockMessageQueue};
use pdf_pipeline_core::convert::ConversionPath;
use pdf_pipeline_core::error::JobError;
use pdf_pipeline_core::processor::JobReport;
use pdf_pipeline_core::service::{IterationOutcome, RunSummary, ServiceLoop, POISON_THRESHOLD};
use pdf_pipeline_core::ReceivedMessage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Scripted = Result<Option<ReceivedMessage>, &'static str>;

fn message(handle: &str, redelivery_count: u32) -> ReceivedMessage {
    ReceivedMessage {
        receipt_handle: handle.into(),
        body: r#"{"article_id":"a1"}"#.into(),
        redelivery_count,
    }
}

fn report() -> JobReport {
    JobReport {
        article_id: "a1".into(),
        conversion: ConversionPath::Text,
        uploaded_keys: vec!["md/a1.md".into()],
        published: true,
        webhook_sent: false,
    }
}

fn settings(wait: u64, heartbeat: u64, max_runtime: u64) -> ServiceSettings {
    ServiceSettings {
        wait_seconds: wait,
        heartbeat_period_seconds: heartbeat,
        max_runtime_seconds: max_runtime,
        ..ServiceSettings::default()
    }
}

/// Queue that replays `script` (then stays idle) and advances `clock` by `step` per receive.
fn scripted_queue(clock: Arc<ManualClock>, step: Duration, script: Vec<Scripted>) -> MockMessageQueue {
    let script = Mutex::new(VecDeque::from(script));
    let mut queue = MockMessageQueue::new();
    queue.expect_receive().returning(move |_wait| {
        clock.advance(step);
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
            .map_err(Into::into)
    });
    queue
}

fn service(queue: MockMessageQueue, handler: MockJobHandler, clock: Arc<ManualClock>, settings: &ServiceSettings) -> ServiceLoop {
    ServiceLoop::new(Arc::new(queue), Arc::new(handler), clock, settings)
        .with_error_backoff(Duration::ZERO)
}

#[tokio::test]
async fn poison_message_is_deleted_without_processing() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![Ok(Some(message("rh-poison", POISON_THRESHOLD)))],
    );
    queue
        .expect_delete()
        .withf(|handle| handle == "rh-poison")
        .times(1)
        .returning(|_| Ok(()));
    let mut handler = MockJobHandler::new();
    handler.expect_handle().never();

    let mut service = service(queue, handler, clock, &settings(30, 300, 3600));
    assert_eq!(service.run_iteration().await, IterationOutcome::Poisoned);
    assert_eq!(service.summary().poisoned, 1);
}

#[tokio::test]
async fn message_below_threshold_is_processed_and_acknowledged() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![Ok(Some(message("rh-ok", POISON_THRESHOLD - 1)))],
    );
    queue
        .expect_delete()
        .withf(|handle| handle == "rh-ok")
        .times(1)
        .returning(|_| Ok(()));
    let mut handler = MockJobHandler::new();
    handler
        .expect_handle()
        .withf(|msg| msg.receipt_handle == "rh-ok")
        .times(1)
        .returning(|_| Ok(report()));

    let mut service = service(queue, handler, clock, &settings(30, 300, 3600));
    assert_eq!(
        service.run_iteration().await,
        IterationOutcome::Completed { acknowledged: true }
    );
}

#[tokio::test]
async fn failed_job_is_never_deleted() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![Ok(Some(message("rh-fail", 0)))],
    );
    queue.expect_delete().never();
    let mut handler = MockJobHandler::new();
    handler
        .expect_handle()
        .times(1)
        .returning(|_| Err(JobError::MissingField("pdf_url")));

    let mut service = service(queue, handler, clock, &settings(30, 300, 3600));
    assert_eq!(service.run_iteration().await, IterationOutcome::Failed);
    assert_eq!(service.summary().failed, 1);
}

#[tokio::test]
async fn failed_delete_after_success_is_reported_but_not_fatal() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![Ok(Some(message("rh-1", 0))), Ok(None)],
    );
    queue
        .expect_delete()
        .times(1)
        .returning(|_| Err("receipt handle expired".into()));
    let mut handler = MockJobHandler::new();
    handler.expect_handle().times(1).returning(|_| Ok(report()));

    let mut service = service(queue, handler, clock, &settings(30, 300, 3600));
    assert_eq!(
        service.run_iteration().await,
        IterationOutcome::Completed { acknowledged: false }
    );
    assert_eq!(service.run_iteration().await, IterationOutcome::Idle);
}

#[tokio::test]
async fn transport_errors_do_not_stop_the_loop() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![
            Err("connection reset"),
            Ok(None),
            Ok(Some(message("rh-after-error", 0))),
        ],
    );
    queue.expect_delete().times(1).returning(|_| Ok(()));
    let mut handler = MockJobHandler::new();
    handler.expect_handle().times(1).returning(|_| Ok(report()));

    let mut service = service(queue, handler, clock, &settings(30, 300, 3600));
    assert_eq!(service.run_iteration().await, IterationOutcome::TransportError);
    assert_eq!(service.run_iteration().await, IterationOutcome::Idle);
    assert_eq!(
        service.run_iteration().await,
        IterationOutcome::Completed { acknowledged: true }
    );
    assert_eq!(service.summary().transport_errors, 1);
}

#[tokio::test]
async fn receive_uses_configured_poll_wait() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = MockMessageQueue::new();
    queue
        .expect_receive()
        .withf(|wait| *wait == Duration::from_secs(7))
        .times(1)
        .returning(|_| Ok(None));
    let mut service = service(queue, MockJobHandler::new(), clock, &settings(7, 300, 3600));
    assert_eq!(service.run_iteration().await, IterationOutcome::Idle);
}

#[tokio::test]
async fn run_stops_at_the_runtime_ceiling_with_periodic_heartbeats() {
    let clock = Arc::new(ManualClock::new());
    let queue = scripted_queue(clock.clone(), Duration::from_secs(10), Vec::new());
    let mut handler = MockJobHandler::new();
    handler.expect_handle().never();

    let summary = service(queue, handler, clock, &settings(10, 20, 60)).run().await;
    assert_eq!(
        summary,
        RunSummary {
            iterations: 6,
            idle: 6,
            heartbeats: 2,
            ..RunSummary::default()
        }
    );
}

#[tokio::test]
async fn in_flight_job_finishes_before_the_ceiling_is_honoured() {
    let clock = Arc::new(ManualClock::new());
    let mut queue = scripted_queue(
        clock.clone(),
        Duration::from_secs(1),
        vec![Ok(Some(message("rh-slow", 0)))],
    );
    queue.expect_delete().times(1).returning(|_| Ok(()));

    let handler_clock = clock.clone();
    let mut handler = MockJobHandler::new();
    handler.expect_handle().times(1).returning(move |_| {
        // the job alone outlives the whole runtime budget
        handler_clock.advance(Duration::from_secs(120));
        Ok(report())
    });

    let summary = service(queue, handler, clock, &settings(30, 300, 60)).run().await;
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.completed, 1);
}
