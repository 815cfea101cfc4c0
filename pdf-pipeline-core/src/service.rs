//! Long-running service loop.
//!
//! The loop owns process lifetime: it long-polls the queue, discards poison
//! messages, hands everything else to a [`JobHandler`], acknowledges only on
//! success, emits a heartbeat once per period, and returns once `max_runtime`
//! has elapsed. The ceiling is checked between iterations only, so a job already
//! in flight always finishes first. Restarting the process is left to whatever
//! supervises it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServiceSettings;
use crate::contract::{Clock, JobHandler, MessageQueue};

/// Messages redelivered this many times or more are dropped unprocessed.
pub const POISON_THRESHOLD: u32 = 3;

/// Pause after a transport error so a dead endpoint does not spin the loop.
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Process-wide loop state: timing and the heartbeat schedule.
#[derive(Debug, Clone)]
pub struct ServiceState {
    start_time: Instant,
    max_runtime: Duration,
    poll_wait: Duration,
    heartbeat_period: Duration,
    last_heartbeat_time: Instant,
}

impl ServiceState {
    pub fn new(start_time: Instant, settings: &ServiceSettings) -> Self {
        Self {
            start_time,
            max_runtime: settings.max_runtime(),
            poll_wait: settings.poll_wait(),
            heartbeat_period: settings.heartbeat_period(),
            last_heartbeat_time: start_time,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn last_heartbeat_time(&self) -> Instant {
        self.last_heartbeat_time
    }

    pub fn poll_wait(&self) -> Duration {
        self.poll_wait
    }

    pub fn uptime(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    pub fn deadline_reached(&self, now: Instant) -> bool {
        self.uptime(now) >= self.max_runtime
    }

    /// Advance the heartbeat schedule if a beat is due, returning the uptime to report.
    pub fn take_heartbeat(&mut self, now: Instant) -> Option<Duration> {
        if now.saturating_duration_since(self.last_heartbeat_time) < self.heartbeat_period {
            return None;
        }
        self.last_heartbeat_time = now;
        Some(self.uptime(now))
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing arrived within the poll wait.
    Idle,
    /// Redelivered past the threshold and deleted unprocessed.
    Poisoned,
    /// Processed; `acknowledged` is false if the delete call failed.
    Completed { acknowledged: bool },
    /// Processing failed; the message was left for redelivery.
    Failed,
    /// The queue itself could not be reached.
    TransportError,
}

/// Counters returned when the loop hits its runtime ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub idle: u64,
    pub completed: u64,
    pub failed: u64,
    pub poisoned: u64,
    pub transport_errors: u64,
    pub heartbeats: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: IterationOutcome) {
        self.iterations += 1;
        match outcome {
            IterationOutcome::Idle => self.idle += 1,
            IterationOutcome::Poisoned => self.poisoned += 1,
            IterationOutcome::Completed { .. } => self.completed += 1,
            IterationOutcome::Failed => self.failed += 1,
            IterationOutcome::TransportError => self.transport_errors += 1,
        }
    }
}

pub struct ServiceLoop {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn JobHandler>,
    clock: Arc<dyn Clock>,
    state: ServiceState,
    instance_id: Uuid,
    error_backoff: Duration,
    summary: RunSummary,
}

impl ServiceLoop {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn JobHandler>,
        clock: Arc<dyn Clock>,
        settings: &ServiceSettings,
    ) -> Self {
        let state = ServiceState::new(clock.now(), settings);
        Self {
            queue,
            handler,
            clock,
            state,
            instance_id: Uuid::new_v4(),
            error_backoff: DEFAULT_ERROR_BACKOFF,
            summary: RunSummary::default(),
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Run until `max_runtime` has elapsed, then return the counters.
    pub async fn run(mut self) -> RunSummary {
        info!(
            instance_id = %self.instance_id,
            poll_wait_secs = self.state.poll_wait.as_secs(),
            max_runtime_secs = self.state.max_runtime.as_secs(),
            heartbeat_period_secs = self.state.heartbeat_period.as_secs(),
            "Service loop started, waiting for messages"
        );

        while !self.state.deadline_reached(self.clock.now()) {
            self.run_iteration().await;
        }

        info!(
            instance_id = %self.instance_id,
            uptime_secs = self.state.uptime(self.clock.now()).as_secs(),
            summary = ?self.summary,
            "Maximum runtime reached, service loop stopping"
        );
        self.summary
    }

    /// One heartbeat check plus one receive/dispatch cycle.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        if let Some(uptime) = self.state.take_heartbeat(self.clock.now()) {
            self.summary.heartbeats += 1;
            info!(
                instance_id = %self.instance_id,
                uptime_secs = uptime.as_secs(),
                memory_bytes = resident_memory_bytes(),
                completed = self.summary.completed,
                failed = self.summary.failed,
                "Heartbeat"
            );
        }

        let outcome = self.receive_and_dispatch().await;
        self.summary.record(outcome);
        outcome
    }

    async fn receive_and_dispatch(&self) -> IterationOutcome {
        let message = match self.queue.receive(self.state.poll_wait).await {
            Ok(Some(message)) => message,
            Ok(None) => return IterationOutcome::Idle,
            Err(e) => {
                error!(error = %e, "Failed to receive message from queue");
                if !self.error_backoff.is_zero() {
                    tokio::time::sleep(self.error_backoff).await;
                }
                return IterationOutcome::TransportError;
            }
        };

        if message.redelivery_count >= POISON_THRESHOLD {
            warn!(
                receipt_handle = %message.receipt_handle,
                redelivery_count = message.redelivery_count,
                body = %message.body,
                "Discarding poison message"
            );
            if let Err(e) = self.queue.delete(&message.receipt_handle).await {
                error!(error = %e, receipt_handle = %message.receipt_handle, "Failed to delete poison message");
            }
            return IterationOutcome::Poisoned;
        }

        match self.handler.handle(&message).await {
            Ok(_) => {
                let acknowledged = match self.queue.delete(&message.receipt_handle).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, receipt_handle = %message.receipt_handle, "Failed to delete processed message");
                        false
                    }
                };
                IterationOutcome::Completed { acknowledged }
            }
            Err(e) => {
                warn!(
                    receipt_handle = %message.receipt_handle,
                    redelivery_count = message.redelivery_count,
                    error_kind = e.kind(),
                    "Leaving message on the queue for redelivery"
                );
                IterationOutcome::Failed
            }
        }
    }
}

/// Resident memory of this process, if the platform reports it.
fn resident_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        ProcessRefreshKind::new().with_memory(),
    );
    system.process(pid).map(|p| p.memory())
}
