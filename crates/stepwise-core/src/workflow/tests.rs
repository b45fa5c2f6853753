//! End-to-end engine tests: in-memory store and queue, a manual clock, and
//! the job worker draining due jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use stepwise_types::config::WorkerConfig;
use stepwise_types::execution::{
    ExecutionView, StepExecution, StepExecutionStatus, WorkflowExecution, WorkflowExecutionStatus,
};
use stepwise_types::job::{Job, JobStatus};
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::jobs::{InMemoryJobQueue, JobWorker};
use crate::repository::{InMemoryWorkflowRepository, WorkflowRepository};
use crate::step::{StepContext, StepError, StepHandler, StepOutcome, StepRegistry};

use super::*;

type Engine = WorkflowEngine<InMemoryWorkflowRepository, InMemoryJobQueue>;

// ---------------------------------------------------------------------------
// Test step handlers
// ---------------------------------------------------------------------------

/// Fails every attempt and asks for a retry with default backoff.
struct AlwaysRetryStep;

impl StepHandler for AlwaysRetryStep {
    fn step_type(&self) -> &str {
        "AlwaysRetryStep"
    }

    async fn validate_input(&self, _: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn can_execute(&self, _: &StepContext) -> bool {
        true
    }

    async fn execute(&self, _: &StepContext) -> StepOutcome {
        StepOutcome::retryable("upstream unavailable", None)
    }
}

/// Fails once, without asking for a retry.
struct FailStep;

impl StepHandler for FailStep {
    fn step_type(&self) -> &str {
        "FailStep"
    }

    async fn validate_input(&self, _: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn can_execute(&self, _: &StepContext) -> bool {
        true
    }

    async fn execute(&self, _: &StepContext) -> StepOutcome {
        StepOutcome::failure("permanent failure")
    }
}

/// Outputs the workflow data map it was given.
struct EchoStep;

impl StepHandler for EchoStep {
    fn step_type(&self) -> &str {
        "EchoStep"
    }

    async fn validate_input(&self, _: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn can_execute(&self, _: &StepContext) -> bool {
        true
    }

    async fn execute(&self, ctx: &StepContext) -> StepOutcome {
        StepOutcome::success(Value::Object(ctx.workflow_data.clone()))
    }
}

/// Succeeds and counts how many times it ran.
struct CountingStep {
    runs: Arc<AtomicUsize>,
}

impl StepHandler for CountingStep {
    fn step_type(&self) -> &str {
        "CountingStep"
    }

    async fn validate_input(&self, _: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn can_execute(&self, _: &StepContext) -> bool {
        true
    }

    async fn execute(&self, _: &StepContext) -> StepOutcome {
        let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        StepOutcome::success(json!({ "runs": runs }))
    }
}

struct PanicStep;

impl StepHandler for PanicStep {
    fn step_type(&self) -> &str {
        "PanicStep"
    }

    async fn validate_input(&self, _: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn can_execute(&self, _: &StepContext) -> bool {
        true
    }

    async fn execute(&self, _: &StepContext) -> StepOutcome {
        panic!("handler bug")
    }
}

// ---------------------------------------------------------------------------
// Notification sinks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl NotificationSink for RecordingSink {
    fn execution_started(&self, _: &WorkflowExecution, name: &str) -> Result<(), NotifyError> {
        self.push(format!("started:{name}"));
        Ok(())
    }

    fn workflow_status_changed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError> {
        self.push(format!("workflow:{}", execution.status));
        Ok(())
    }

    fn step_status_changed(&self, step: &StepExecution, name: &str) -> Result<(), NotifyError> {
        self.push(format!("step:{name}:{}", step.status));
        Ok(())
    }

    fn execution_completed(&self, execution: &WorkflowExecution) -> Result<(), NotifyError> {
        self.push(format!("completed:{}", execution.status));
        Ok(())
    }
}

struct FailingSink;

impl NotificationSink for FailingSink {
    fn execution_started(&self, _: &WorkflowExecution, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("hub offline".into()))
    }

    fn workflow_status_changed(&self, _: &WorkflowExecution) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("hub offline".into()))
    }

    fn step_status_changed(&self, _: &StepExecution, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("hub offline".into()))
    }

    fn execution_completed(&self, _: &WorkflowExecution) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("hub offline".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    repo: InMemoryWorkflowRepository,
    queue: InMemoryJobQueue,
    clock: Arc<ManualClock>,
    engine: Arc<Engine>,
    worker: JobWorker<InMemoryJobQueue, Engine>,
    sink: Arc<RecordingSink>,
    runs: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self::with_sink(None)
    }

    fn with_sink(sink_override: Option<Arc<dyn NotificationSink>>) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let repo = InMemoryWorkflowRepository::new();
        let queue = InMemoryJobQueue::with_clock(clock.clone());

        let mut registry = StepRegistry::with_builtin_steps();
        registry.register_handler("AlwaysRetryStep", || AlwaysRetryStep);
        registry.register_handler("FailStep", || FailStep);
        registry.register_handler("EchoStep", || EchoStep);
        registry.register_handler("PanicStep", || PanicStep);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        registry.register_handler("CountingStep", move || CountingStep {
            runs: counter.clone(),
        });

        let sink = Arc::new(RecordingSink::default());
        let notifier: Arc<dyn NotificationSink> = match sink_override {
            Some(notifier) => notifier,
            None => sink.clone(),
        };
        let engine = Arc::new(
            WorkflowEngine::new(repo.clone(), queue.clone(), registry)
                .with_notifier(notifier)
                .with_clock(clock.clone()),
        );
        let worker = JobWorker::new(
            Arc::new(queue.clone()),
            engine.clone(),
            WorkerConfig::default(),
        )
        .with_clock(clock.clone());

        Self {
            repo,
            queue,
            clock,
            engine,
            worker,
            sink,
            runs,
        }
    }

    /// Pending `ProcessStep` jobs for one step execution.
    async fn pending_step_jobs(&self, step_execution_id: Uuid) -> usize {
        self.queue
            .jobs()
            .await
            .iter()
            .filter(|j| {
                j.status == JobStatus::Pending && j.job == Job::ProcessStep { step_execution_id }
            })
            .count()
    }

    fn now(&self) -> DateTime<Utc> {
        crate::clock::Clock::now(self.clock.as_ref())
    }

    async fn define(&self, builder: WorkflowBuilder) -> Uuid {
        builder.save(&self.repo).await.unwrap()
    }

    async fn status(&self, execution_id: Uuid) -> ExecutionView {
        self.engine.get_status(execution_id).await.unwrap()
    }

    async fn drain(&self) -> usize {
        self.worker.run_due().await.unwrap()
    }

    /// Move the clock to the earliest pending job. Returns `false` if none.
    async fn advance_to_next_job(&self) -> bool {
        let next = self
            .queue
            .jobs()
            .await
            .into_iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.run_at)
            .min();
        match next {
            Some(at) => {
                if at > self.now() {
                    self.clock.set(at);
                }
                true
            }
            None => false,
        }
    }

    /// Drain and advance the clock until the execution is terminal.
    async fn run_to_end(&self, execution_id: Uuid) -> ExecutionView {
        for _ in 0..50 {
            self.drain().await;
            let view = self.status(execution_id).await;
            if view.status.is_terminal() || !self.advance_to_next_job().await {
                return view;
            }
        }
        panic!("execution {execution_id} did not finish");
    }
}

fn log(message: &str) -> Option<Value> {
    Some(json!({ "message": message }))
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn immediate_start_runs_all_steps_to_completion() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("greet")
                .add_step("LogStep", "hello", 1, 0, log("hello"))
                .add_step("DelayStep", "wait", 2, 0, Some(json!({ "delay_seconds": 2 })))
                .add_step("LogStep", "bye", 3, 0, log("bye")),
        )
        .await;

    let id = h.engine.start(def, None, None).await.unwrap();
    let started = h.status(id).await;
    assert_eq!(started.status, WorkflowExecutionStatus::Running);
    assert!(started.started_time.is_some());

    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Completed);
    assert!(view.completed_time.is_some());
    assert!(view.steps.iter().all(|s| s.status == StepExecutionStatus::Completed));

    let output = view.output_data.unwrap();
    assert_eq!(output["hello"]["message"], "hello");
    assert_eq!(output["bye"]["message"], "bye");
    assert_eq!(output["wait"]["delay_seconds"], 2);
}

#[tokio::test]
async fn future_start_stays_pending_until_scheduled_time() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("later").add_step("LogStep", "hello", 1, 0, log("hi")))
        .await;
    let at = h.now() + Duration::hours(1);

    let id = h.engine.start(def, None, Some(at)).await.unwrap();

    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Pending);
    assert_eq!(view.scheduled_time, Some(at));
    assert!(view.started_time.is_none());
    assert!(
        view.steps
            .iter()
            .all(|s| s.status == StepExecutionStatus::Pending && s.started_time.is_none())
    );

    assert_eq!(h.drain().await, 0);
    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Pending);

    h.clock.set(at);
    h.drain().await;
    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Completed);
    assert!(view.started_time.is_some());
}

#[tokio::test]
async fn cancel_running_execution_makes_driver_a_noop() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("cancel-me")
                .add_step("LogStep", "a", 1, 0, log("a"))
                .add_step("LogStep", "b", 2, 0, log("b")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();

    assert!(h.engine.cancel(id).await.unwrap());
    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Cancelled);
    assert!(view.completed_time.is_some());

    // The driver job queued by start fires and does nothing.
    assert_eq!(h.drain().await, 1);
    assert_eq!(h.engine.process_workflow(id).await, DriverOutcome::Inactive);
    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Cancelled);
    assert!(view.steps.iter().all(|s| s.status == StepExecutionStatus::Pending));

    assert!(!h.engine.cancel(id).await.unwrap());
    assert!(!h.engine.cancel(Uuid::now_v7()).await.unwrap());
}

#[tokio::test]
async fn retry_exhaustion_fails_step_and_execution() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("flaky").add_step("AlwaysRetryStep", "call-api", 1, 0, None))
        .await;
    let started = h.now();
    let id = h.engine.start(def, None, None).await.unwrap();

    h.drain().await;
    let view = h.status(id).await;
    let step = &view.steps[0];
    assert_eq!(step.status, StepExecutionStatus::Retrying);
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.scheduled_time, Some(started + Duration::minutes(2)));
    assert_eq!(step.error_message.as_deref(), Some("upstream unavailable"));
    assert_eq!(view.status, WorkflowExecutionStatus::Running);

    let view = h.run_to_end(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
    assert_eq!(view.error_message.as_deref(), Some("call-api"));
    let step = &view.steps[0];
    assert_eq!(step.status, StepExecutionStatus::Failed);
    assert_eq!(step.retry_count, 3);
    assert!(step.completed_time.is_some());

    // 2 + 4 + 8 minutes of backoff.
    assert_eq!(h.now(), started + Duration::minutes(14));
}

#[tokio::test]
async fn pause_and_resume_continue_from_pending_step() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("pausable")
                .add_step("LogStep", "a", 1, 0, log("a"))
                .add_step("LogStep", "b", 2, 0, log("b")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();

    let first = h.engine.process_workflow(id).await;
    assert!(matches!(first, DriverOutcome::Advanced { .. }));

    assert!(h.engine.pause(id).await.unwrap());
    assert!(!h.engine.pause(id).await.unwrap());
    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Paused);

    h.drain().await;
    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Paused);
    assert_eq!(view.steps[0].status, StepExecutionStatus::Completed);
    assert_eq!(view.steps[1].status, StepExecutionStatus::Pending);
    let a_completed = view.steps[0].completed_time;

    assert!(h.engine.resume(id).await.unwrap());
    assert!(!h.engine.resume(id).await.unwrap());
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Completed);
    assert_eq!(view.steps[0].completed_time, a_completed);
    assert_eq!(view.steps[1].status, StepExecutionStatus::Completed);
}

// ---------------------------------------------------------------------------
// Driver and processor behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn step_delay_defers_to_scheduled_callback() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("delayed")
                .add_step("LogStep", "now", 1, 0, log("now"))
                .add_step("LogStep", "later", 2, 5, log("later")),
        )
        .await;
    let at = h.now();
    let id = h.engine.start(def, None, Some(at)).await.unwrap();
    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Running);

    h.drain().await;
    let view = h.status(id).await;
    assert_eq!(view.steps[0].status, StepExecutionStatus::Completed);
    assert_eq!(view.steps[1].status, StepExecutionStatus::Pending);
    assert_eq!(view.steps[1].scheduled_time, Some(at + Duration::minutes(5)));
    assert!(h.queue.jobs().await.iter().any(|j| {
        j.status == JobStatus::Pending
            && j.job
                == Job::ProcessStep {
                    step_execution_id: view.steps[1].step_execution_id,
                }
    }));

    h.clock.advance(Duration::minutes(5));
    h.drain().await;
    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Completed);
}

#[tokio::test]
async fn failed_step_does_not_block_later_steps() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("mixed")
                .add_step("FailStep", "broken", 1, 0, None)
                .add_step("LogStep", "after", 2, 0, log("after")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
    assert_eq!(view.error_message.as_deref(), Some("broken"));
    assert_eq!(view.steps[0].status, StepExecutionStatus::Failed);
    assert_eq!(view.steps[0].error_message.as_deref(), Some("permanent failure"));
    assert_eq!(view.steps[0].retry_count, 0);
    assert_eq!(view.steps[1].status, StepExecutionStatus::Completed);
    assert!(view.output_data.is_none());
}

#[tokio::test]
async fn invalid_input_fails_and_unmet_conditions_skip() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("checks")
                .add_step("LogStep", "quiet", 1, 0, log(""))
                .add_step("DelayStep", "bad-delay", 2, 0, Some(json!({ "delay_seconds": 0 })))
                .add_step("LogStep", "no-config", 3, 0, None),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.steps[0].status, StepExecutionStatus::Skipped);
    assert_eq!(
        view.steps[0].error_message.as_deref(),
        Some("Step conditions not met")
    );
    assert_eq!(view.steps[1].status, StepExecutionStatus::Failed);
    assert_eq!(
        view.steps[1].error_message.as_deref(),
        Some("Input validation failed: delay_seconds must be greater than 0")
    );
    assert_eq!(view.steps[2].status, StepExecutionStatus::Failed);
    assert!(
        view.steps[2]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Input validation failed:")
    );
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
    assert_eq!(view.error_message.as_deref(), Some("bad-delay, no-config"));
}

#[tokio::test]
async fn skipped_steps_complete_without_output() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("skippy")
                .add_step("LogStep", "quiet", 1, 0, log(""))
                .add_step("LogStep", "loud", 2, 0, log("loud")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.status, WorkflowExecutionStatus::Completed);
    let output = view.output_data.unwrap();
    assert!(output.get("quiet").is_none());
    assert!(output.get("loud").is_some());
}

#[tokio::test]
async fn unknown_step_type_fails_step() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("typo").add_step("SmsStep", "text", 1, 0, None))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.steps[0].status, StepExecutionStatus::Failed);
    assert_eq!(
        view.steps[0].error_message.as_deref(),
        Some("unknown step type 'SmsStep'")
    );
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
}

#[tokio::test]
async fn panicking_handler_fails_step() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("buggy").add_step("PanicStep", "explode", 1, 0, None))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let view = h.status(id).await;
    assert_eq!(view.steps[0].status, StepExecutionStatus::Failed);
    assert_eq!(
        view.steps[0].error_message.as_deref(),
        Some("step panicked: handler bug")
    );
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
}

#[tokio::test]
async fn later_steps_see_input_and_prior_outputs() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("echo")
                .add_step("LogStep", "first", 1, 0, log("one"))
                .add_step("EchoStep", "echo", 2, 0, None),
        )
        .await;
    let id = h
        .engine
        .start(def, Some(json!({ "customer": "acme" })), None)
        .await
        .unwrap();
    h.drain().await;

    let view = h.status(id).await;
    let echoed = &view.output_data.unwrap()["echo"];
    assert_eq!(echoed["customer"], "acme");
    assert_eq!(echoed["step_first"]["message"], "one");
    assert!(echoed.get("step_echo").is_none());
}

#[tokio::test]
async fn processor_ignores_finished_and_missing_steps() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("once").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let step_id = h.status(id).await.steps[0].step_execution_id;
    assert_eq!(h.engine.process_step(step_id).await, StepDisposition::Ignored);
    assert_eq!(
        h.engine.process_step(Uuid::now_v7()).await,
        StepDisposition::Missing
    );
    assert_eq!(
        h.engine.process_workflow(Uuid::now_v7()).await,
        DriverOutcome::Missing
    );
}

#[tokio::test]
async fn processor_skips_steps_of_paused_execution() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("hold").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    let step_id = h.status(id).await.steps[0].step_execution_id;

    h.engine.pause(id).await.unwrap();
    assert_eq!(h.engine.process_step(step_id).await, StepDisposition::Ignored);
    assert_eq!(
        h.status(id).await.steps[0].status,
        StepExecutionStatus::Pending
    );
}

#[tokio::test]
async fn retry_callback_is_scheduled_once() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("flaky").add_step("AlwaysRetryStep", "call-api", 1, 0, None))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();

    h.drain().await;
    let step = h.status(id).await.steps[0].clone();
    assert_eq!(step.status, StepExecutionStatus::Retrying);
    assert_eq!(h.pending_step_jobs(step.step_execution_id).await, 1);

    // A late driver tick leaves the retry to its own callback.
    assert_eq!(h.engine.process_workflow(id).await, DriverOutcome::Waiting);
    assert_eq!(h.pending_step_jobs(step.step_execution_id).await, 1);
}

#[tokio::test]
async fn resume_runs_retry_that_came_due_while_paused() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("flaky").add_step("AlwaysRetryStep", "call-api", 1, 0, None))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;
    let step_id = h.status(id).await.steps[0].step_execution_id;

    assert!(h.engine.pause(id).await.unwrap());
    h.clock.advance(Duration::minutes(2));
    h.drain().await;
    assert_eq!(h.status(id).await.steps[0].retry_count, 1);
    assert_eq!(h.pending_step_jobs(step_id).await, 0);

    assert!(h.engine.resume(id).await.unwrap());
    h.drain().await;
    let step = &h.status(id).await.steps[0];
    assert_eq!(step.status, StepExecutionStatus::Retrying);
    assert_eq!(step.retry_count, 2);
    assert_eq!(h.pending_step_jobs(step_id).await, 1);
}

#[tokio::test]
async fn concurrent_deliveries_run_step_once() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("count").add_step("CountingStep", "tick", 1, 0, None))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    let step_id = h.status(id).await.steps[0].step_execution_id;

    let (a, b) = tokio::join!(h.engine.process_step(step_id), h.engine.process_step(step_id));

    assert_eq!(h.runs.load(Ordering::SeqCst), 1);
    let ignored = [a, b]
        .iter()
        .filter(|d| **d == StepDisposition::Ignored)
        .count();
    assert_eq!(ignored, 1);
    assert_eq!(
        h.status(id).await.steps[0].status,
        StepExecutionStatus::Completed
    );
}

#[tokio::test]
async fn later_steps_wait_while_earlier_step_retries() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("ordered")
                .add_step("AlwaysRetryStep", "first", 1, 0, None)
                .add_step("LogStep", "second", 2, 0, log("two"))
                .add_step("LogStep", "third", 3, 0, log("three")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();

    let mut view = h.status(id).await;
    let mut retries_seen = 0;
    for _ in 0..50 {
        h.drain().await;
        view = h.status(id).await;
        if !view.steps[0].status.is_terminal() {
            retries_seen += 1;
            assert!(
                view.steps[1..]
                    .iter()
                    .all(|s| s.status == StepExecutionStatus::Pending && s.started_time.is_none())
            );
        }
        if view.status.is_terminal() || !h.advance_to_next_job().await {
            break;
        }
    }

    assert_eq!(retries_seen, 3);
    assert_eq!(view.status, WorkflowExecutionStatus::Failed);
    assert_eq!(view.error_message.as_deref(), Some("first"));
    let first_done = view.steps[0].completed_time.unwrap();
    assert!(view.steps[1].started_time.unwrap() >= first_done);
    assert!(view.steps[2].started_time.unwrap() >= view.steps[1].completed_time.unwrap());
    assert_eq!(view.steps[2].status, StepExecutionStatus::Completed);
}

#[tokio::test]
async fn finished_execution_ignores_repeat_invocations() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("once").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;

    let before = h.status(id).await;
    assert_eq!(before.status, WorkflowExecutionStatus::Completed);
    let events = h.sink.events();

    assert_eq!(h.engine.process_workflow(id).await, DriverOutcome::Inactive);
    assert_eq!(
        h.engine.process_step(before.steps[0].step_execution_id).await,
        StepDisposition::Ignored
    );

    assert_eq!(h.sink.events(), events);
    let after = h.status(id).await;
    assert_eq!(after.completed_time, before.completed_time);
    assert_eq!(after.output_data, before.output_data);
    assert_eq!(after.steps[0].completed_time, before.steps[0].completed_time);
}

#[tokio::test]
async fn start_creates_one_step_execution_per_workflow_step() {
    let h = Harness::new();
    let def = h
        .define(
            WorkflowBuilder::new("shape")
                .add_step("LogStep", "c", 30, 0, log("c"))
                .add_step("LogStep", "a", 10, 0, log("a"))
                .add_step("LogStep", "b", 20, 0, log("b")),
        )
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();

    let workflow = h.repo.get_workflow_graph(&def).await.unwrap().unwrap();
    let execution = h.repo.load_execution_graph(&id).await.unwrap().unwrap();
    assert_eq!(execution.steps.len(), workflow.steps.len());

    let mut expected: Vec<(Uuid, i32)> = workflow
        .steps
        .iter()
        .map(|d| (d.step.id, d.step.order))
        .collect();
    let mut actual: Vec<(Uuid, i32)> = execution
        .steps
        .iter()
        .map(|d| (d.execution.workflow_step_id, d.order()))
        .collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);

    let orders: Vec<i32> = h.status(id).await.steps.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![10, 20, 30]);
}

// ---------------------------------------------------------------------------
// Lifecycle errors and notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_requires_active_definition() {
    let h = Harness::new();
    let missing = Uuid::now_v7();
    let err = h.engine.start(missing, None, None).await.unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound(id) if id == missing));

    let def = h
        .define(WorkflowBuilder::new("retired").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    assert!(h.repo.set_definition_active(&def, false).await.unwrap());
    let err = h.engine.start(def, None, None).await.unwrap_err();
    assert!(err.is_not_found());

    let err = h.engine.get_status(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, EngineError::ExecutionNotFound(_)));
}

#[tokio::test]
async fn start_assigns_configured_retry_limit() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repo = InMemoryWorkflowRepository::new();
    let queue = InMemoryJobQueue::with_clock(clock.clone());
    let engine = WorkflowEngine::new(repo.clone(), queue.clone(), StepRegistry::with_builtin_steps())
        .with_clock(clock)
        .with_config(stepwise_types::config::EngineConfig {
            default_max_retries: 7,
        });

    let def = WorkflowBuilder::new("w")
        .add_step("LogStep", "a", 1, 0, log("a"))
        .save(&repo)
        .await
        .unwrap();
    let id = engine.start(def, None, None).await.unwrap();

    let view = engine.get_status(id).await.unwrap();
    assert_eq!(view.steps[0].max_retries, 7);
    assert_eq!(queue.jobs().await.len(), 1);
    assert_eq!(
        queue.jobs().await[0].job,
        Job::ProcessWorkflow { execution_id: id }
    );
}

#[tokio::test]
async fn notifications_follow_state_changes() {
    let h = Harness::new();
    let def = h
        .define(WorkflowBuilder::new("notify").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.drain().await;
    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Completed);

    assert_eq!(
        h.sink.events(),
        [
            "started:notify",
            "step:a:running",
            "step:a:completed",
            "completed:completed",
            "workflow:completed",
        ]
    );
}

#[tokio::test]
async fn failing_sink_does_not_affect_execution() {
    let h = Harness::with_sink(Some(Arc::new(FailingSink)));
    let def = h
        .define(WorkflowBuilder::new("noisy").add_step("LogStep", "a", 1, 0, log("a")))
        .await;
    let id = h.engine.start(def, None, None).await.unwrap();
    h.engine.pause(id).await.unwrap();
    h.engine.resume(id).await.unwrap();
    h.drain().await;

    assert_eq!(h.status(id).await.status, WorkflowExecutionStatus::Completed);
}
