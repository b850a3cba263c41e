//! Tests for PipelineRunner stage kinds, error strategies, timeouts and hooks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskweave_config::{
  Condition, ConditionOperator, ErrorStrategy, FieldCondition, Pipeline, Stage, StageKind,
  ValidationError,
};
use taskweave_pipeline::{
  PipelineConfig, PipelineError, PipelineOptions, PipelineRunner, StageError, StageHooks,
  StageResult, StageStatus,
};
use taskweave_runtime::{WorkerError, WorkerExecutor, WorkerRequest};
use taskweave_task_executor::{ExecutorConfig, TaskExecutor};
use tokio_util::sync::CancellationToken;

/// Echoes payloads back. A `fail` flag fails the call and `sleep_ms` delays
/// it; both are read from the payload or, for generic stages, its config.
#[derive(Default)]
struct ScriptedWorker {
  requests: Mutex<Vec<WorkerRequest>>,
}

impl ScriptedWorker {
  fn requests(&self) -> Vec<WorkerRequest> {
    self.requests.lock().unwrap().clone()
  }

  fn ids(&self) -> Vec<String> {
    self.requests().into_iter().map(|r| r.id).collect()
  }

  fn request(&self, id: &str) -> WorkerRequest {
    self
      .requests()
      .into_iter()
      .find(|r| r.id == id)
      .unwrap_or_else(|| panic!("no request for {}", id))
  }
}

fn setting<'a>(payload: &'a Value, key: &str) -> &'a Value {
  if payload[key].is_null() {
    &payload["config"][key]
  } else {
    &payload[key]
  }
}

#[async_trait]
impl WorkerExecutor for ScriptedWorker {
  async fn execute(&self, request: WorkerRequest) -> Result<Value, WorkerError> {
    self.requests.lock().unwrap().push(request.clone());

    if let Some(ms) = setting(&request.payload, "sleep_ms").as_u64() {
      tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    if setting(&request.payload, "fail").as_bool() == Some(true) {
      return Err(WorkerError::failed("scripted failure"));
    }
    Ok(json!({ "echo": request.payload }))
  }
}

#[derive(Default)]
struct RecordingHooks {
  calls: Mutex<Vec<String>>,
}

impl StageHooks for RecordingHooks {
  fn on_stage_complete(&self, stage: &Stage, result: &StageResult) {
    assert!(result.is_success());
    self.calls.lock().unwrap().push(format!("complete:{}", stage.id));
  }

  fn on_stage_error(&self, stage: &Stage, result: &StageResult) {
    assert_eq!(result.status, StageStatus::Failed);
    self.calls.lock().unwrap().push(format!("error:{}", stage.id));
  }
}

fn runner(worker: Arc<ScriptedWorker>) -> PipelineRunner {
  let executor = TaskExecutor::new(
    worker,
    ExecutorConfig {
      retry_base_delay: Duration::from_millis(10),
      default_timeout: Duration::from_secs(60),
    },
  );
  PipelineRunner::new(Arc::new(executor), PipelineConfig::default())
}

fn pipeline(stages: Vec<Stage>) -> Pipeline {
  Pipeline {
    id: "release".to_string(),
    name: None,
    stages,
  }
}

fn command(id: &str, config: Value) -> Stage {
  Stage::new(id, StageKind::Command, config)
}

fn failing(id: &str, strategy: ErrorStrategy) -> Stage {
  command(id, json!({ "fail": true })).with_error_strategy(strategy)
}

fn field(path: &str, operator: ConditionOperator, value: Value) -> Condition {
  Condition::Field(FieldCondition {
    field: path.to_string(),
    operator,
    value,
  })
}

#[tokio::test]
async fn test_all_stages_succeed() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        command("build", json!({ "command": "echo", "args": "build" })),
        Stage::new("report", StageKind::Generic, json!({ "format": "md" })),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(result.success);
  assert_eq!(result.stages_completed, 2);
  assert_eq!(result.stages_failed, 0);
  assert_eq!(result.total_stages, 2);
  assert!(result.error.is_none());

  let build = worker.request("build");
  assert_eq!(build.kind, "command");
  assert_eq!(build.payload, json!({ "command": "echo", "args": "build" }));

  let report = worker.request("report");
  assert_eq!(report.kind, "generic");
  assert_eq!(report.payload["name"], json!("report"));
  assert_eq!(report.payload["config"], json!({ "format": "md" }));
  assert_eq!(
    report.payload["context"]["stages"]["build"]["echo"]["args"],
    json!("build")
  );
}

#[tokio::test]
async fn test_fail_fast_stops_at_failing_stage() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        command("a", json!({})),
        failing("b", ErrorStrategy::FailFast),
        command("c", json!({})),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(!result.success);
  assert_eq!(result.stages_completed, 1);
  assert_eq!(result.stages_failed, 1);
  assert_eq!(result.total_stages, 3);
  assert_eq!(result.stage_results.len(), 2);
  assert_eq!(
    result.error,
    Some(StageError::Execution {
      stage_id: "b".to_string(),
      message: "scripted failure".to_string(),
    })
  );
  assert_eq!(worker.ids(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_skip_hides_failure_from_later_stages() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        command("a", json!({})),
        failing("b", ErrorStrategy::Skip),
        Stage::new("c", StageKind::Generic, json!({})),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(!result.success);
  assert_eq!(result.stages_completed, 2);
  assert_eq!(result.stages_failed, 1);
  assert!(result.error.is_none());

  let stages = &worker.request("c").payload["context"]["stages"];
  assert!(stages.get("a").is_some());
  assert!(stages.get("b").is_none());
}

#[tokio::test]
async fn test_continue_exposes_failure_to_later_stages() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        failing("b", ErrorStrategy::Continue),
        Stage::new("c", StageKind::Generic, json!({})),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert_eq!(result.stages_completed, 1);
  assert_eq!(result.stages_failed, 1);
  assert_eq!(
    worker.request("c").payload["context"]["stages"]["b"]["error"],
    json!("stage 'b' failed: scripted failure")
  );
}

#[tokio::test]
async fn test_false_condition_without_branch_is_a_success() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        command("a", json!({ "mode": "slow" })),
        Stage::new("gate", StageKind::Condition, json!({})).with_condition(field(
          "stages.a.echo.mode",
          ConditionOperator::Eq,
          json!("fast"),
        )),
        command("c", json!({})),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(result.success);
  assert_eq!(result.stages_completed, 3);

  let gate = &result.stage_results[1];
  assert_eq!(gate.status, StageStatus::Completed);
  assert_eq!(
    gate.output,
    Some(json!({ "condition_result": false, "executed": false }))
  );
  assert_eq!(worker.ids(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_condition_runs_matching_branch() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        Stage::new(
          "gate",
          StageKind::Condition,
          json!({ "on_true": { "notify": "ops" }, "on_false": { "notify": "dev" } }),
        )
        .with_condition(field("variables.env", ConditionOperator::Eq, json!("prod"))),
      ]),
      PipelineOptions::default().with_variables(json!({ "env": "prod" })),
    )
    .await
    .unwrap();

  assert!(result.success);
  let output = result.stage_results[0].output.clone().unwrap();
  assert_eq!(output["condition_result"], json!(true));
  assert_eq!(output["executed"], json!(true));
  assert_eq!(output["branch"], json!("on_true"));

  let branch = worker.request("gate.on_true");
  assert_eq!(branch.kind, "generic");
  assert_eq!(branch.payload["config"], json!({ "notify": "ops" }));
}

#[tokio::test]
async fn test_expression_condition_fails_the_stage() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        Stage::new("gate", StageKind::Condition, json!({}))
          .with_condition(Condition::Expression("stages.a > 1".to_string())),
        command("after", json!({})),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(!result.success);
  assert_eq!(result.stages_failed, 1);
  assert!(matches!(
    result.stage_results[0].error,
    Some(StageError::InvalidCondition { .. })
  ));
  // Default strategy is continue.
  assert_eq!(worker.ids(), vec!["after"]);
}

#[tokio::test]
async fn test_parallel_stage_settles_all_sub_tasks() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![Stage::new(
        "fanout",
        StageKind::Parallel,
        json!({ "tasks": [{ "n": 1 }, { "fail": true }, { "n": 3 }] }),
      )]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(result.success);
  let output = result.stage_results[0].output.clone().unwrap();
  assert_eq!(output["total_tasks"], json!(3));
  assert_eq!(output["successful_tasks"], json!(2));
  assert_eq!(output["results"][1]["status"], json!("failed"));
  assert_eq!(output["results"][2]["value"]["echo"]["n"], json!(3));
  assert_eq!(worker.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stage_timeout() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());

  let result = runner
    .execute(
      &pipeline(vec![
        command("slow", json!({ "sleep_ms": 200 })).with_timeout_ms(50),
      ]),
      PipelineOptions::default(),
    )
    .await
    .unwrap();

  assert!(!result.success);
  let error = result.stage_results[0].error.clone().unwrap();
  assert_eq!(
    error,
    StageError::Timeout {
      stage_id: "slow".to_string(),
      timeout_ms: 50,
    }
  );
  assert_eq!(error.kind(), taskweave_task_executor::ErrorKind::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_regardless_of_strategy() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());
  let cancel = CancellationToken::new();

  let stages = pipeline(vec![
    command("long", json!({ "sleep_ms": 10_000 })),
    command("next", json!({})),
  ]);

  let (result, _) = tokio::join!(
    runner.execute(&stages, PipelineOptions::default().with_cancel(cancel.clone())),
    async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      cancel.cancel();
    }
  );
  let result = result.unwrap();

  assert!(!result.success);
  assert_eq!(
    result.error,
    Some(StageError::Cancelled {
      stage_id: "long".to_string()
    })
  );
  assert_eq!(result.stage_results.len(), 1);
  assert_eq!(worker.ids(), vec!["long"]);
}

#[tokio::test]
async fn test_hooks_see_every_stage() {
  let worker = Arc::new(ScriptedWorker::default());
  let runner = runner(worker.clone());
  let hooks = RecordingHooks::default();

  runner
    .execute(
      &pipeline(vec![
        command("a", json!({})),
        failing("b", ErrorStrategy::Continue),
        command("c", json!({})),
      ]),
      PipelineOptions::default().with_hooks(&hooks),
    )
    .await
    .unwrap();

  assert_eq!(
    *hooks.calls.lock().unwrap(),
    vec!["complete:a", "error:b", "complete:c"]
  );
}

#[tokio::test]
async fn test_invalid_pipeline_is_rejected() {
  let runner = runner(Arc::new(ScriptedWorker::default()));

  let err = runner
    .execute(&pipeline(vec![]), PipelineOptions::default())
    .await
    .unwrap_err();

  let PipelineError::Invalid(inner) = err;
  assert_eq!(
    inner,
    ValidationError::NoStages {
      pipeline_id: "release".to_string()
    }
  );
}
