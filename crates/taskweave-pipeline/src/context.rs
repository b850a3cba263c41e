use serde_json::{Map, Value, json};

use crate::result::StageResult;

/// Mutable state of one pipeline run. Discarded once the run returns.
#[derive(Debug, Clone)]
pub struct PipelineExecutionContext {
  pub id: String,
  pub pipeline_id: String,
  pub current_stage_index: usize,
  pub stage_results: Vec<StageResult>,
  pub variables: Value,
  /// Stage outputs visible to later stages, keyed by stage id.
  pub outputs: Map<String, Value>,
}

impl PipelineExecutionContext {
  pub fn new(id: impl Into<String>, pipeline_id: impl Into<String>, variables: Value) -> Self {
    Self {
      id: id.into(),
      pipeline_id: pipeline_id.into(),
      current_stage_index: 0,
      stage_results: Vec::new(),
      variables,
      outputs: Map::new(),
    }
  }

  /// Record a stage result. When `expose` is set the stage's output (or its
  /// error, as `{"error": ...}`) becomes visible under `stages.<id>`.
  pub fn record(&mut self, result: StageResult, expose: bool) {
    if expose {
      let visible = match (&result.output, &result.error) {
        (_, Some(error)) => json!({ "error": error.to_string() }),
        (Some(output), None) => output.clone(),
        (None, None) => Value::Null,
      };
      self.outputs.insert(result.stage_id.clone(), visible);
    }
    self.stage_results.push(result);
  }

  /// The root value that condition paths and generic stages see.
  pub fn scope(&self) -> Value {
    json!({
      "pipeline_id": self.pipeline_id,
      "current_stage_index": self.current_stage_index,
      "variables": self.variables,
      "stages": self.outputs,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::StageError;
  use crate::result::StageStatus;
  use chrono::Utc;
  use taskweave_config::StageKind;

  fn result(id: &str, error: Option<StageError>) -> StageResult {
    let now = Utc::now();
    StageResult {
      stage_id: id.to_string(),
      kind: StageKind::Command,
      status: if error.is_some() {
        StageStatus::Failed
      } else {
        StageStatus::Completed
      },
      output: error.is_none().then(|| json!({ "ok": id })),
      error,
      started_at: now,
      ended_at: now,
      duration_ms: 0,
    }
  }

  #[test]
  fn test_scope_exposes_outputs_and_errors() {
    let mut context = PipelineExecutionContext::new("run-1", "p", json!({ "env": "dev" }));
    context.record(result("a", None), true);
    context.record(
      result(
        "b",
        Some(StageError::Execution {
          stage_id: "b".to_string(),
          message: "boom".to_string(),
        }),
      ),
      true,
    );
    context.current_stage_index = 2;

    let scope = context.scope();
    assert_eq!(scope["stages"]["a"], json!({ "ok": "a" }));
    assert_eq!(scope["stages"]["b"]["error"], json!("stage 'b' failed: boom"));
    assert_eq!(scope["variables"]["env"], json!("dev"));
    assert_eq!(scope["current_stage_index"], json!(2));
  }

  #[test]
  fn test_hidden_results_are_still_recorded() {
    let mut context = PipelineExecutionContext::new("run-1", "p", Value::Null);
    context.record(
      result(
        "a",
        Some(StageError::Cancelled {
          stage_id: "a".to_string(),
        }),
      ),
      false,
    );

    assert_eq!(context.stage_results.len(), 1);
    assert!(context.outputs.is_empty());
  }
}
