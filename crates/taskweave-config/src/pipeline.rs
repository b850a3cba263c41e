//! Pipeline and stage definitions.
//!
//! A pipeline is an ordered list of heterogeneous stages. Each stage carries
//! its own timeout and failure policy, and condition stages can branch into a
//! nested stage config.
//!
//! # Example
//!
//! ```json
//! {
//!   "id": "release",
//!   "stages": [
//!     { "id": "build", "kind": "command", "config": { "command": "echo", "args": "build" } },
//!     {
//!       "id": "gate",
//!       "kind": "condition",
//!       "condition": { "field": "variables.env", "operator": "==", "value": "prod" },
//!       "config": { "on_true": { "notify": "ops" } }
//!     },
//!     { "id": "fanout", "kind": "parallel", "config": { "tasks": [{ "n": 1 }, { "n": 2 }] } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
  pub id: String,
  pub kind: StageKind,
  #[serde(default)]
  pub config: serde_json::Value,
  /// Deadline for the whole stage, including any nested branch.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default)]
  pub priority: i32,
  /// Only meaningful for condition stages.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub condition: Option<Condition>,
  #[serde(default)]
  pub error_strategy: ErrorStrategy,
}

impl Stage {
  pub fn new(id: impl Into<String>, kind: StageKind, config: serde_json::Value) -> Self {
    Self {
      id: id.into(),
      kind,
      config,
      timeout_ms: None,
      priority: 0,
      condition: None,
      error_strategy: ErrorStrategy::default(),
    }
  }

  pub fn with_condition(mut self, condition: Condition) -> Self {
    self.condition = Some(condition);
    self
  }

  pub fn with_error_strategy(mut self, error_strategy: ErrorStrategy) -> Self {
    self.error_strategy = error_strategy;
    self
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
  /// Config is handed to the worker as a command payload.
  Command,
  /// `config.tasks` are fanned out to the worker concurrently.
  Parallel,
  /// Evaluates `condition` and optionally runs `config.on_true` / `config.on_false`.
  Condition,
  /// Default delegation to the worker.
  Generic,
}

impl StageKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StageKind::Command => "command",
      StageKind::Parallel => "parallel",
      StageKind::Condition => "condition",
      StageKind::Generic => "generic",
    }
  }
}

/// What the pipeline does after a stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategy {
  /// Abort the pipeline; later stages never run.
  FailFast,
  /// Record the failure and move on without exposing it to later stages.
  Skip,
  /// Record the failure, expose it in the context and move on.
  #[default]
  Continue,
}

/// Condition evaluated by a condition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
  Literal(bool),
  Field(FieldCondition),
  /// Free-form expression. Never evaluated; accepted only so a plan that
  /// carries one fails at the stage instead of at parse time.
  Expression(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
  /// Dot path into the pipeline context, e.g. `stages.build.status`.
  pub field: String,
  pub operator: ConditionOperator,
  #[serde(default)]
  pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
  #[serde(rename = "==")]
  Eq,
  #[serde(rename = "!=")]
  Ne,
  #[serde(rename = ">")]
  Gt,
  #[serde(rename = "<")]
  Lt,
  #[serde(rename = ">=")]
  Ge,
  #[serde(rename = "<=")]
  Le,
  #[serde(rename = "contains")]
  Contains,
  #[serde(rename = "startsWith")]
  StartsWith,
  #[serde(rename = "endsWith")]
  EndsWith,
}
