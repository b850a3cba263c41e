use taskweave_config::Stage;

use crate::result::StageResult;

/// Callbacks invoked synchronously after each stage settles.
pub trait StageHooks: Send + Sync {
  fn on_stage_complete(&self, _stage: &Stage, _result: &StageResult) {}

  fn on_stage_error(&self, _stage: &Stage, _result: &StageResult) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl StageHooks for NoopHooks {}
