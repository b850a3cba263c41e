//! Structural validation for plans and pipelines.

use std::collections::{HashMap, HashSet};

use crate::error::ValidationError;
use crate::pipeline::{Pipeline, StageKind};
use crate::plan::{ExecutionPlan, PlanStrategy};
use crate::task::Task;

impl ExecutionPlan {
  /// Check the plan's shape before anything is scheduled.
  ///
  /// Task ids must be unique, dependencies must reference tasks in the same
  /// plan and must not form a cycle. Sequential plans additionally require a
  /// dependency to be listed before its dependent.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.id.trim().is_empty() {
      return Err(ValidationError::EmptyPlanId);
    }

    match &self.strategy {
      PlanStrategy::Sequential { tasks, .. } => {
        self.validate_tasks(tasks)?;
        validate_sequential_order(tasks)
      }
      PlanStrategy::Parallel { tasks } => self.validate_tasks(tasks),
      PlanStrategy::Pipeline { pipeline } => pipeline.validate(),
    }
  }

  fn validate_tasks(&self, tasks: &[Task]) -> Result<(), ValidationError> {
    if tasks.is_empty() {
      return Err(ValidationError::NoTasks {
        plan_id: self.id.clone(),
      });
    }

    let mut ids = HashSet::new();
    for task in tasks {
      if task.id.trim().is_empty() {
        return Err(ValidationError::EmptyTaskId);
      }
      if !ids.insert(task.id.as_str()) {
        return Err(ValidationError::DuplicateTask(task.id.clone()));
      }
    }

    for task in tasks {
      for dependency in &task.dependencies {
        if !ids.contains(dependency.as_str()) {
          return Err(ValidationError::UnknownDependency {
            task_id: task.id.clone(),
            dependency: dependency.clone(),
          });
        }
      }
    }

    detect_cycle(tasks)
  }
}

impl Pipeline {
  /// Check stage ids and per-kind config requirements.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.stages.is_empty() {
      return Err(ValidationError::NoStages {
        pipeline_id: self.id.clone(),
      });
    }

    let mut ids = HashSet::new();
    for stage in &self.stages {
      if !ids.insert(stage.id.as_str()) {
        return Err(ValidationError::DuplicateStage(stage.id.clone()));
      }

      match stage.kind {
        StageKind::Condition if stage.condition.is_none() => {
          return Err(ValidationError::InvalidStage {
            stage_id: stage.id.clone(),
            message: "condition stage requires a condition".to_string(),
          });
        }
        StageKind::Parallel if !stage.config.get("tasks").is_some_and(|t| t.is_array()) => {
          return Err(ValidationError::InvalidStage {
            stage_id: stage.id.clone(),
            message: "parallel stage requires a `tasks` array in its config".to_string(),
          });
        }
        _ => {}
      }
    }

    Ok(())
  }
}

fn validate_sequential_order(tasks: &[Task]) -> Result<(), ValidationError> {
  let position: HashMap<&str, usize> = tasks
    .iter()
    .enumerate()
    .map(|(i, t)| (t.id.as_str(), i))
    .collect();

  for (index, task) in tasks.iter().enumerate() {
    for dependency in &task.dependencies {
      if position.get(dependency.as_str()).is_some_and(|&p| p >= index) {
        return Err(ValidationError::DependencyOrder {
          task_id: task.id.clone(),
          dependency: dependency.clone(),
        });
      }
    }
  }

  Ok(())
}

/// Check for cycles using DFS.
fn detect_cycle(tasks: &[Task]) -> Result<(), ValidationError> {
  let adjacency: HashMap<&str, Vec<&str>> = tasks
    .iter()
    .map(|t| {
      (
        t.id.as_str(),
        t.dependencies.iter().map(String::as_str).collect(),
      )
    })
    .collect();

  // 0 = unvisited, 1 = in progress, 2 = done
  let mut color: HashMap<&str, u8> = tasks.iter().map(|t| (t.id.as_str(), 0u8)).collect();

  fn dfs<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    color: &mut HashMap<&'a str, u8>,
  ) -> Result<(), ValidationError> {
    color.insert(node, 1);
    for &next in adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]) {
      match color.get(next).copied().unwrap_or(0) {
        1 => return Err(ValidationError::DependencyCycle(next.to_string())),
        0 => dfs(next, adjacency, color)?,
        _ => {}
      }
    }
    color.insert(node, 2);
    Ok(())
  }

  for task in tasks {
    if color.get(task.id.as_str()).copied() == Some(0) {
      dfs(task.id.as_str(), &adjacency, &mut color)?;
    }
  }

  Ok(())
}
