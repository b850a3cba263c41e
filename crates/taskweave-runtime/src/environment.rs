//! Execution environments handed out once per plan execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::ids::{IdGenerator, UuidGenerator};

/// Working directory, variables and limits for one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
  pub id: String,
  pub working_directory: PathBuf,
  #[serde(default)]
  pub env_vars: HashMap<String, String>,
  #[serde(default)]
  pub resource_limits: ResourceLimits,
  #[serde(default)]
  pub security_policy: SecurityPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
  pub max_memory_mb: u64,
  pub max_cpu_percent: u32,
  pub max_duration_ms: u64,
}

impl Default for ResourceLimits {
  fn default() -> Self {
    Self {
      max_memory_mb: 512,
      max_cpu_percent: 100,
      max_duration_ms: 300_000,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
  pub allow_network: bool,
  #[serde(default)]
  pub allowed_paths: Vec<PathBuf>,
}

/// Creates and releases execution environments.
///
/// The engine calls `cleanup` exactly once for every environment it created,
/// whatever the outcome of the run.
#[async_trait]
pub trait EnvironmentProvisioner: Send + Sync {
  async fn create(&self) -> Result<Environment, ProvisionError>;

  async fn cleanup(&self, environment: Environment) -> Result<(), ProvisionError>;
}

/// Provisioner that gives every execution its own directory under `base_dir`.
pub struct LocalProvisioner {
  base_dir: PathBuf,
  env_vars: HashMap<String, String>,
  resource_limits: ResourceLimits,
  security_policy: SecurityPolicy,
  ids: Arc<dyn IdGenerator>,
}

impl LocalProvisioner {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
      env_vars: HashMap::new(),
      resource_limits: ResourceLimits::default(),
      security_policy: SecurityPolicy::default(),
      ids: Arc::new(UuidGenerator),
    }
  }

  pub fn with_env_vars(mut self, env_vars: HashMap<String, String>) -> Self {
    self.env_vars = env_vars;
    self
  }

  pub fn with_resource_limits(mut self, resource_limits: ResourceLimits) -> Self {
    self.resource_limits = resource_limits;
    self
  }

  pub fn with_security_policy(mut self, security_policy: SecurityPolicy) -> Self {
    self.security_policy = security_policy;
    self
  }

  pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }
}

#[async_trait]
impl EnvironmentProvisioner for LocalProvisioner {
  async fn create(&self) -> Result<Environment, ProvisionError> {
    let id = self.ids.next_id();
    let working_directory = self.base_dir.join(&id);

    tokio::fs::create_dir_all(&working_directory)
      .await
      .map_err(|source| ProvisionError::WorkingDirectory {
        path: working_directory.display().to_string(),
        source,
      })?;

    debug!(environment_id = %id, path = %working_directory.display(), "environment_created");

    Ok(Environment {
      id,
      working_directory,
      env_vars: self.env_vars.clone(),
      resource_limits: self.resource_limits.clone(),
      security_policy: self.security_policy.clone(),
    })
  }

  async fn cleanup(&self, environment: Environment) -> Result<(), ProvisionError> {
    if !environment.working_directory.starts_with(&self.base_dir) {
      return Err(ProvisionError::UnknownEnvironment(environment.id));
    }

    match tokio::fs::remove_dir_all(&environment.working_directory).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!(environment_id = %environment.id, "environment directory already removed");
      }
      Err(source) => {
        return Err(ProvisionError::WorkingDirectory {
          path: environment.working_directory.display().to_string(),
          source,
        });
      }
    }

    debug!(environment_id = %environment.id, "environment_released");
    Ok(())
  }
}
