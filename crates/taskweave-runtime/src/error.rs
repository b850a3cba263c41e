use thiserror::Error;

/// Errors returned by a worker while performing a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
  /// The work itself failed.
  #[error("{message}")]
  Failed { message: String },

  /// The payload could not be interpreted by the worker.
  #[error("invalid payload: {message}")]
  InvalidPayload { message: String },

  /// No command registered under the requested name.
  #[error("command not found: {0}")]
  CommandNotFound(String),
}

impl WorkerError {
  pub fn failed(message: impl Into<String>) -> Self {
    WorkerError::Failed {
      message: message.into(),
    }
  }
}

/// Errors from creating or releasing an execution environment.
#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error("failed to prepare working directory '{path}'")]
  WorkingDirectory {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("environment '{0}' is not managed by this provisioner")]
  UnknownEnvironment(String),
}
