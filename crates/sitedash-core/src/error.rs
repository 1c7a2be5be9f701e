use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashError {
    #[error("build not found: {0}")]
    BuildNotFound(u64),

    #[error("build {id} cannot be deployed while {status}")]
    NotDeployable { id: u64, status: String },

    #[error("failed to spawn '{program}': {reason}")]
    CommandSpawnFailed { program: String, reason: String },

    #[error("'{command}' exited with code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("build output missing: {0}")]
    MissingOutput(String),

    #[error("deploy to {slot} failed: {reason}")]
    DeployFailed { slot: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashError>;
