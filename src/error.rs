use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodtraceError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("no pid found in runtime status for container '{id}'")]
    NoPid { id: String },

    #[error("no /proc entry for pid {pid} (process already exited?)")]
    ProcNotFound { pid: i32 },

    #[error("unexpected pid namespace link '{target}' for pid {pid}")]
    ProcMalformed { pid: i32, target: String },

    #[error("kubernetes error: {0}")]
    Kubernetes(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PodtraceError>;
