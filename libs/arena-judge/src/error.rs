use std::time::Duration;
use thiserror::Error;

/// Failure of one sandbox execution.
///
/// Only [`SandboxError::Unavailable`] is an infrastructure failure; the
/// other variants belong to a single test case.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to provision sandbox: {0}")]
    Provisioning(String),

    #[error("execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("failed while waiting for sandbox: {0}")]
    Wait(String),
}

impl SandboxError {
    /// Whether the whole submission has to be abandoned
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SandboxError::Unavailable(_))
    }
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::DockerResponseServerError { status_code, message } => {
                SandboxError::Provisioning(format!("{} ({})", message, status_code))
            }
            Error::IOError { err } => SandboxError::Unavailable(err.to_string()),
            other if caused_by_io(&other) => SandboxError::Unavailable(other.to_string()),
            other => SandboxError::Provisioning(other.to_string()),
        }
    }
}

/// Transport failures surface wrapped by the HTTP client; look for the
/// underlying I/O error.
fn caused_by_io(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if e.is::<std::io::Error>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// The wrapper could not turn a test case into program text
#[derive(Debug, Error)]
pub enum WrapError {
    #[error("cannot serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
}
