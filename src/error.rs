//! Error taxonomy for a scan run.
use thiserror::Error;

/// A metadata or listing call against the repository host failed.
#[derive(Debug, Error)]
#[error("{operation} failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct FetchError {
    pub operation: String,
    pub status: Option<u16>,
    pub message: String,
    pub timed_out: bool,
}

impl FetchError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: None,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn from_reqwest(operation: impl Into<String>, err: reqwest::Error) -> Self {
        Self {
            operation: operation.into(),
            status: err.status().map(|s| s.as_u16()),
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Cloning or reading a local mirror failed.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("git {command} exited with {status}: {stderr}")]
    Git {
        command: &'static str,
        status: String,
        stderr: String,
    },
    #[error("git {0} timed out")]
    Timeout(&'static str),
    #[error("unparseable for-each-ref line: {0}")]
    Parse(String),
}

/// Delivering a notification failed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub transient: bool,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
        }
    }
}

/// Anything that fails a run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("fetch error for {repo}: {source}")]
    Fetch {
        repo: String,
        #[source]
        source: FetchError,
    },
    #[error("data integrity error in {repo}: tag {tag} points at {kind} object {url}")]
    DataIntegrity {
        repo: String,
        tag: String,
        kind: String,
        url: String,
    },
    #[error("local clone of {repo} failed: {source}")]
    Clone {
        repo: String,
        #[source]
        source: CloneError,
    },
    #[error("delivery of {key} failed after {attempts} attempt(s): {source}")]
    Transport {
        key: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("worker {worker} aborted: {message}")]
    Worker { worker: usize, message: String },
}

impl ScanError {
    pub fn fetch(repo: impl Into<String>, source: FetchError) -> Self {
        ScanError::Fetch {
            repo: repo.into(),
            source,
        }
    }
}
