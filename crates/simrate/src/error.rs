use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied while opening process: {0}")]
    AccessDenied(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Memory scan failed: {0}")]
    ScanFailed(String),

    #[error("Simulator bridge unavailable: {0}")]
    BridgeUnavailable(String),

    #[error("Failed to trigger event {event}: {message}")]
    EventFailed { event: String, message: String },

    #[error("Offset search failed: {0}")]
    OffsetSearchFailed(String),

    #[error("Invalid offset profile: {0}")]
    InvalidProfile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// The process exists but runs at a different elevation level than we do.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_))
    }

    /// Memory I/O failures invalidate the session; discovery has to start over.
    pub fn is_process_io(&self) -> bool {
        matches!(
            self,
            Error::MemoryReadFailed { .. } | Error::MemoryWriteFailed { .. } | Error::ScanFailed(_)
        )
    }

    pub(crate) fn read_failed(address: u64, message: impl Into<String>) -> Self {
        Error::MemoryReadFailed {
            address,
            message: message.into(),
        }
    }

    pub(crate) fn write_failed(address: u64, message: impl Into<String>) -> Self {
        Error::MemoryWriteFailed {
            address,
            message: message.into(),
        }
    }
}
