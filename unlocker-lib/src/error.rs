use tracing::error;

/// Platform error numbers the agent reports when it detects a failure itself
/// rather than receiving one from the OS.
#[cfg(target_os = "windows")]
pub mod codes {
    pub const NOT_READY: u32 = 21; // ERROR_NOT_READY
    pub const INVALID_PARAMETER: u32 = 87; // ERROR_INVALID_PARAMETER
    pub const BUSY: u32 = 170; // ERROR_BUSY
    pub const INVALID_ADDRESS: u32 = 487; // ERROR_INVALID_ADDRESS
}

/// Platform error numbers the agent reports when it detects a failure itself
/// rather than receiving one from the OS.
#[cfg(not(target_os = "windows"))]
pub mod codes {
    pub const NOT_READY: u32 = 11; // EAGAIN
    pub const INVALID_ADDRESS: u32 = 14; // EFAULT
    pub const BUSY: u32 = 16; // EBUSY
    pub const INVALID_PARAMETER: u32 = 22; // EINVAL
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ChannelUnavailable,
    MapFailed,
    InvalidAddress,
    SystemCallFailed,
}

/// Every failure is terminal for the current attachment attempt. `operation`
/// and `code` are what the error report shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("{operation} failed with error {code}")]
    ChannelUnavailable { operation: &'static str, code: u32 },
    #[error("{operation} failed with error {code}")]
    MapFailed { operation: &'static str, code: u32 },
    #[error("{operation} failed with error {code}")]
    InvalidAddress { operation: &'static str, code: u32 },
    #[error("{operation} failed with error {code}")]
    SystemCallFailed { operation: &'static str, code: u32 },
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ChannelUnavailable { .. } => ErrorKind::ChannelUnavailable,
            AgentError::MapFailed { .. } => ErrorKind::MapFailed,
            AgentError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            AgentError::SystemCallFailed { .. } => ErrorKind::SystemCallFailed,
        }
    }

    pub fn operation(&self) -> &'static str {
        match *self {
            AgentError::ChannelUnavailable { operation, .. }
            | AgentError::MapFailed { operation, .. }
            | AgentError::InvalidAddress { operation, .. }
            | AgentError::SystemCallFailed { operation, .. } => operation,
        }
    }

    pub fn code(&self) -> u32 {
        match *self {
            AgentError::ChannelUnavailable { code, .. }
            | AgentError::MapFailed { code, .. }
            | AgentError::InvalidAddress { code, .. }
            | AgentError::SystemCallFailed { code, .. } => code,
        }
    }
}

pub(crate) fn os_code(err: &std::io::Error) -> u32 {
    err.raw_os_error().unwrap_or_default() as u32
}

/// Receives unrecoverable failures for a human to see. Blocking is allowed.
pub trait ErrorSink {
    fn report(&self, operation: &str, code: u32);
}

/// Sink for hosts where nobody can click a dialog away.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, operation: &str, code: u32) {
        error!("{} failed with error {}", operation, code);
    }
}
