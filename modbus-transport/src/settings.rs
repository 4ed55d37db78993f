//! Connection settings and trace hook

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default time to wait for the first byte of a confirmation
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default time to wait between two bytes of a partially received message
pub const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(500);

/// Error recovery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorRecovery {
    /// Report failures as they are
    #[default]
    None,
    /// Close and reopen the connection on link faults, flush after timeouts
    Link,
}

/// TCP connection settings
///
/// A timeout of `None` waits without bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    pub response_timeout: Option<Duration>,
    pub byte_timeout: Option<Duration>,
    pub error_recovery: ErrorRecovery,
    pub debug: bool,
}

impl TcpSettings {
    /// Create settings with default timeouts and no error recovery
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_byte_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.byte_timeout = timeout;
        self
    }

    pub fn with_error_recovery(mut self, error_recovery: ErrorRecovery) -> Self {
        self.error_recovery = error_recovery;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            byte_timeout: Some(DEFAULT_BYTE_TIMEOUT),
            error_recovery: ErrorRecovery::None,
            debug: false,
        }
    }
}

/// Direction of a traced message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Sent,
    Received,
}

/// Hook invoked with every complete message sent or received
pub type TraceHook = Arc<dyn Fn(&[u8], TraceDirection) + Send + Sync>;
