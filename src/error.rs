//! ==============================================================================
//! error.rs - gateway error taxonomy
//! ==============================================================================
//!
//! purpose:
//!     every fallible operation inside a tick returns a GatewayError instead of
//!     panicking. the loop logs it and moves on to the next phase.
//!
//!     only JoinFailed is fatal: it ends the process before the loop starts.
//!
//! ==============================================================================

use thiserror::Error;

/// Errors produced by the gateway components
#[derive(Error, Debug)]
pub enum GatewayError {
    // ===== Startup =====
    /// Network never came up within the join window
    #[error("network join failed after {attempts} attempts")]
    JoinFailed {
        /// Number of retries performed
        attempts: u32,
    },

    // ===== Radio =====
    /// Radio frame was not valid structured data
    #[error("radio payload decode failed: {0}")]
    RadioDecode(String),

    /// Outbound radio frame larger than the link allows
    #[error("radio payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum frame size
        max: usize,
    },

    /// Radio send did not complete in time
    #[error("radio send timed out after {timeout_ms}ms")]
    RadioSendTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    // ===== HTTP =====
    /// Request line could not be parsed
    #[error("malformed http request: {0}")]
    MalformedRequest(String),

    /// POST /alert body could not be parsed
    #[error("invalid alert body: {0}")]
    InvalidAlertBody(String),

    // ===== Notifier =====
    /// Notification attempt failed (connect, TLS, write)
    #[error("notification failed: {0}")]
    Notify(String),

    /// Notification did not complete in time
    #[error("notification timed out after {timeout_ms}ms")]
    NotifyTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// IO error wrapper
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Only a failed network join stops the gateway
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::JoinFailed { .. })
    }

    /// Short code for log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::JoinFailed { .. } => "JOIN_FAILED",
            GatewayError::RadioDecode(_) => "RADIO_DECODE",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GatewayError::RadioSendTimeout { .. } => "RADIO_SEND_TIMEOUT",
            GatewayError::MalformedRequest(_) => "MALFORMED_REQUEST",
            GatewayError::InvalidAlertBody(_) => "INVALID_ALERT_BODY",
            GatewayError::Notify(_) => "NOTIFY_FAILED",
            GatewayError::NotifyTimeout { .. } => "NOTIFY_TIMEOUT",
            GatewayError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
