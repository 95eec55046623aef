//! Error types for the ENO one register-map client
//!
//! Failures fall into four families: transport (I/O, timeouts, device
//! exceptions), decode (register contents that map to no domain value),
//! incompatibility (API version gate) and validation (write values out of
//! range). Configuration errors cover both user configuration and the static
//! register table.

use thiserror::Error;

/// Result type for enovates-modbus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connection refused, broken pipe, short or malformed response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device answered with a Modbus exception code
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// Exchange did not complete within the configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Raw registers do not map to a valid domain value
    #[error("Decode error in field '{field}': {reason}")]
    Decode { field: &'static str, reason: String },

    /// API version check failed or was not performed
    #[error("Incompatible device: {0}")]
    Incompatible(String),

    /// Value does not fit the target field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid configuration or register table
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::transport(err.to_string())
    }
}

impl From<tokio_modbus::Error> for Error {
    fn from(err: tokio_modbus::Error) -> Self {
        Error::transport(err.to_string())
    }
}

impl From<tokio_modbus::ExceptionCode> for Error {
    fn from(code: tokio_modbus::ExceptionCode) -> Self {
        Error::Exception(format!("{:?}", code))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn exception(msg: impl Into<String>) -> Self {
        Error::Exception(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    pub fn decode(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Decode {
            field,
            reason: reason.into(),
        }
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Error::Incompatible(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Short read: the device returned a different number of registers
    pub fn short_read(address: u16, expected: u16, actual: usize) -> Self {
        Error::transport(format!(
            "Expected {} registers at address {}, got {}",
            expected, address, actual
        ))
    }

    /// Whether this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Exception(_) | Error::Timeout(_)
        )
    }

    /// Whether the underlying link may carry a stale or half-finished exchange.
    ///
    /// A device exception is a complete response, so the link stays usable.
    pub fn poisons_link(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_))
    }
}
