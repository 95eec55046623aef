//! API version compatibility gate
//!
//! The register layout in [`crate::register_map`] is only trusted on firmware
//! that reports exactly [`SUPPORTED_API_VERSION`]. The outcome of a check is
//! remembered per connection and forgotten when the link is re-established.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::ApiVersion;

/// The API version this register map was written against
pub const SUPPORTED_API_VERSION: ApiVersion = ApiVersion::new(1, 2);

/// Whether the client can decode the registers of a device reporting `version`
pub fn is_supported(version: ApiVersion) -> bool {
    version == SUPPORTED_API_VERSION
}

/// Outcome of the version check for the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionState {
    /// No check performed since the link was opened
    #[default]
    Unchecked,
    Compatible(ApiVersion),
    Incompatible(ApiVersion),
}

impl VersionState {
    /// Classify a version read from the device
    pub fn evaluate(version: ApiVersion) -> Self {
        if is_supported(version) {
            VersionState::Compatible(version)
        } else {
            VersionState::Incompatible(version)
        }
    }

    pub fn is_compatible(&self) -> bool {
        matches!(self, VersionState::Compatible(_))
    }

    /// Error unless the state is `Compatible`
    pub fn require_compatible(&self) -> Result<()> {
        match self {
            VersionState::Compatible(_) => Ok(()),
            VersionState::Unchecked => Err(Error::incompatible(format!(
                "API version not checked yet (client supports {})",
                SUPPORTED_API_VERSION
            ))),
            VersionState::Incompatible(found) => Err(Error::incompatible(format!(
                "device reports API {}, client supports {}",
                found, SUPPORTED_API_VERSION
            ))),
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionState::Unchecked => write!(f, "UNCHECKED"),
            VersionState::Compatible(v) => write!(f, "COMPATIBLE ({})", v),
            VersionState::Incompatible(v) => write!(f, "INCOMPATIBLE ({})", v),
        }
    }
}
