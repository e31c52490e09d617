//! Unified error types for the sighting core library.
//!
//! Each module has its own error type ([`ObservationError`],
//! [`AdvertisingError`]). [`SightingError`] gathers the per-record failures for
//! callers that cross module boundaries, such as ingestion. Configuration
//! keeps its own [`ConfigError`](crate::config::ConfigError), since a bad
//! settings file is never a per-record problem.
//!
//! # Example
//!
//! ```rust
//! use sighting_core::error::{Result, SightingError};
//! use sighting_core::wire;
//!
//! fn decode(line: &str) -> Result<i16> {
//!     Ok(wire::from_json_str(line)?.signal_strength())
//! }
//!
//! let err = decode(r#"{"rssi": "strong"}"#).unwrap_err();
//! assert!(matches!(err, SightingError::MalformedWireData(_)));
//! ```

use thiserror::Error;

use crate::advertising::AdvertisingError;
use crate::observation::ObservationError;

/// The unified error type for per-record sighting operations.
#[derive(Debug, Error)]
pub enum SightingError {
    // =========================================================================
    // OBSERVATION ERRORS
    // =========================================================================
    /// A mandatory field is missing or violates a domain constraint.
    #[error("Invalid observation field '{field}': {reason}")]
    InvalidObservation {
        /// Domain name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A wire object is missing required keys or carries mistyped values.
    #[error("Malformed wire data: {0}")]
    MalformedWireData(String),

    // =========================================================================
    // ADVERTISING ERRORS
    // =========================================================================
    /// An advertising payload could not be decoded.
    #[error("Malformed advertisement: {0}")]
    MalformedAdvertisement(String),
}

/// A specialized [`Result`] type for sighting operations.
pub type Result<T> = std::result::Result<T, SightingError>;

impl SightingError {
    /// Returns `true` if this error concerns observation construction or decoding.
    #[inline]
    #[must_use]
    pub const fn is_observation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidObservation { .. } | Self::MalformedWireData(_)
        )
    }

    /// Returns `true` if this error concerns an advertising payload.
    #[inline]
    #[must_use]
    pub const fn is_advertising_error(&self) -> bool {
        matches!(self, Self::MalformedAdvertisement(_))
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidObservation { .. } => "INVALID_OBSERVATION",
            Self::MalformedWireData(_) => "MALFORMED_WIRE_DATA",
            Self::MalformedAdvertisement(_) => "MALFORMED_ADVERTISEMENT",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<ObservationError> for SightingError {
    fn from(err: ObservationError) -> Self {
        match err {
            ObservationError::InvalidObservation { field, reason } => {
                Self::InvalidObservation { field, reason }
            }
            ObservationError::MalformedWireData(message) => Self::MalformedWireData(message),
        }
    }
}

impl From<AdvertisingError> for SightingError {
    fn from(err: AdvertisingError) -> Self {
        Self::MalformedAdvertisement(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
