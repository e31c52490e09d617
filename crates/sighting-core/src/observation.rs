//! Beacon observation value type.
//!
//! A [`BeaconObservation`] records a single sighting of a Bluetooth device:
//! who was seen, how strong the signal was, and when. Values are validated
//! once at construction and never change afterwards; enrichment produces a
//! new value.

use chrono::{DateTime, Datelike, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Weakest signal strength a BLE controller reports, in dBm.
pub const MIN_RSSI_DBM: i16 = -127;

/// Strongest signal strength accepted, in dBm.
pub const MAX_RSSI_DBM: i16 = 20;

/// Maximum length of a Bluetooth local name, in bytes.
pub const MAX_NAME_BYTES: usize = 248;

/// Years an observation may carry; RFC 3339 has no notation outside them.
pub const OBSERVED_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

static MAC_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}$").expect("MAC address pattern is valid")
});

/// Errors raised while constructing or decoding an observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
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
}

impl ObservationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: &'static str) -> Self {
        Self::invalid(field, "is required")
    }
}

/// Returns `true` if `address` is a MAC-48 address (`AA:BB:CC:DD:EE:FF`).
///
/// Both `:` and `-` separators are accepted, in any letter case.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Normalizes a MAC address to upper-case, colon-separated form.
///
/// Returns `None` if the input is not a MAC-48 address.
#[must_use]
pub fn normalize_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if !is_valid_mac_address(trimmed) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase().replace('-', ":"))
}

/// A single point-in-time sighting of a Bluetooth device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeaconObservation {
    name: Option<String>,
    signal_strength: i16,
    identifier: Option<String>,
    observed_at: DateTime<Utc>,
    address: String,
}

impl BeaconObservation {
    /// Construct a validated observation.
    ///
    /// The address is normalized to upper-case colon form and the timestamp
    /// is truncated to millisecond precision.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::InvalidObservation`] if the signal strength
    /// is outside `MIN_RSSI_DBM..=MAX_RSSI_DBM`, the timestamp falls outside
    /// [`OBSERVED_YEARS`], the address is not a MAC-48 address, or a present
    /// `name` / `identifier` is blank.
    pub fn new(
        identifier: Option<String>,
        name: Option<String>,
        signal_strength: i32,
        observed_at: DateTime<Utc>,
        address: impl AsRef<str>,
    ) -> Result<Self, ObservationError> {
        let signal_strength = check_signal_strength(i64::from(signal_strength))?;
        let observed_at = check_observed_at(observed_at)?;
        let address = normalize_address(address.as_ref()).ok_or_else(|| {
            ObservationError::invalid(
                "address",
                format!("'{}' is not a MAC address", address.as_ref()),
            )
        })?;

        Ok(Self {
            name: check_name(name)?,
            signal_strength,
            identifier: check_identifier(identifier)?,
            observed_at,
            address,
        })
    }

    /// Start building an observation field by field.
    #[must_use]
    pub fn builder() -> ObservationBuilder {
        ObservationBuilder::default()
    }

    /// Human-readable device label, if one was advertised.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Received signal strength in dBm.
    #[must_use]
    pub const fn signal_strength(&self) -> i16 {
        self.signal_strength
    }

    /// Opaque device identifier, typically a service UUID.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// When the observation was captured.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Normalized link-layer address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns a copy with the name replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::InvalidObservation`] if the name is blank
    /// or too long.
    pub fn with_name(&self, name: Option<String>) -> Result<Self, ObservationError> {
        Ok(Self {
            name: check_name(name)?,
            ..self.clone()
        })
    }

    /// Returns a copy with the identifier replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::InvalidObservation`] if the identifier is blank.
    pub fn with_identifier(&self, identifier: Option<String>) -> Result<Self, ObservationError> {
        Ok(Self {
            identifier: check_identifier(identifier)?,
            ..self.clone()
        })
    }
}

/// Incremental constructor for capture layers that learn fields one at a time.
///
/// Nothing is validated until [`ObservationBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ObservationBuilder {
    name: Option<String>,
    signal_strength: Option<i32>,
    identifier: Option<String>,
    observed_at: Option<DateTime<Utc>>,
    address: Option<String>,
}

impl ObservationBuilder {
    /// Set the device name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the signal strength in dBm.
    #[must_use]
    pub const fn signal_strength(mut self, rssi: i32) -> Self {
        self.signal_strength = Some(rssi);
        self
    }

    /// Set the device identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the capture timestamp.
    #[must_use]
    pub const fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    /// Set the link-layer address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Validate and produce the observation.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::InvalidObservation`] if a mandatory field
    /// was never set or any field fails validation.
    pub fn build(self) -> Result<BeaconObservation, ObservationError> {
        let signal_strength = self
            .signal_strength
            .ok_or_else(|| ObservationError::missing("signal_strength"))?;
        let observed_at = self
            .observed_at
            .ok_or_else(|| ObservationError::missing("observed_at"))?;
        let address = self
            .address
            .ok_or_else(|| ObservationError::missing("address"))?;

        BeaconObservation::new(
            self.identifier,
            self.name,
            signal_strength,
            observed_at,
            address,
        )
    }
}

pub(crate) fn check_signal_strength(rssi: i64) -> Result<i16, ObservationError> {
    i16::try_from(rssi)
        .ok()
        .filter(|dbm| (MIN_RSSI_DBM..=MAX_RSSI_DBM).contains(dbm))
        .ok_or_else(|| {
            ObservationError::invalid(
                "signal_strength",
                format!("{rssi} dBm is outside {MIN_RSSI_DBM}..={MAX_RSSI_DBM} dBm"),
            )
        })
}

fn check_name(name: Option<String>) -> Result<Option<String>, ObservationError> {
    match name {
        Some(n) if n.trim().is_empty() => Err(ObservationError::invalid("name", "is blank")),
        Some(n) if n.len() > MAX_NAME_BYTES => Err(ObservationError::invalid(
            "name",
            format!("is {} bytes, limit is {MAX_NAME_BYTES}", n.len()),
        )),
        other => Ok(other),
    }
}

fn check_identifier(identifier: Option<String>) -> Result<Option<String>, ObservationError> {
    match identifier {
        Some(id) if id.trim().is_empty() => {
            Err(ObservationError::invalid("identifier", "is blank"))
        }
        other => Ok(other),
    }
}

fn check_observed_at(ts: DateTime<Utc>) -> Result<DateTime<Utc>, ObservationError> {
    if !OBSERVED_YEARS.contains(&ts.year()) {
        return Err(ObservationError::invalid(
            "observed_at",
            format!(
                "year {} is outside {}..={}",
                ts.year(),
                OBSERVED_YEARS.start(),
                OBSERVED_YEARS.end()
            ),
        ));
    }
    Ok(truncate_to_millis(ts))
}

/// Drops sub-millisecond precision and folds a leap second into the second before it.
fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let millis = ts.nanosecond().min(999_999_999) / 1_000_000;
    ts.with_nanosecond(millis * 1_000_000).unwrap_or(ts)
}
