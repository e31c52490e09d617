//! # sighting-core
//!
//! Core logic for the sighting beacon ingestion system.
//!
//! This crate provides:
//! - A validated, immutable Bluetooth beacon observation type
//! - The JSON wire contract exchanged with remote collectors
//! - BLE advertising payload decoding and distance estimation
//! - Scan report normalization, filtering, and per-device batching
//! - Configuration management
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`observation`] - The [`BeaconObservation`] value type and its builder
//! - [`wire`] - Serialization to and from the JSON wire representation
//! - [`advertising`] - AD structure parsing for raw advertising payloads
//! - [`distance`] - RSSI-based distance estimation
//! - [`ingest`] - Scan report normalization, filters, and the device table
//! - [`config`] - Settings loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertising;
pub mod config;
pub mod distance;
pub mod error;
pub mod ingest;
pub mod observation;
pub mod wire;

// Re-export primary types for convenience
pub use crate::advertising::{AdStructure, AdvertisingData, AdvertisingError};
pub use crate::config::{
    default_config_path, ConfigError, ConfigResult, Settings, WireSettings,
};
pub use crate::distance::estimate_distance;
pub use crate::error::{Result, SightingError};
pub use crate::ingest::{
    normalize, DeviceTable, IngestOutcome, Ingestor, ObservationFilter, ScanReport, Sighting,
};
pub use crate::observation::{
    is_valid_mac_address, BeaconObservation, ObservationBuilder, ObservationError,
};
pub use crate::wire::{TimestampFormat, WireCodec, WireObservation, WIRE_KEYS};
