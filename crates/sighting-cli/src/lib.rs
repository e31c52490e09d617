//! # sighting-cli
//!
//! Command-line normalizer for the sighting beacon ingestion system.
//!
//! This library provides the logging setup and the line pipeline used by the
//! `sighting-normalize` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod logging;
pub mod pipeline;
