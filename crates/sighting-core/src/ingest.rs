//! Scan report ingestion.
//!
//! The capture layer hands over raw [`ScanReport`]s. Each report is
//! normalized into a [`BeaconObservation`], checked against an
//! [`ObservationFilter`], and kept in a [`DeviceTable`] that holds the newest
//! observation per device until the transport layer takes the batch.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::advertising::AdvertisingData;
use crate::distance::estimate_distance;
use crate::error::Result;
use crate::observation::BeaconObservation;

/// Default floor below which sightings are dropped, in dBm.
pub const DEFAULT_MIN_RSSI: i16 = -95;

/// A raw sighting as reported by the scanning stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Link-layer address of the device.
    pub address: String,

    /// Name reported by the stack, if any.
    #[serde(default)]
    pub name: Option<String>,

    /// Received signal strength in dBm.
    pub rssi: i32,

    /// Calibrated TX power reported by the stack, in dBm.
    #[serde(default)]
    pub tx_power: Option<i8>,

    /// Raw advertising payload as hex text.
    #[serde(default)]
    pub advertisement: Option<String>,

    /// Capture time; ingestion time is used when absent.
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// A normalized sighting with the radio details the wire model leaves out.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    /// The normalized observation.
    pub observation: BeaconObservation,
    /// Calibrated TX power, from the report or the advertisement.
    pub tx_power: Option<i8>,
}

impl Sighting {
    /// Estimated distance in metres, when TX power is known.
    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        self.tx_power
            .and_then(|tx| estimate_distance(self.observation.signal_strength(), tx))
    }
}

/// Normalize a scan report.
///
/// The name comes from the report, falling back to the advertised local
/// name. The identifier is the first advertised service UUID, falling back
/// to the first service-data UUID. Blank names are treated as absent.
///
/// # Errors
///
/// Returns an error if the advertisement cannot be decoded or the resulting
/// observation is invalid.
pub fn normalize(report: ScanReport, now: DateTime<Utc>) -> Result<Sighting> {
    let advertising = report
        .advertisement
        .as_deref()
        .map(AdvertisingData::from_hex)
        .transpose()?
        .unwrap_or_default();

    let name = report
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| advertising.local_name());
    let identifier = advertising
        .service_uuids()
        .first()
        .copied()
        .or_else(|| advertising.service_data().first().map(|(uuid, _)| *uuid))
        .map(|uuid| uuid.to_string());
    let tx_power = report.tx_power.or_else(|| advertising.tx_power());

    let observation = BeaconObservation::new(
        identifier,
        name,
        report.rssi,
        report.observed_at.unwrap_or(now),
        &report.address,
    )?;

    Ok(Sighting {
        observation,
        tx_power,
    })
}

/// Acceptance rules applied to normalized observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationFilter {
    /// Sightings at or below this strength are dropped.
    pub min_rssi: i16,

    /// When set, only sightings at or above this strength are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearby_rssi: Option<i16>,

    /// Drop sightings without an identifier.
    pub require_identifier: bool,

    /// When set, only devices with exactly this name are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_equals: Option<String>,
}

impl Default for ObservationFilter {
    fn default() -> Self {
        Self {
            min_rssi: DEFAULT_MIN_RSSI,
            nearby_rssi: None,
            require_identifier: false,
            name_equals: None,
        }
    }
}

impl ObservationFilter {
    /// Why `obs` is rejected, or `None` if it passes.
    #[must_use]
    pub fn rejection_reason(&self, obs: &BeaconObservation) -> Option<&'static str> {
        let rssi = obs.signal_strength();
        if rssi <= self.min_rssi {
            return Some("signal below floor");
        }
        if self.nearby_rssi.is_some_and(|nearby| rssi < nearby) {
            return Some("not nearby");
        }
        if self.require_identifier && obs.identifier().is_none() {
            return Some("no identifier");
        }
        if let Some(expected) = &self.name_equals {
            if obs.name() != Some(expected.as_str()) {
                return Some("name mismatch");
            }
        }
        None
    }

    /// Returns `true` if `obs` passes every rule.
    #[must_use]
    pub fn accepts(&self, obs: &BeaconObservation) -> bool {
        self.rejection_reason(obs).is_none()
    }
}

/// Newest observation per device address.
///
/// Safe to share between the capture side recording sightings and the
/// transport side taking batches.
#[derive(Debug, Default)]
pub struct DeviceTable {
    entries: RwLock<BTreeMap<String, BeaconObservation>>,
}

impl DeviceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, BeaconObservation>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, BeaconObservation>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `obs` unless the table already holds a newer one for its address.
    ///
    /// Returns `true` if the observation was stored.
    pub fn record(&self, obs: BeaconObservation) -> bool {
        let mut entries = self.write();
        if let Some(held) = entries.get(obs.address()) {
            if held.observed_at() > obs.observed_at() {
                return false;
            }
        }
        entries.insert(obs.address().to_owned(), obs);
        true
    }

    /// Copy of the held observations, ordered by address.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BeaconObservation> {
        self.read().values().cloned().collect()
    }

    /// Remove and return every held observation, ordered by address.
    pub fn take_batch(&self) -> Vec<BeaconObservation> {
        std::mem::take(&mut *self.write()).into_values().collect()
    }

    /// Number of devices held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no devices are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// What happened to an ingested sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored as the newest observation for its device.
    Recorded,
    /// Older than what the table already holds.
    Stale,
    /// Rejected by the filter.
    Filtered(&'static str),
}

/// Filter plus device table.
#[derive(Debug, Default)]
pub struct Ingestor {
    filter: ObservationFilter,
    table: DeviceTable,
}

impl Ingestor {
    /// Create an ingestor with the given filter and an empty table.
    #[must_use]
    pub fn new(filter: ObservationFilter) -> Self {
        Self {
            filter,
            table: DeviceTable::new(),
        }
    }

    /// The active filter.
    #[must_use]
    pub const fn filter(&self) -> &ObservationFilter {
        &self.filter
    }

    /// The device table.
    #[must_use]
    pub const fn table(&self) -> &DeviceTable {
        &self.table
    }

    /// Normalize and ingest a scan report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be normalized; see [`normalize`].
    pub fn ingest(&self, report: ScanReport, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let sighting = normalize(report, now)?;
        if let Some(distance) = sighting.distance() {
            trace!(
                address = sighting.observation.address(),
                distance_m = distance,
                "Estimated distance"
            );
        }
        Ok(self.ingest_observation(sighting.observation))
    }

    /// Ingest an already-normalized observation.
    pub fn ingest_observation(&self, obs: BeaconObservation) -> IngestOutcome {
        if let Some(reason) = self.filter.rejection_reason(&obs) {
            debug!(address = obs.address(), rssi = obs.signal_strength(), reason, "Sighting filtered");
            return IngestOutcome::Filtered(reason);
        }

        let address = obs.address().to_owned();
        if self.table.record(obs) {
            debug!(address = %address, "Sighting recorded");
            IngestOutcome::Recorded
        } else {
            debug!(address = %address, "Stale sighting ignored");
            IngestOutcome::Stale
        }
    }
}
