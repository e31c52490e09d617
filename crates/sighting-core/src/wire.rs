//! JSON wire representation of beacon observations.
//!
//! The mapping between domain fields and wire keys is fixed by
//! [`WireObservation`]:
//!
//! | Domain field      | Wire key  |
//! |-------------------|-----------|
//! | `name`            | `name`    |
//! | `signal_strength` | `rssi`    |
//! | `identifier`      | `uuid`    |
//! | `observed_at`     | `date`    |
//! | `address`         | `address` |
//!
//! Absent optional fields are written as explicit `null` so consumers always
//! see all five keys. On input, `date` may be an RFC 3339 string or an integer
//! count of milliseconds since the Unix epoch.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::observation::{BeaconObservation, ObservationError};

/// Wire keys in output order.
pub const WIRE_KEYS: [&str; 5] = ["name", "rssi", "uuid", "date", "address"];

/// How `date` is written on output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339 in UTC, e.g. `2021-05-01T12:00:00Z`.
    #[default]
    Rfc3339,
    /// Integer milliseconds since the Unix epoch.
    EpochMillis,
}

/// Timestamp as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    /// RFC 3339 text.
    Text(String),
}

impl WireTimestamp {
    fn encode(ts: DateTime<Utc>, format: TimestampFormat) -> Self {
        match format {
            TimestampFormat::Rfc3339 => Self::Text(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            TimestampFormat::EpochMillis => Self::EpochMillis(ts.timestamp_millis()),
        }
    }

    fn decode(&self) -> Result<DateTime<Utc>, ObservationError> {
        match self {
            Self::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms).ok_or_else(|| {
                ObservationError::MalformedWireData(format!(
                    "date: {ms} ms is outside the representable range"
                ))
            }),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    ObservationError::MalformedWireData(format!(
                        "date: '{text}' is not an RFC 3339 timestamp ({e})"
                    ))
                }),
        }
    }
}

/// The wire object for one observation.
///
/// Field order matches [`WIRE_KEYS`]. Unknown keys are ignored on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireObservation {
    /// Device name or `null`.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i64,
    /// Device identifier or `null`.
    pub uuid: Option<String>,
    /// Capture time.
    pub date: WireTimestamp,
    /// Link-layer address.
    pub address: String,
}

impl TryFrom<WireObservation> for BeaconObservation {
    type Error = ObservationError;

    fn try_from(wire: WireObservation) -> Result<Self, Self::Error> {
        let observed_at = wire.date.decode()?;
        let rssi = i32::try_from(wire.rssi).map_err(|_| ObservationError::InvalidObservation {
            field: "signal_strength",
            reason: format!("{} dBm does not fit a signal strength", wire.rssi),
        })?;
        Self::new(wire.uuid, wire.name, rssi, observed_at, wire.address)
    }
}

/// Encoder/decoder configured with an output timestamp format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireCodec {
    format: TimestampFormat,
}

impl WireCodec {
    /// Create a codec writing timestamps in `format`.
    #[must_use]
    pub const fn new(format: TimestampFormat) -> Self {
        Self { format }
    }

    /// The configured output timestamp format.
    #[must_use]
    pub const fn format(&self) -> TimestampFormat {
        self.format
    }

    /// Map an observation to its wire object.
    #[must_use]
    pub fn encode(&self, obs: &BeaconObservation) -> WireObservation {
        WireObservation {
            name: obs.name().map(str::to_owned),
            rssi: i64::from(obs.signal_strength()),
            uuid: obs.identifier().map(str::to_owned),
            date: WireTimestamp::encode(obs.observed_at(), self.format),
            address: obs.address().to_owned(),
        }
    }

    /// Serialize to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::MalformedWireData`] if serialization fails.
    pub fn to_value(&self, obs: &BeaconObservation) -> Result<serde_json::Value, ObservationError> {
        serde_json::to_value(self.encode(obs)).map_err(malformed)
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ObservationError::MalformedWireData`] if serialization fails.
    pub fn to_json_string(&self, obs: &BeaconObservation) -> Result<String, ObservationError> {
        serde_json::to_string(&self.encode(obs)).map_err(malformed)
    }

    /// Decode a JSON value. The codec's format does not restrict input.
    ///
    /// # Errors
    ///
    /// See [`from_value`].
    pub fn decode_value(&self, value: serde_json::Value) -> Result<BeaconObservation, ObservationError> {
        from_value(value)
    }

    /// Decode a JSON string. The codec's format does not restrict input.
    ///
    /// # Errors
    ///
    /// See [`from_json_str`].
    pub fn decode_str(&self, json: &str) -> Result<BeaconObservation, ObservationError> {
        from_json_str(json)
    }
}

/// Serialize with RFC 3339 timestamps.
///
/// # Errors
///
/// Returns [`ObservationError::MalformedWireData`] if serialization fails.
pub fn to_value(obs: &BeaconObservation) -> Result<serde_json::Value, ObservationError> {
    WireCodec::default().to_value(obs)
}

/// Serialize to a JSON string with RFC 3339 timestamps.
///
/// # Errors
///
/// Returns [`ObservationError::MalformedWireData`] if serialization fails.
pub fn to_json_string(obs: &BeaconObservation) -> Result<String, ObservationError> {
    WireCodec::default().to_json_string(obs)
}

/// Decode an observation from a JSON value.
///
/// # Errors
///
/// Returns [`ObservationError::MalformedWireData`] if a required key is
/// missing or has the wrong type, and [`ObservationError::InvalidObservation`]
/// if the decoded fields violate a domain constraint.
pub fn from_value(value: serde_json::Value) -> Result<BeaconObservation, ObservationError> {
    let wire: WireObservation = serde_json::from_value(value).map_err(malformed)?;
    wire.try_into()
}

/// Decode an observation from JSON text.
///
/// # Errors
///
/// As [`from_value`]; syntactically invalid JSON is also
/// [`ObservationError::MalformedWireData`].
pub fn from_json_str(json: &str) -> Result<BeaconObservation, ObservationError> {
    let wire: WireObservation = serde_json::from_str(json).map_err(malformed)?;
    wire.try_into()
}

#[allow(clippy::needless_pass_by_value)]
fn malformed(err: serde_json::Error) -> ObservationError {
    ObservationError::MalformedWireData(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap()
    }

    fn full() -> BeaconObservation {
        BeaconObservation::new(
            Some("abc-123".into()),
            Some("Beacon1".into()),
            -67,
            at(),
            "AA:BB:CC:DD:EE:FF",
        )
        .unwrap()
    }

    #[test]
    fn test_serialize_has_exactly_wire_keys() {
        let value = to_value(&full()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), WIRE_KEYS.len());
        for key in WIRE_KEYS {
            assert!(object.contains_key(key), "missing key {key}");
        }
    }

    #[test]
    fn test_absent_optionals_serialize_as_null() {
        let obs = BeaconObservation::new(None, None, -80, at(), "11:22:33:44:55:66").unwrap();
        let value = to_value(&obs).unwrap();
        assert_eq!(value["name"], serde_json::Value::Null);
        assert_eq!(value["uuid"], serde_json::Value::Null);
        assert!(value.as_object().unwrap().contains_key("name"));

        let back = from_value(value).unwrap();
        assert_eq!(back, obs);
    }

    #[test]
    fn test_full_scenario() {
        let input = json!({
            "name": "Beacon1",
            "rssi": -67,
            "uuid": "abc-123",
            "date": "2021-05-01T12:00:00Z",
            "address": "AA:BB:CC:DD:EE:FF"
        });
        let obs = from_value(input.clone()).unwrap();
        assert_eq!(obs.signal_strength(), -67);
        assert_eq!(obs.identifier(), Some("abc-123"));
        assert_eq!(obs.name(), Some("Beacon1"));
        assert_eq!(obs.address(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(obs.observed_at(), at());

        assert_eq!(to_value(&obs).unwrap(), input);
    }

    #[test]
    fn test_optional_keys_may_be_missing() {
        let obs = from_json_str(
            r#"{"rssi": -80, "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}"#,
        )
        .unwrap();
        assert!(obs.name().is_none());
        assert!(obs.identifier().is_none());
        assert_eq!(obs.signal_strength(), -80);
    }

    #[test]
    fn test_missing_rssi_is_malformed() {
        let err = from_value(json!({
            "date": "2021-05-01T12:00:00Z",
            "address": "11:22:33:44:55:66"
        }))
        .unwrap_err();
        assert!(matches!(err, ObservationError::MalformedWireData(_)));
        assert!(err.to_string().contains("rssi"));
    }

    #[test]
    fn test_string_rssi_is_malformed() {
        let err = from_json_str(
            r#"{"rssi": "strong", "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ObservationError::MalformedWireData(_)));
    }

    #[test]
    fn test_bad_date_is_malformed() {
        for date in [json!("yesterday"), json!(true), json!(null)] {
            let err = from_value(json!({
                "rssi": -60,
                "date": date,
                "address": "11:22:33:44:55:66"
            }))
            .unwrap_err();
            assert!(matches!(err, ObservationError::MalformedWireData(_)));
        }
    }

    #[test]
    fn test_missing_address_is_malformed() {
        let err = from_value(json!({"rssi": -60, "date": "2021-05-01T12:00:00Z"})).unwrap_err();
        assert!(matches!(err, ObservationError::MalformedWireData(_)));
    }

    #[test]
    fn test_out_of_range_rssi_is_invalid() {
        let err = from_value(json!({
            "rssi": -500,
            "date": "2021-05-01T12:00:00Z",
            "address": "11:22:33:44:55:66"
        }))
        .unwrap_err();
        assert!(matches!(err, ObservationError::InvalidObservation { .. }));
    }

    #[test]
    fn test_epoch_millis_input_and_output() {
        let millis = at().timestamp_millis() + 250;
        let obs = from_value(json!({
            "rssi": -60,
            "date": millis,
            "address": "11:22:33:44:55:66"
        }))
        .unwrap();
        assert_eq!(obs.observed_at().timestamp_millis(), millis);

        let codec = WireCodec::new(TimestampFormat::EpochMillis);
        let value = codec.to_value(&obs).unwrap();
        assert_eq!(value["date"], json!(millis));
        assert_eq!(codec.decode_value(value).unwrap(), obs);
    }

    #[test]
    fn test_epoch_millis_outside_rfc3339_years_is_invalid() {
        // 10000-01-01T00:00:00Z and one millisecond before 0000-01-01T00:00:00Z.
        for millis in [253_402_300_800_000_i64, -62_167_219_200_001] {
            let err = from_value(json!({
                "rssi": -60,
                "date": millis,
                "address": "11:22:33:44:55:66"
            }))
            .unwrap_err();
            assert!(matches!(
                err,
                ObservationError::InvalidObservation {
                    field: "observed_at",
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_year_boundaries_round_trip_in_both_formats() {
        for millis in [253_402_300_799_999_i64, -62_167_219_200_000] {
            let obs = from_value(json!({
                "rssi": -60,
                "date": millis,
                "address": "11:22:33:44:55:66"
            }))
            .unwrap();
            for format in [TimestampFormat::Rfc3339, TimestampFormat::EpochMillis] {
                let codec = WireCodec::new(format);
                assert_eq!(codec.decode_value(codec.to_value(&obs).unwrap()).unwrap(), obs);
            }
        }
    }

    #[test]
    fn test_leap_second_round_trips_as_epoch_millis() {
        let leap = Utc
            .with_ymd_and_hms(2016, 12, 31, 23, 59, 59)
            .unwrap()
            .with_nanosecond(1_500_000_000)
            .unwrap();
        let obs = BeaconObservation::new(None, None, -60, leap, "11:22:33:44:55:66").unwrap();
        let codec = WireCodec::new(TimestampFormat::EpochMillis);
        assert_eq!(codec.decode_value(codec.to_value(&obs).unwrap()).unwrap(), obs);
    }

    #[test]
    fn test_rfc3339_output_keeps_millis() {
        let obs = BeaconObservation::new(
            None,
            None,
            -60,
            at() + chrono::Duration::milliseconds(5),
            "11:22:33:44:55:66",
        )
        .unwrap();
        let value = to_value(&obs).unwrap();
        assert_eq!(value["date"], json!("2021-05-01T12:00:00.005Z"));
        assert_eq!(from_value(value).unwrap(), obs);
    }

    #[test]
    fn test_offset_timestamp_normalized_to_utc() {
        let obs = from_value(json!({
            "rssi": -60,
            "date": "2021-05-01T14:00:00+02:00",
            "address": "11:22:33:44:55:66"
        }))
        .unwrap();
        assert_eq!(obs.observed_at(), at());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let obs = from_value(json!({
            "_type": "ble",
            "rssi": -60,
            "date": "2021-05-01T12:00:00Z",
            "address": "11:22:33:44:55:66"
        }))
        .unwrap();
        assert_eq!(obs.signal_strength(), -60);
    }

    #[test]
    fn test_string_output_field_order() {
        let json = to_json_string(&full()).unwrap();
        let positions: Vec<usize> = WIRE_KEYS
            .iter()
            .map(|key| json.find(&format!("\"{key}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ObservationError::MalformedWireData(_)));
    }
}
