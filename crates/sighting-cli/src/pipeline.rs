//! Line-oriented normalization pipeline.
//!
//! Each input line is one JSON object: a wire observation or a raw scan
//! report, depending on [`InputMode`]. Bad lines are logged and skipped. At
//! end of input the newest observation per device is written out as wire
//! JSON, one object per line.

use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sighting_core::{
    wire, IngestOutcome, Ingestor, ScanReport, Settings, SightingError, WireCodec,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Shape of the input lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Wire observations (`name`, `rssi`, `uuid`, `date`, `address`).
    Wire,
    /// Raw scan reports from a capture layer.
    #[default]
    Scan,
}

impl FromStr for InputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wire" => Ok(Self::Wire),
            "scan" => Ok(Self::Scan),
            other => bail!("unknown input mode '{other}', expected 'wire' or 'scan'"),
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines read, blank ones included.
    pub lines: usize,
    /// Sightings stored in the device table.
    pub recorded: usize,
    /// Sightings older than the stored one.
    pub stale: usize,
    /// Sightings rejected by the filter.
    pub filtered: usize,
    /// Lines that could not be decoded or normalized.
    pub rejected: usize,
    /// Wire objects written.
    pub emitted: usize,
}

/// Ingestor and codec configured from [`Settings`].
#[derive(Debug)]
pub struct Pipeline {
    mode: InputMode,
    ingestor: Ingestor,
    codec: WireCodec,
}

impl Pipeline {
    /// Build a pipeline from settings.
    #[must_use]
    pub fn new(settings: &Settings, mode: InputMode) -> Self {
        Self {
            mode,
            ingestor: Ingestor::new(settings.filter.clone()),
            codec: settings.codec(),
        }
    }

    /// Decode and ingest one line.
    ///
    /// # Errors
    ///
    /// Returns the decoding or normalization error for the line.
    pub fn ingest_line(
        &self,
        line: &str,
        now: DateTime<Utc>,
    ) -> sighting_core::Result<IngestOutcome> {
        match self.mode {
            InputMode::Wire => Ok(self.ingestor.ingest_observation(wire::from_json_str(line)?)),
            InputMode::Scan => {
                let report: ScanReport = serde_json::from_str(line)
                    .map_err(|e| SightingError::MalformedWireData(e.to_string()))?;
                self.ingestor.ingest(report, now)
            }
        }
    }

    /// Take the current batch and encode it, one JSON object per entry.
    ///
    /// # Errors
    ///
    /// Returns an error if an observation cannot be serialized.
    pub fn drain(&self) -> anyhow::Result<Vec<String>> {
        self.ingestor
            .table()
            .take_batch()
            .iter()
            .map(|obs| {
                self.codec
                    .to_json_string(obs)
                    .with_context(|| format!("encoding observation for {}", obs.address()))
            })
            .collect()
    }
}

/// Read every line from `reader`, then write the batch to `writer`.
///
/// # Errors
///
/// Returns an error on I/O failure. Undecodable lines, invalid UTF-8
/// included, are skipped, not fatal.
pub async fn run<R, W>(
    pipeline: &Pipeline,
    mut reader: R,
    mut writer: W,
) -> anyhow::Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = RunSummary::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await.context("reading input")? == 0 {
            break;
        }
        summary.lines += 1;

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(line = summary.lines, "Skipping input line that is not UTF-8");
            summary.rejected += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match pipeline.ingest_line(line, Utc::now()) {
            Ok(IngestOutcome::Recorded) => summary.recorded += 1,
            Ok(IngestOutcome::Stale) => summary.stale += 1,
            Ok(IngestOutcome::Filtered(_)) => summary.filtered += 1,
            Err(e) => {
                warn!(line = summary.lines, code = e.error_code(), error = %e, "Skipping input line");
                summary.rejected += 1;
            }
        }
    }

    for json in pipeline.drain()? {
        writer.write_all(json.as_bytes()).await.context("writing output")?;
        writer.write_all(b"\n").await.context("writing output")?;
        summary.emitted += 1;
    }
    writer.flush().await.context("flushing output")?;

    debug!(?summary, "Pipeline finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sighting_core::TimestampFormat;

    fn lines(output: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_input_mode_parsing() {
        assert_eq!("wire".parse::<InputMode>().unwrap(), InputMode::Wire);
        assert_eq!(" SCAN ".parse::<InputMode>().unwrap(), InputMode::Scan);
        assert!("mqtt".parse::<InputMode>().is_err());
        assert_eq!(InputMode::default(), InputMode::Scan);
    }

    #[test]
    fn test_wire_mode_dedups_and_skips_bad_lines() {
        let pipeline = Pipeline::new(&Settings::default(), InputMode::Wire);
        let input = br#"{"name": "Beacon1", "rssi": -67, "uuid": "abc-123", "date": "2021-05-01T12:00:00Z", "address": "AA:BB:CC:DD:EE:FF"}
{"rssi": -60, "date": "2021-05-01T12:00:05Z", "address": "aa:bb:cc:dd:ee:ff"}

{"rssi": "strong", "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}
{"rssi": -99, "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}
{"rssi": -80, "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}
"#;
        let mut output = Vec::new();

        let summary =
            tokio_test::block_on(run(&pipeline, &input[..], &mut output)).unwrap();

        assert_eq!(summary.lines, 6);
        assert_eq!(summary.recorded, 3);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.emitted, 2);

        let out = lines(&output);
        assert_eq!(out[0]["address"], "11:22:33:44:55:66");
        assert_eq!(out[0]["name"], serde_json::Value::Null);
        assert_eq!(out[1]["address"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(out[1]["rssi"], -60);
        assert_eq!(out[1]["date"], "2021-05-01T12:00:05Z");
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let pipeline = Pipeline::new(&Settings::default(), InputMode::Wire);
        let mut input = Vec::new();
        input.extend_from_slice(
            br#"{"rssi": -60, "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}"#,
        );
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(
            br#"{"rssi": -70, "date": "2021-05-01T12:00:00Z", "address": "AA:BB:CC:DD:EE:FF"}"#,
        );
        let mut output = Vec::new();

        let summary =
            tokio_test::block_on(run(&pipeline, &input[..], &mut output)).unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.emitted, 2);
        assert_eq!(lines(&output).len(), 2);
    }

    #[test]
    fn test_scan_mode_with_epoch_output() {
        let mut settings = Settings::default();
        settings.wire.timestamp_format = TimestampFormat::EpochMillis;
        let pipeline = Pipeline::new(&settings, InputMode::Scan);

        let input = br#"{"address": "11:22:33:44:55:66", "rssi": -70, "advertisement": "0E09736F66746C6F6769737469637303030F18", "observed_at": "2021-05-01T12:00:00Z"}
{"address": "11:22:33:44:55:67", "rssi": -70, "advertisement": "0509"}
"#;
        let mut output = Vec::new();

        let summary =
            tokio_test::block_on(run(&pipeline, &input[..], &mut output)).unwrap();
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.rejected, 1);

        let out = lines(&output);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["name"], "softlogistics");
        assert_eq!(out[0]["uuid"], "0000180f-0000-1000-8000-00805f9b34fb");
        assert_eq!(out[0]["date"], 1_619_870_400_000_i64);
    }

    #[test]
    fn test_drain_empties_table() {
        let pipeline = Pipeline::new(&Settings::default(), InputMode::Wire);
        pipeline
            .ingest_line(
                r#"{"rssi": -60, "date": "2021-05-01T12:00:00Z", "address": "11:22:33:44:55:66"}"#,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(pipeline.drain().unwrap().len(), 1);
        assert!(pipeline.drain().unwrap().is_empty());
    }
}
