//! [`TelemetryRecorder`] – session telemetry log and status surface.
//!
//! Sampling reads position and load from every actuator, appends one
//! [`TelemetrySample`] per successful read pair, and rebuilds the composite
//! status string the dashboard shows next to the state name. The sample log
//! only grows; the CSV export is written once, at session close, in sample
//! creation order with the `Time,ID,Position,Load` header.
//!
//! A failing actuator contributes no row for that pass and does not abort
//! the pass: faults are isolated per actuator.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use grapnel_hal::ActuatorBank;
use grapnel_types::{GripError, TelemetrySample};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Format a session-elapsed duration as `H:MM:SS.ffffff`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        elapsed.subsec_micros()
    )
}

/// One exported row. Field names become the CSV header.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct CsvRow {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "ID")]
    id: u8,
    #[serde(rename = "Position")]
    position: Option<f32>,
    #[serde(rename = "Load")]
    load: f32,
}

/// Accumulates timestamped samples per actuator and renders the live status
/// string.
pub struct TelemetryRecorder {
    started: Instant,
    samples: Vec<TelemetrySample>,
    status: String,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    /// Start a recorder; elapsed timestamps are measured from this call.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            samples: Vec::new(),
            status: String::new(),
        }
    }

    /// Time since the recorder was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// All samples recorded so far, in creation order.
    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    /// The most recently rendered composite status string.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Read every actuator, append one sample per successful read pair, and
    /// rebuild the status string. Returns the refreshed status.
    pub fn sample(&mut self, bank: &mut ActuatorBank) -> &str {
        let elapsed = self.elapsed();
        let mut message = format_elapsed(elapsed);
        message.push('\n');

        for slot in bank.slots_mut() {
            if let Err(e) = slot.refresh() {
                warn!(actuator = slot.id(), error = %e, "sample read failed; actuator skipped this pass");
                continue;
            }
            let t = slot.telemetry();
            self.samples.push(TelemetrySample {
                elapsed,
                actuator_id: slot.id(),
                position: t.last_position,
                load: t.last_load,
            });
            match t.last_position {
                Some(p) => message.push_str(&format!(
                    "[ID: {}] Load: {:.4} kg    Position: {}\n",
                    slot.id(),
                    t.last_load,
                    p
                )),
                None => message.push_str(&format!(
                    "[ID: {}] Load: {:.4} kg    Position: unknown\n",
                    slot.id(),
                    t.last_load
                )),
            }
        }

        self.status = message;
        &self.status
    }

    /// Write the full sample log as CSV: header row first, then one row per
    /// sample in creation order. `Position` is empty when unknown. The
    /// header goes out even for an empty session.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), GripError> {
        let mut out = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        out.write_record(["Time", "ID", "Position", "Load"])
            .map_err(|e| GripError::Export(e.to_string()))?;
        for sample in &self.samples {
            out.serialize(CsvRow {
                time: format_elapsed(sample.elapsed),
                id: sample.actuator_id,
                position: sample.position,
                load: sample.load,
            })
            .map_err(|e| GripError::Export(e.to_string()))?;
        }
        out.flush().map_err(|e| GripError::Export(e.to_string()))
    }

    /// Write the CSV export to `path`, creating or truncating the file.
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<(), GripError> {
        let file = File::create(path.as_ref()).map_err(|e| GripError::Export(e.to_string()))?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapnel_hal::{ActuatorHandle, SimActuator};
    use grapnel_types::FAULT_FREE_CODE;

    fn bank_of(sims: &[SimActuator]) -> ActuatorBank {
        ActuatorBank::new(
            sims.iter()
                .map(|s| Box::new(s.clone()) as Box<dyn ActuatorHandle>)
                .collect(),
            FAULT_FREE_CODE,
        )
    }

    #[test]
    fn format_elapsed_is_h_mm_ss_micros() {
        assert_eq!(format_elapsed(Duration::ZERO), "0:00:00.000000");
        assert_eq!(format_elapsed(Duration::from_micros(1_500_000)), "0:00:01.500000");
        assert_eq!(
            format_elapsed(Duration::from_secs(3 * 3600 + 25 * 60 + 7)),
            "3:25:07.000000"
        );
    }

    #[test]
    fn sample_appends_one_row_per_actuator() {
        let sims = [SimActuator::new(1), SimActuator::new(2)];
        sims[0].set_present_position(Some(120.0));
        sims[0].set_load(1.25);
        sims[1].set_present_position(Some(240.0));
        let mut bank = bank_of(&sims);
        let mut recorder = TelemetryRecorder::new();

        recorder.sample(&mut bank);
        assert_eq!(recorder.samples().len(), 2);
        assert_eq!(recorder.samples()[0].actuator_id, 1);
        assert_eq!(recorder.samples()[0].position, Some(120.0));
        assert_eq!(recorder.samples()[1].actuator_id, 2);

        recorder.sample(&mut bank);
        assert_eq!(recorder.samples().len(), 4);
    }

    #[test]
    fn status_string_lists_every_readable_actuator() {
        let sims = [SimActuator::new(1), SimActuator::new(2)];
        sims[0].set_present_position(Some(2048.0));
        sims[0].set_load(0.5);
        let mut bank = bank_of(&sims);
        let mut recorder = TelemetryRecorder::new();

        let status = recorder.sample(&mut bank).to_string();
        assert!(status.contains("[ID: 1] Load: 0.5000 kg    Position: 2048"));
        assert!(status.contains("[ID: 2] Load: 0.0000 kg    Position: unknown"));
    }

    #[test]
    fn failed_read_skips_only_that_actuator() {
        let sims = [SimActuator::new(1), SimActuator::new(2), SimActuator::new(3)];
        for sim in &sims {
            sim.set_present_position(Some(10.0));
        }
        sims[1].set_read_failing(true);
        let mut bank = bank_of(&sims);
        let mut recorder = TelemetryRecorder::new();

        recorder.sample(&mut bank);
        let ids: Vec<u8> = recorder.samples().iter().map(|s| s.actuator_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn csv_export_round_trips_in_order() {
        let sims = [SimActuator::new(1), SimActuator::new(2)];
        sims[0].set_present_position(Some(300.5));
        sims[0].set_load(2.5);
        // Actuator 2 has no position reading: its Position column is empty.
        sims[1].set_load(0.75);
        let mut bank = bank_of(&sims);
        let mut recorder = TelemetryRecorder::new();
        recorder.sample(&mut bank);
        recorder.sample(&mut bank);

        let mut buf = Vec::new();
        recorder.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("Time,ID,Position,Load\n"));

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let rows: Vec<CsvRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), recorder.samples().len());
        for (row, sample) in rows.iter().zip(recorder.samples()) {
            assert_eq!(row.time, format_elapsed(sample.elapsed));
            assert_eq!(row.id, sample.actuator_id);
            assert_eq!(row.position, sample.position);
            assert_eq!(row.load, sample.load);
        }
    }

    #[test]
    fn export_to_path_writes_header_for_empty_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load_data.csv");
        let recorder = TelemetryRecorder::new();

        recorder.export_to_path(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Time,ID,Position,Load\n");
    }

    #[test]
    fn export_to_path_writes_rows() {
        let sims = [SimActuator::new(1)];
        sims[0].set_present_position(Some(42.0));
        let mut bank = bank_of(&sims);
        let mut recorder = TelemetryRecorder::new();
        recorder.sample(&mut bank);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load_data.csv");
        recorder.export_to_path(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Time,ID,Position,Load"));
        assert_eq!(lines.next().map(|l| l.ends_with(",1,42.0,0.0")), Some(true));
    }
}
