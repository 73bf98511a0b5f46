// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Printer data source abstraction.
//!
//! The host process that drives the printer is an opaque collaborator. The
//! pipeline only needs the four read-only queries of [`PrinterSource`];
//! lifecycle events are pushed in through the plugin's event hook.
//!
//! The data types mirror the host's JSON shapes (camelCase keys, nullable
//! values) so snapshots can be deserialized directly.

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Sensor name -> reading name -> value, e.g. `tool0 -> actual -> 200.1`.
pub type Temperatures = BTreeMap<String, BTreeMap<String, f64>>;

/// Print progress block of the current data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Completion in percent (0.0 - 100.0).
    pub completion: Option<f64>,
    /// Byte offset into the file being printed.
    pub filepos: Option<i64>,
    /// Elapsed print time in seconds.
    pub print_time: Option<i64>,
    /// Estimated remaining time in seconds.
    pub print_time_left: Option<i64>,
    /// How the remaining time was estimated ("linear", "analysis", ...).
    pub print_time_left_origin: Option<String>,
}

/// Printer state as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub text: Option<String>,
}

/// Current data snapshot (`get_current_data` on the host).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentData {
    pub progress: Option<Progress>,
    pub current_z: Option<f64>,
    pub state: Option<StateInfo>,
}

/// File selected for printing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: Option<String>,
    pub display: Option<String>,
    pub path: Option<String>,
    pub origin: Option<String>,
    /// Upload time (Unix seconds).
    pub date: Option<i64>,
    /// Size in bytes.
    pub size: Option<i64>,
}

/// Filament estimate for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilamentInfo {
    /// Length in mm.
    pub length: Option<f64>,
    /// Volume in cm³.
    pub volume: Option<f64>,
}

/// Current job (`get_current_job` on the host).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub file: Option<FileInfo>,
    pub average_print_time: Option<f64>,
    pub estimated_print_time: Option<f64>,
    pub last_print_time: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filament: BTreeMap<String, FilamentInfo>,
    pub user: Option<String>,
}

impl JobInfo {
    /// A job counts as loaded once a file has been selected.
    pub fn is_loaded(&self) -> bool {
        self.file
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .is_some_and(|name| !name.is_empty())
    }
}

/// Read-only view of the printer exposed by the host process.
pub trait PrinterSource: Send + Sync {
    /// True while the printer is connected and able to report state.
    fn is_operational(&self) -> bool;

    /// Current temperature readings.
    fn current_temperatures(&self) -> Temperatures;

    /// Current progress/state data.
    fn current_data(&self) -> CurrentData;

    /// Currently loaded job.
    fn current_job(&self) -> JobInfo;
}

/// Everything a [`PrinterSource`] reports, in one serializable record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSnapshot {
    pub operational: bool,
    #[serde(deserialize_with = "lenient_temperatures")]
    pub temperatures: Temperatures,
    pub current_data: CurrentData,
    pub job: JobInfo,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Hosts report unset targets as `null`; those readings are dropped.
fn lenient_temperatures<'de, D>(deserializer: D) -> Result<Temperatures, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, BTreeMap<String, Option<f64>>>> =
        Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(sensor, readings)| {
            let readings = readings
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v)))
                .collect();
            (sensor, readings)
        })
        .collect())
}

// ============================================================================
// Snapshot file source (standalone binary)
// ============================================================================

/// Data source backed by a JSON snapshot file.
///
/// The file is re-read on every query so an external process can keep it
/// current. Unreadable or malformed files read as a non-operational printer.
pub struct SnapshotPrinter {
    path: PathBuf,
}

impl SnapshotPrinter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the snapshot, falling back to an idle printer on error.
    pub fn load(&self) -> PrinterSnapshot {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read printer snapshot");
                return PrinterSnapshot::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "malformed printer snapshot");
                PrinterSnapshot::default()
            }
        }
    }
}

impl PrinterSource for SnapshotPrinter {
    fn is_operational(&self) -> bool {
        self.load().operational
    }

    fn current_temperatures(&self) -> Temperatures {
        self.load().temperatures
    }

    fn current_data(&self) -> CurrentData {
        self.load().current_data
    }

    fn current_job(&self) -> JobInfo {
        self.load().job
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// In-memory printer whose state tests set directly.
#[derive(Default)]
pub struct MockPrinter {
    snapshot: Mutex<PrinterSnapshot>,
}

impl MockPrinter {
    /// Create an operational printer with no readings.
    pub fn new() -> Self {
        Self::from_snapshot(PrinterSnapshot {
            operational: true,
            ..Default::default()
        })
    }

    pub fn from_snapshot(snapshot: PrinterSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set_operational(&self, operational: bool) {
        self.snapshot.lock().operational = operational;
    }

    /// Set one reading, e.g. `("tool0", "actual", 200.1)`.
    pub fn set_temperature(&self, sensor: &str, reading: &str, value: f64) {
        self.snapshot
            .lock()
            .temperatures
            .entry(sensor.to_string())
            .or_default()
            .insert(reading.to_string(), value);
    }

    pub fn set_current_data(&self, data: CurrentData) {
        self.snapshot.lock().current_data = data;
    }

    pub fn set_job(&self, job: JobInfo) {
        self.snapshot.lock().job = job;
    }
}

impl PrinterSource for MockPrinter {
    fn is_operational(&self) -> bool {
        self.snapshot.lock().operational
    }

    fn current_temperatures(&self) -> Temperatures {
        self.snapshot.lock().temperatures.clone()
    }

    fn current_data(&self) -> CurrentData {
        self.snapshot.lock().current_data.clone()
    }

    fn current_job(&self) -> JobInfo {
        self.snapshot.lock().job.clone()
    }
}
