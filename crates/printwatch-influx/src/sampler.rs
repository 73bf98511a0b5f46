// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic temperature and progress sampling.

use crate::connection::ConnectionManager;
use crate::mapping::{progress_fields, temperature_fields};
use crate::point::{CommonTags, Tags};
use crate::source::PrinterSource;
use std::sync::Arc;

/// Measurement for flattened temperature readings.
pub const TEMPERATURE_MEASUREMENT: &str = "temperature";

/// Measurement for print progress.
pub const PROGRESS_MEASUREMENT: &str = "progress";

/// Samples the printer on every timer tick.
pub struct Sampler {
    manager: Arc<ConnectionManager>,
    source: Arc<dyn PrinterSource>,
    common: CommonTags,
}

impl Sampler {
    pub fn new(
        manager: Arc<ConnectionManager>,
        source: Arc<dyn PrinterSource>,
        common: CommonTags,
    ) -> Self {
        Self {
            manager,
            source,
            common,
        }
    }

    /// Take one sample.
    ///
    /// Does nothing unless connected and the printer is operational. Emits
    /// at most one `temperature` and one `progress` point.
    pub fn gather(&self) {
        if !self.manager.ensure_connected() || !self.source.is_operational() {
            return;
        }

        let fields = temperature_fields(&self.source.current_temperatures());
        if !fields.is_empty() {
            self.manager
                .emit(&self.common, TEMPERATURE_MEASUREMENT, fields, Tags::new());
        }

        let data = self.source.current_data();
        if let Some(fields) = progress_fields(&data).filter(|f| !f.is_empty()) {
            self.manager
                .emit(&self.common, PROGRESS_MEASUREMENT, fields, Tags::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockStore;
    use crate::clock::{Clock, ManualClock};
    use crate::influx::FieldValue;
    use crate::settings::{SettingsStore, YamlSettings};
    use crate::source::{CurrentData, MockPrinter, Progress};

    fn sampler(store: &MockStore, printer: Arc<MockPrinter>) -> Sampler {
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(YamlSettings::in_memory()) as Arc<dyn SettingsStore>,
            Box::new(store.clone()),
            Arc::new(ManualClock::new()) as Arc<dyn Clock>,
        ));
        Sampler::new(manager, printer, CommonTags::with_host("voron"))
    }

    #[test]
    fn test_idle_printer_emits_nothing() {
        let store = MockStore::new();
        let printer = Arc::new(MockPrinter::new());
        printer.set_temperature("tool0", "actual", 21.5);
        printer.set_operational(false);

        sampler(&store, printer).gather();
        assert!(store.written().is_empty());
    }

    #[test]
    fn test_no_readings_no_point() {
        let store = MockStore::new();
        sampler(&store, Arc::new(MockPrinter::new())).gather();
        assert!(store.written().is_empty());
    }

    #[test]
    fn test_progress_point() {
        let store = MockStore::new();
        let printer = Arc::new(MockPrinter::new());
        printer.set_current_data(CurrentData {
            progress: Some(Progress {
                completion: Some(42.6),
                filepos: Some(1024),
                print_time: Some(600),
                print_time_left: None,
                print_time_left_origin: Some("estimate".into()),
            }),
            current_z: Some(0.4),
            state: None,
        });

        sampler(&store, printer).gather();

        let points = store.points("progress");
        assert_eq!(points.len(), 1);
        let fields = &points[0].fields;
        assert_eq!(fields.get("pct"), Some(&FieldValue::Integer(43)));
        assert_eq!(fields.get("completion"), Some(&FieldValue::Float(42.6)));
        assert_eq!(fields.get("z"), Some(&FieldValue::Float(0.4)));
        assert_eq!(fields.get("file_position"), Some(&FieldValue::Integer(1024)));
        assert!(!fields.contains_key("print_time_left"));
    }

    #[test]
    fn test_empty_progress_block_skipped() {
        let store = MockStore::new();
        let printer = Arc::new(MockPrinter::new());
        printer.set_current_data(CurrentData {
            progress: Some(Progress::default()),
            ..Default::default()
        });

        sampler(&store, printer).gather();
        assert!(store.points("progress").is_empty());
    }
}
