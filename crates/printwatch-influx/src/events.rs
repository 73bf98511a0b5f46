// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host event forwarding.
//!
//! Every forwarded event becomes an `events` point (`type` field, payload as
//! tags). When the printer has a job loaded, a `state` point with job and
//! progress metadata follows it. Which events are forwarded and whether the
//! state point is sent is read from settings on each event.

use crate::connection::ConnectionManager;
use crate::mapping::{payload_tags, state_fields};
use crate::point::{CommonTags, Fields, Tags};
use crate::settings::{SettingsExt, SettingsStore};
use crate::source::PrinterSource;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Measurement for forwarded events.
pub const EVENTS_MEASUREMENT: &str = "events";

/// Measurement for the job state snapshot.
pub const STATE_MEASUREMENT: &str = "state";

/// Events forwarded under [`EventFilter::Lifecycle`].
pub const LIFECYCLE_EVENTS: [&str; 6] = [
    "PrintStarted",
    "PrintFailed",
    "PrintDone",
    "PrintCancelled",
    "PrintPaused",
    "PrintResumed",
];

/// Which events are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Lifecycle,
}

impl EventFilter {
    /// Parse the `events` setting.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "lifecycle" => Some(Self::Lifecycle),
            _ => None,
        }
    }
}

/// Event forwarding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPolicy {
    pub filter: EventFilter,
    /// Follow each event with a `state` point.
    pub emit_state: bool,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self {
            filter: EventFilter::All,
            emit_state: true,
        }
    }
}

impl EventPolicy {
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let filter = match settings.get_str(&["events"]) {
            None => EventFilter::default(),
            Some(raw) => EventFilter::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown events filter, forwarding all events");
                EventFilter::All
            }),
        };
        Self {
            filter,
            emit_state: settings.get_bool(&["state"]),
        }
    }

    pub fn allows(&self, event: &str) -> bool {
        match self.filter {
            EventFilter::All => true,
            EventFilter::Lifecycle => LIFECYCLE_EVENTS.contains(&event),
        }
    }
}

/// Turns host events into points.
pub struct EventBridge {
    manager: Arc<ConnectionManager>,
    source: Arc<dyn PrinterSource>,
    settings: Arc<dyn SettingsStore>,
    common: CommonTags,
}

impl EventBridge {
    pub fn new(
        manager: Arc<ConnectionManager>,
        source: Arc<dyn PrinterSource>,
        settings: Arc<dyn SettingsStore>,
        common: CommonTags,
    ) -> Self {
        Self {
            manager,
            source,
            settings,
            common,
        }
    }

    /// Handle one host event.
    pub fn on_event(&self, event: &str, payload: &Map<String, Value>) {
        let policy = EventPolicy::from_settings(self.settings.as_ref());
        if !policy.allows(event) {
            tracing::trace!(event, "event filtered out");
            return;
        }
        if !self.manager.ensure_connected() {
            return;
        }

        let mut fields = Fields::new();
        fields.insert("type".to_string(), event.into());
        self.manager
            .emit(&self.common, EVENTS_MEASUREMENT, fields, payload_tags(payload));

        if policy.emit_state {
            self.emit_state();
        }
    }

    fn emit_state(&self) {
        if !self.source.is_operational() {
            return;
        }
        let job = self.source.current_job();
        if !job.is_loaded() {
            return;
        }
        let fields = state_fields(&self.source.current_data(), &job);
        if !fields.is_empty() {
            self.manager
                .emit(&self.common, STATE_MEASUREMENT, fields, Tags::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockStore;
    use crate::clock::{Clock, ManualClock};
    use crate::influx::FieldValue;
    use crate::settings::YamlSettings;
    use crate::source::{FileInfo, JobInfo, MockPrinter};
    use serde_json::json;

    struct Fixture {
        store: MockStore,
        printer: Arc<MockPrinter>,
        bridge: EventBridge,
    }

    fn fixture(yaml: &str) -> Fixture {
        let store = MockStore::new();
        let printer = Arc::new(MockPrinter::new());
        let settings: Arc<dyn SettingsStore> = Arc::new(YamlSettings::from_yaml(yaml).unwrap());
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&settings),
            Box::new(store.clone()),
            Arc::new(ManualClock::new()) as Arc<dyn Clock>,
        ));
        let bridge = EventBridge::new(
            manager,
            Arc::clone(&printer) as Arc<dyn PrinterSource>,
            settings,
            CommonTags::with_host("voron"),
        );
        Fixture {
            store,
            printer,
            bridge,
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = YamlSettings::in_memory();
        assert_eq!(EventPolicy::from_settings(&settings), EventPolicy::default());

        let settings = YamlSettings::from_yaml("events: Lifecycle\nstate: false\n").unwrap();
        let policy = EventPolicy::from_settings(&settings);
        assert_eq!(policy.filter, EventFilter::Lifecycle);
        assert!(!policy.emit_state);
        assert!(policy.allows("PrintDone"));
        assert!(!policy.allows("ZChange"));

        let settings = YamlSettings::from_yaml("events: bogus\n").unwrap();
        assert_eq!(EventPolicy::from_settings(&settings).filter, EventFilter::All);
    }

    #[test]
    fn test_event_point_with_payload_tags() {
        let f = fixture("");
        f.bridge.on_event(
            "Upload",
            &payload(json!({"name": "cube.gcode", "size": 123, "time": 5, "extra": null})),
        );

        let points = f.store.points("events");
        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.fields.get("type"), Some(&FieldValue::String("Upload".into())));
        assert_eq!(point.tags.get("name").map(String::as_str), Some("cube.gcode"));
        assert_eq!(point.tags.get("size").map(String::as_str), Some("123"));
        assert_eq!(point.tags.get("time_").map(String::as_str), Some("5"));
        assert!(!point.tags.contains_key("time"));
        assert!(!point.tags.contains_key("extra"));
        assert_eq!(point.tags.get("host").map(String::as_str), Some("voron"));
        // No job loaded
        assert!(f.store.points("state").is_empty());
    }

    #[test]
    fn test_lifecycle_filter_drops_other_events() {
        let f = fixture("events: lifecycle\n");
        f.bridge.on_event("ZChange", &Map::new());
        assert!(f.store.written().is_empty());
        assert_eq!(f.store.open_count(), 0);

        f.bridge.on_event("PrintStarted", &Map::new());
        assert_eq!(f.store.points("events").len(), 1);
    }

    #[test]
    fn test_state_point_follows_event_when_job_loaded() {
        let f = fixture("");
        f.printer.set_job(JobInfo {
            file: Some(FileInfo {
                name: Some("cube.gcode".into()),
                size: Some(2048),
                ..Default::default()
            }),
            estimated_print_time: Some(3600.0),
            ..Default::default()
        });

        f.bridge.on_event("PrintStarted", &Map::new());

        let states = f.store.points("state");
        assert_eq!(states.len(), 1);
        let fields = &states[0].fields;
        assert_eq!(fields.get("file_name"), Some(&FieldValue::String("cube.gcode".into())));
        assert_eq!(fields.get("file_size"), Some(&FieldValue::Integer(2048)));
        assert_eq!(fields.get("estimated_print_time"), Some(&FieldValue::Float(3600.0)));
    }

    #[test]
    fn test_state_point_disabled() {
        let f = fixture("state: false\n");
        f.printer.set_job(JobInfo {
            file: Some(FileInfo {
                name: Some("cube.gcode".into()),
                ..Default::default()
            }),
            ..Default::default()
        });

        f.bridge.on_event("PrintStarted", &Map::new());
        assert_eq!(f.store.points("events").len(), 1);
        assert!(f.store.points("state").is_empty());
    }

    #[test]
    fn test_no_connection_no_points() {
        let f = fixture("");
        f.store.set_unreachable(true);
        f.bridge.on_event("PrintStarted", &Map::new());
        assert!(f.store.written().is_empty());
    }
}
