// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Printer data mapping to InfluxDB tags and fields.
//!
//! Optional values only become fields when they carry information: `None`,
//! zero and empty strings are left out, so a point never reports a zero
//! that the host merely failed to fill in.

use crate::influx::FieldValue;
use crate::point::{Fields, Tags};
use crate::source::{CurrentData, JobInfo, Temperatures};

/// Flatten readings into `<sensor>_<reading>` float fields.
pub fn temperature_fields(temperatures: &Temperatures) -> Fields {
    let mut fields = Fields::new();
    for (sensor, readings) in temperatures {
        for (reading, value) in readings {
            fields.insert(format!("{}_{}", sensor, reading), FieldValue::Float(*value));
        }
    }
    fields
}

/// Fields for the `progress` measurement.
///
/// Returns `None` when the host reports no progress block at all.
pub fn progress_fields(data: &CurrentData) -> Option<Fields> {
    let progress = data.progress.as_ref()?;
    let mut fields = Fields::new();

    insert_float(&mut fields, "z", data.current_z);
    if let Some(completion) = progress.completion.filter(|c| *c != 0.0) {
        // "pct" is the legacy rounded field, "completion" the precise one.
        fields.insert("pct".to_string(), FieldValue::Integer(completion.round() as i64));
        fields.insert("completion".to_string(), FieldValue::Float(completion));
    }
    insert_int(&mut fields, "file_position", progress.filepos);
    insert_int(&mut fields, "print_time", progress.print_time);
    insert_int(&mut fields, "print_time_left", progress.print_time_left);
    insert_str(
        &mut fields,
        "print_time_left_origin",
        progress.print_time_left_origin.as_deref(),
    );

    Some(fields)
}

/// Fields for the `state` measurement: job, file, filament and progress
/// metadata.
pub fn state_fields(data: &CurrentData, job: &JobInfo) -> Fields {
    let mut fields = Fields::new();

    insert_str(
        &mut fields,
        "state",
        data.state.as_ref().and_then(|s| s.text.as_deref()),
    );

    insert_float(&mut fields, "average_print_time", job.average_print_time);
    insert_float(&mut fields, "estimated_print_time", job.estimated_print_time);
    insert_float(&mut fields, "last_print_time", job.last_print_time);

    for (tool, filament) in &job.filament {
        insert_float(&mut fields, &format!("filament_{}_length", tool), filament.length);
        insert_float(&mut fields, &format!("filament_{}_volume", tool), filament.volume);
    }

    if let Some(file) = &job.file {
        insert_str(&mut fields, "file_name", file.display.as_deref().or(file.name.as_deref()));
        insert_int(&mut fields, "file_date", file.date);
        insert_int(&mut fields, "file_size", file.size);
    }

    if let Some(progress) = &data.progress {
        insert_float(&mut fields, "completion", progress.completion);
        insert_int(&mut fields, "print_time", progress.print_time);
        insert_int(&mut fields, "print_time_left", progress.print_time_left);
    }

    insert_str(&mut fields, "user", job.user.as_deref());
    fields
}

/// Convert an event payload to tags.
///
/// Scalars are stringified; nulls, arrays and objects are skipped.
pub fn payload_tags(payload: &serde_json::Map<String, serde_json::Value>) -> Tags {
    payload
        .iter()
        .filter_map(|(key, value)| json_to_string(value).map(|s| (key.clone(), s)))
        .collect()
}

/// Convert a JSON value to a string representation for use as an InfluxDB tag.
fn json_to_string(val: &serde_json::Value) -> Option<String> {
    match val {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        // Arrays and objects are not valid tag values
        _ => None,
    }
}

fn insert_float(fields: &mut Fields, key: &str, value: Option<f64>) {
    if let Some(v) = value.filter(|v| *v != 0.0) {
        fields.insert(key.to_string(), FieldValue::Float(v));
    }
}

fn insert_int(fields: &mut Fields, key: &str, value: Option<i64>) {
    if let Some(v) = value.filter(|v| *v != 0) {
        fields.insert(key.to_string(), FieldValue::Integer(v));
    }
}

fn insert_str(fields: &mut Fields, key: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        fields.insert(key.to_string(), FieldValue::String(v.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileInfo, FilamentInfo, Progress, StateInfo};
    use serde_json::json;

    #[test]
    fn test_temperature_fields_flattened() {
        let mut temps = Temperatures::new();
        temps.entry("tool0".into()).or_default().insert("actual".into(), 200.1);
        temps.entry("tool0".into()).or_default().insert("target".into(), 210.0);
        temps.entry("bed".into()).or_default().insert("actual".into(), 60.0);

        let fields = temperature_fields(&temps);

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["tool0_actual"], FieldValue::Float(200.1));
        assert_eq!(fields["tool0_target"], FieldValue::Float(210.0));
        assert_eq!(fields["bed_actual"], FieldValue::Float(60.0));
    }

    #[test]
    fn test_progress_fields_skip_falsy_values() {
        let data = CurrentData {
            progress: Some(Progress {
                completion: Some(42.6),
                filepos: Some(0),
                print_time: Some(120),
                print_time_left: None,
                print_time_left_origin: Some(String::new()),
            }),
            current_z: Some(0.4),
            state: None,
        };

        let fields = progress_fields(&data).expect("progress block");

        assert_eq!(fields.len(), 4);
        assert_eq!(fields["z"], FieldValue::Float(0.4));
        assert_eq!(fields["pct"], FieldValue::Integer(43));
        assert_eq!(fields["completion"], FieldValue::Float(42.6));
        assert_eq!(fields["print_time"], FieldValue::Integer(120));
        assert!(!fields.contains_key("file_position"));
        assert!(!fields.contains_key("print_time_left_origin"));
    }

    #[test]
    fn test_progress_fields_absent_without_block() {
        let data = CurrentData {
            current_z: Some(3.0),
            ..Default::default()
        };
        assert!(progress_fields(&data).is_none());
    }

    #[test]
    fn test_state_fields_cover_job_metadata() {
        let data = CurrentData {
            progress: Some(Progress {
                completion: Some(10.0),
                ..Default::default()
            }),
            current_z: None,
            state: Some(StateInfo {
                text: Some("Printing".into()),
            }),
        };
        let mut filament = std::collections::BTreeMap::new();
        filament.insert(
            "tool0".to_string(),
            FilamentInfo {
                length: Some(1500.0),
                volume: None,
            },
        );
        let job = JobInfo {
            file: Some(FileInfo {
                name: Some("cube.gcode".into()),
                display: Some("Cube".into()),
                size: Some(2048),
                ..Default::default()
            }),
            estimated_print_time: Some(700.5),
            filament,
            user: Some("alice".into()),
            ..Default::default()
        };

        let fields = state_fields(&data, &job);

        assert_eq!(fields["state"], FieldValue::from("Printing"));
        assert_eq!(fields["estimated_print_time"], FieldValue::Float(700.5));
        assert_eq!(fields["filament_tool0_length"], FieldValue::Float(1500.0));
        assert!(!fields.contains_key("filament_tool0_volume"));
        assert_eq!(fields["file_name"], FieldValue::from("Cube"));
        assert_eq!(fields["file_size"], FieldValue::Integer(2048));
        assert_eq!(fields["completion"], FieldValue::Float(10.0));
        assert_eq!(fields["user"], FieldValue::from("alice"));
        assert!(!fields.contains_key("average_print_time"));
    }

    #[test]
    fn test_payload_tags_scalars_only() {
        let payload = json!({
            "name": "cube.gcode",
            "size": 2048,
            "local": true,
            "owner": null,
            "nested": {"a": 1},
            "list": [1, 2]
        });
        let map = payload.as_object().unwrap();

        let tags = payload_tags(map);

        assert_eq!(tags.len(), 3);
        assert_eq!(tags["name"], "cube.gcode");
        assert_eq!(tags["size"], "2048");
        assert_eq!(tags["local"], "true");
    }
}
