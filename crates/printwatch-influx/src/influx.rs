// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol encoding.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use std::collections::BTreeMap;
use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: double-quoted; quotes, backslashes and newlines escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// Encode one point as a single Line Protocol line.
///
/// Tags and fields are emitted in key order. Tags with an empty value are
/// left out, the server rejects them. `fields` must not be empty.
pub fn encode_line(
    measurement: &str,
    tags: &BTreeMap<String, String>,
    fields: &BTreeMap<String, FieldValue>,
    timestamp_ns: i64,
) -> String {
    debug_assert!(!fields.is_empty(), "InfluxDB requires at least one field");

    let mut line = escape_measurement(measurement);

    for (key, value) in tags.iter().filter(|(_, v)| !v.is_empty()) {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    // Space separator before fields
    line.push(' ');

    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    line.push(' ');
    line.push_str(&timestamp_ns.to_string());
    line
}

/// Escape a measurement name for Line Protocol.
/// Backslashes, newlines, commas and spaces are escaped.
fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys.
/// Commas, equals signs, spaces, newlines and backslashes must be escaped.
fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fields(pairs: Vec<(&str, FieldValue)>) -> BTreeMap<String, FieldValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_field_value_formats() {
        assert_eq!(FieldValue::Float(3.15).to_line_protocol(), "3.15");
        assert_eq!(FieldValue::Integer(42).to_line_protocol(), "42i");
        assert_eq!(FieldValue::Boolean(false).to_line_protocol(), "false");
        assert_eq!(
            FieldValue::String("say \"hi\"".to_string()).to_line_protocol(),
            "\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_u64_conversion_saturates() {
        assert_eq!(FieldValue::from(u64::MAX), FieldValue::Integer(i64::MAX));
        assert_eq!(FieldValue::from(7u64), FieldValue::Integer(7));
    }

    #[test]
    fn test_line_with_sorted_tags() {
        let line = encode_line(
            "temperature",
            &tags(&[("sensor", "A1"), ("host", "printer")]),
            &fields(vec![("tool0_actual", FieldValue::Float(200.1))]),
            1_000_000_000,
        );
        assert_eq!(
            line,
            "temperature,host=printer,sensor=A1 tool0_actual=200.1 1000000000"
        );
    }

    #[test]
    fn test_line_multiple_fields_in_key_order() {
        let line = encode_line(
            "progress",
            &BTreeMap::new(),
            &fields(vec![
                ("pct", FieldValue::Integer(42)),
                ("completion", FieldValue::Float(41.7)),
                ("print_time_left_origin", FieldValue::from("estimate")),
            ]),
            2_000_000_000,
        );
        assert_eq!(
            line,
            "progress completion=41.7,pct=42i,print_time_left_origin=\"estimate\" 2000000000"
        );
    }

    #[test]
    fn test_line_escape_special_chars() {
        let line = encode_line(
            "my measurement",
            &tags(&[("tag key", "tag,value")]),
            &fields(vec![("field=key", FieldValue::from("hello \"world\""))]),
            3_000_000_000,
        );
        assert_eq!(
            line,
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000000000"
        );
    }

    #[test]
    fn test_newlines_stay_on_one_line() {
        let line = encode_line(
            "events",
            &tags(&[("reason", "heater\nthermal runaway")]),
            &fields(vec![("type", FieldValue::from("PrintFailed\nx"))]),
            7,
        );
        assert_eq!(line.lines().count(), 1);
        assert_eq!(
            line,
            "events,reason=heater\\nthermal\\ runaway type=\"PrintFailed\\nx\" 7"
        );
    }

    #[test]
    fn test_trailing_backslash_does_not_eat_separator() {
        let line = encode_line(
            "events",
            &tags(&[("path", "C:\\"), ("reason", "x")]),
            &fields(vec![("type", FieldValue::from("a\\b"))]),
            8,
        );
        assert_eq!(line, "events,path=C:\\\\,reason=x type=\"a\\\\b\" 8");
    }

    #[test]
    fn test_line_skips_empty_tag_values() {
        let line = encode_line(
            "events",
            &tags(&[("origin", ""), ("path", "cube.gcode")]),
            &fields(vec![("type", FieldValue::from("PrintStarted"))]),
            5,
        );
        assert_eq!(line, "events,path=cube.gcode type=\"PrintStarted\" 5");
    }
}
