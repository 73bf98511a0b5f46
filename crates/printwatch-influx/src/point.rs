// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Point construction and normalization.
//!
//! Every point leaving the pipeline goes through [`PointBuilder`], which:
//! - merges the process-wide common tags (caller tags win),
//! - renames the reserved `time` key to `time_` in tags and fields,
//! - stamps the current UTC instant,
//! - prefixes the measurement name.

use crate::influx::{encode_line, FieldValue};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Key the remote store reserves for the point timestamp.
pub const RESERVED_KEY: &str = "time";

/// Tag set type (sorted, unique keys).
pub type Tags = BTreeMap<String, String>;

/// Field set type (sorted, unique keys).
pub type Fields = BTreeMap<String, FieldValue>;

/// Which map of a point a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Tag,
    Field,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Tag => write!(f, "tag"),
            KeyKind::Field => write!(f, "field"),
        }
    }
}

/// Errors raised while building a point.
#[derive(Debug, Error, PartialEq)]
pub enum PointError {
    /// Renaming `time` to `time_` would overwrite an existing key.
    #[error("{kind} key '{key}' already exists, cannot rename reserved key 'time'")]
    ReservedKeyCollision { kind: KeyKind, key: String },

    /// The store rejects points without fields.
    #[error("point '{0}' has no fields")]
    NoFields(String),
}

/// One timestamped observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Measurement name, prefix already applied.
    pub measurement: String,
    pub tags: Tags,
    pub timestamp: DateTime<Utc>,
    pub fields: Fields,
}

impl Point {
    /// ISO-8601 timestamp with an explicit UTC designator, e.g.
    /// `2026-10-19T08:15:02.123456Z`.
    pub fn time_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> i64 {
        // Out of range only past year 2262.
        self.timestamp.timestamp_nanos_opt().unwrap_or_default()
    }

    /// Render as a single Line Protocol line.
    pub fn to_line_protocol(&self) -> String {
        encode_line(
            &self.measurement,
            &self.tags,
            &self.fields,
            self.timestamp_ns(),
        )
    }
}

/// Tags attached to every point produced by this process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonTags(Tags);

impl CommonTags {
    /// Detect the common tags for this machine (currently just `host`).
    pub fn detect() -> Self {
        let host = match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read host name, tagging points as 'unknown'");
                "unknown".to_string()
            }
        };
        Self::with_host(host)
    }

    /// Common tags with a fixed host name.
    pub fn with_host(host: impl Into<String>) -> Self {
        let mut tags = Tags::new();
        tags.insert("host".to_string(), host.into());
        Self(tags)
    }

    /// No common tags at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &Tags {
        &self.0
    }
}

/// Builds normalized points for one measurement prefix.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    common: CommonTags,
    prefix: String,
}

impl PointBuilder {
    pub fn new(common: CommonTags, prefix: impl Into<String>) -> Self {
        Self {
            common,
            prefix: prefix.into(),
        }
    }

    /// Build a point stamped with the current UTC instant.
    pub fn build(&self, measurement: &str, fields: Fields, tags: Tags) -> Result<Point, PointError> {
        self.build_at(measurement, fields, tags, Utc::now())
    }

    /// Build a point with an explicit timestamp.
    pub fn build_at(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> Result<Point, PointError> {
        let measurement = format!("{}{}", self.prefix, measurement);
        if fields.is_empty() {
            return Err(PointError::NoFields(measurement));
        }

        let mut merged = self.common.as_map().clone();
        merged.extend(tags);

        Ok(Point {
            measurement,
            tags: rename_reserved(merged, KeyKind::Tag)?,
            timestamp,
            fields: rename_reserved(fields, KeyKind::Field)?,
        })
    }
}

/// Move the reserved key to `time_`, refusing to clobber an existing `time_`.
fn rename_reserved<V>(
    mut map: BTreeMap<String, V>,
    kind: KeyKind,
) -> Result<BTreeMap<String, V>, PointError> {
    if let Some(value) = map.remove(RESERVED_KEY) {
        let renamed = format!("{}_", RESERVED_KEY);
        if map.contains_key(&renamed) {
            return Err(PointError::ReservedKeyCollision { kind, key: renamed });
        }
        map.insert(renamed, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder(prefix: &str) -> PointBuilder {
        PointBuilder::new(CommonTags::with_host("voron"), prefix)
    }

    fn one_field(key: &str, value: f64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(key.to_string(), FieldValue::Float(value));
        fields
    }

    #[test]
    fn test_reserved_key_renamed_in_tags_and_fields() {
        let mut tags = Tags::new();
        tags.insert("time".to_string(), "noon".to_string());
        let mut fields = one_field("time", 12.0);
        fields.insert("other".to_string(), FieldValue::Integer(1));

        let point = builder("").build("events", fields, tags).unwrap();

        assert!(!point.tags.contains_key("time"));
        assert_eq!(point.tags.get("time_").map(String::as_str), Some("noon"));
        assert!(!point.fields.contains_key("time"));
        assert_eq!(point.fields.get("time_"), Some(&FieldValue::Float(12.0)));
        assert_eq!(point.fields.get("other"), Some(&FieldValue::Integer(1)));
    }

    #[test]
    fn test_reserved_key_collision_is_an_error() {
        let mut fields = one_field("time", 1.0);
        fields.insert("time_".to_string(), FieldValue::Float(2.0));

        let err = builder("").build("m", fields, Tags::new()).unwrap_err();
        assert_eq!(
            err,
            PointError::ReservedKeyCollision {
                kind: KeyKind::Field,
                key: "time_".to_string()
            }
        );
    }

    #[test]
    fn test_common_tags_merged_and_caller_wins() {
        let mut tags = Tags::new();
        tags.insert("origin".to_string(), "local".to_string());
        let point = builder("").build("m", one_field("v", 1.0), tags).unwrap();
        assert_eq!(point.tags.get("host").map(String::as_str), Some("voron"));
        assert_eq!(point.tags.get("origin").map(String::as_str), Some("local"));

        let mut tags = Tags::new();
        tags.insert("host".to_string(), "override".to_string());
        let point = builder("").build("m", one_field("v", 1.0), tags).unwrap();
        assert_eq!(point.tags.get("host").map(String::as_str), Some("override"));
    }

    #[test]
    fn test_prefix_applied_to_measurement() {
        let point = builder("octo_")
            .build("temperature", one_field("bed_actual", 60.0), Tags::new())
            .unwrap();
        assert_eq!(point.measurement, "octo_temperature");
    }

    #[test]
    fn test_empty_fields_rejected() {
        let err = builder("p_").build("progress", Fields::new(), Tags::new()).unwrap_err();
        assert_eq!(err, PointError::NoFields("p_progress".to_string()));
    }

    #[test]
    fn test_timestamp_is_explicit_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 2).unwrap();
        let point = builder("")
            .build_at("m", one_field("v", 1.0), Tags::new(), ts)
            .unwrap();
        assert_eq!(point.time_rfc3339(), "2026-10-19T08:15:02.000000Z");
        assert_eq!(point.timestamp_ns(), ts.timestamp() * 1_000_000_000);
        assert_eq!(
            point.to_line_protocol(),
            format!("m,host=voron v=1 {}", ts.timestamp() * 1_000_000_000)
        );
    }

    #[test]
    fn test_detect_sets_host_tag() {
        let tags = CommonTags::detect();
        assert!(tags.get("host").is_some_and(|h| !h.is_empty()));
    }
}
