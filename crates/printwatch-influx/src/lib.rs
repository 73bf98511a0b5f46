// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! printwatch InfluxDB telemetry
//!
//! Streams 3D-printer telemetry into an InfluxDB 1.x time-series database.
//!
//! This crate provides:
//! - A connection manager that provisions the target database and reconnects
//!   on demand (debounced)
//! - A periodic sampler for temperatures and print progress
//! - An event bridge that records host events and job state
//! - A settings adapter with defaults, lenient typing and versioned migration
//! - InfluxDB Line Protocol generation, written over HTTP or UDP
//!
//! # Overview
//!
//! ```text
//! timer tick --> Sampler ------\
//!                               +--> PointBuilder --> ConnectionManager --> InfluxDB
//! host event --> EventBridge --/
//! ```
//!
//! Remote store failures never reach the host: they are logged and the
//! pipeline keeps running without a connection until the next reconnect.

pub mod client;
pub mod clock;
pub mod connection;
pub mod events;
pub mod influx;
pub mod mapping;
pub mod params;
pub mod plugin;
pub mod point;
pub mod sampler;
pub mod settings;
pub mod source;
pub mod timer;

pub use client::{ClientError, Connector, HttpConnector, InfluxClient, MockStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{ConnectError, ConnectionManager, RECONNECT_DEBOUNCE};
pub use events::{EventBridge, EventFilter, EventPolicy};
pub use influx::FieldValue;
pub use params::{ClientOptions, ConnectionParameters};
pub use plugin::{
    EventHooks, InfluxPlugin, LifecycleHooks, SettingsHooks, TemplateConfig, TemplateHooks,
    UpdateInformation,
};
pub use point::{CommonTags, Fields, Point, PointBuilder, PointError, Tags};
pub use sampler::Sampler;
pub use settings::{SettingsError, SettingsExt, SettingsStore, YamlSettings};
pub use source::{MockPrinter, PrinterSnapshot, PrinterSource, SnapshotPrinter};
