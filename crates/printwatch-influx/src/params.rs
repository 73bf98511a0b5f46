// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection parameters derived from settings.

use crate::settings::{SettingsExt, SettingsStore};
use std::fmt;
use std::time::Duration;

/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "octoprint";

/// Sampling interval used when none (or zero) is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Everything needed to open a client, minus the target database.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ClientOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    /// Only set when `use_tls` is.
    pub verify_tls: Option<bool>,
    pub use_datagram_transport: bool,
    /// Only set when `use_datagram_transport` is; replaces `port`.
    pub datagram_port: Option<u16>,
}

/// Full connection parameters.
///
/// Compared by value: unchanged parameters mean the live client is reused.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConnectionParameters {
    pub options: ClientOptions,
    pub database: String,
}

impl ConnectionParameters {
    /// Build parameters from the settings store.
    ///
    /// - `host` / `port` are only taken when non-empty
    /// - credentials only when `authenticate` is set
    /// - `verify_ssl` only when `ssl` is set
    /// - with `udp`, the configured port moves to the datagram slot
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let mut options = ClientOptions {
            host: non_empty_str(settings, "host"),
            port: port(settings, "port"),
            use_tls: settings.get_bool(&["ssl"]),
            use_datagram_transport: settings.get_bool(&["udp"]),
            ..Default::default()
        };

        if settings.get_bool(&["authenticate"]) {
            options.username = non_empty_str(settings, "username");
            options.password = non_empty_str(settings, "password");
        }
        if options.use_tls {
            options.verify_tls = Some(settings.get_bool(&["verify_ssl"]));
        }
        if options.use_datagram_transport {
            options.datagram_port = options.port.take();
        }

        Self {
            options,
            database: non_empty_str(settings, "database")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        }
    }

    /// Split into client options and the database name.
    pub fn into_parts(self) -> (ClientOptions, String) {
        (self.options, self.database)
    }
}

/// Measurement prefix, empty when unset.
pub fn measurement_prefix(settings: &dyn SettingsStore) -> String {
    settings.get_str(&["prefix"]).unwrap_or_default()
}

/// Sampling interval in seconds; zero, negative or unset means the default.
pub fn sample_interval(settings: &dyn SettingsStore) -> Duration {
    settings
        .get_float(&["interval"])
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_INTERVAL)
}

fn non_empty_str(settings: &dyn SettingsStore, key: &str) -> Option<String> {
    settings.get_str(&[key]).filter(|s| !s.is_empty())
}

fn port(settings: &dyn SettingsStore, key: &str) -> Option<u16> {
    let raw = settings.get_int(&[key]).filter(|p| *p != 0)?;
    match u16::try_from(raw) {
        Ok(port) => Some(port),
        Err(_) => {
            tracing::warn!(port = raw, "ignoring out-of-range {} setting", key);
            None
        }
    }
}

// Credentials never reach logs: both renderings leave them out.

impl fmt::Display for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(host) = &self.host {
            parts.push(format!("host={:?}", host));
        }
        if let Some(port) = self.port {
            parts.push(format!("port={}", port));
        }
        parts.push(format!("ssl={}", self.use_tls));
        parts.push(format!("udp={}", self.use_datagram_transport));
        if let Some(port) = self.datagram_port {
            parts.push(format!("udp_port={}", port));
        }
        if let Some(verify) = self.verify_tls {
            parts.push(format!("verify_ssl={}", verify));
        }
        if self.username.is_some() {
            parts.push("authenticated=true".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("verify_tls", &self.verify_tls)
            .field("use_datagram_transport", &self.use_datagram_transport)
            .field("datagram_port", &self.datagram_port)
            .finish()
    }
}

impl fmt::Display for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database={:?}, {}", self.database, self.options)
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("options", &self.options)
            .field("database", &self.database)
            .finish()
    }
}
