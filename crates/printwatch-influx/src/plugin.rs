// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host-facing plugin.
//!
//! [`InfluxPlugin`] wires the connection manager, the sampler and the event
//! bridge together and exposes them through the hook traits the host calls.

use crate::client::{Connector, HttpConnector};
use crate::clock::{Clock, SystemClock};
use crate::connection::ConnectionManager;
use crate::events::EventBridge;
use crate::point::CommonTags;
use crate::sampler::Sampler;
use crate::settings::{self, SettingsError, SettingsStore, SETTINGS_VERSION};
use crate::source::PrinterSource;
use crate::timer::TickFn;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Identifier the host registers the plugin under.
pub const PLUGIN_ID: &str = "influxdb";

/// Human readable plugin name.
pub const PLUGIN_NAME: &str = "InfluxDB Plugin";

/// Settings only administrators may read.
pub const RESTRICTED_PATHS: [&str; 2] = ["username", "password"];

/// Startup and shutdown notifications.
pub trait LifecycleHooks {
    fn on_after_startup(&self);
    fn on_shutdown(&self);
}

/// Settings schema and change notifications.
pub trait SettingsHooks {
    fn settings_version(&self) -> u32;
    fn settings_defaults(&self) -> Value;
    fn restricted_paths(&self) -> &'static [&'static str];
    /// Upgrade stored settings from `current` to `target`.
    fn on_settings_migrate(&self, target: u32, current: Option<u32>) -> Result<(), SettingsError>;
    /// Apply settings submitted by the user.
    fn on_settings_save(&self, data: &Value);
}

/// Host event delivery.
pub trait EventHooks {
    fn on_event(&self, event: &str, payload: &Map<String, Value>);
}

/// UI template registration.
pub trait TemplateHooks {
    fn template_configs(&self) -> Vec<TemplateConfig>;
}

/// One UI template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub custom_bindings: bool,
}

/// Release check and install descriptor for the host's software updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInformation {
    pub display_name: String,
    pub display_version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
    pub repo: String,
    pub current: String,
    /// `{target_version}` is substituted by the updater.
    pub pip: String,
}

impl UpdateInformation {
    pub fn for_version(version: &str) -> Self {
        Self {
            display_name: PLUGIN_NAME.to_string(),
            display_version: version.to_string(),
            kind: "github_release".to_string(),
            user: "agrif".to_string(),
            repo: "OctoPrint-InfluxDB".to_string(),
            current: version.to_string(),
            pip: "https://github.com/agrif/OctoPrint-InfluxDB/archive/{target_version}.zip"
                .to_string(),
        }
    }
}

/// The InfluxDB telemetry plugin.
pub struct InfluxPlugin {
    settings: Arc<dyn SettingsStore>,
    manager: Arc<ConnectionManager>,
    sampler: Arc<Sampler>,
    events: EventBridge,
}

impl InfluxPlugin {
    /// Plugin talking to a real server, tagged with this machine's name.
    pub fn new(settings: Arc<dyn SettingsStore>, source: Arc<dyn PrinterSource>) -> Self {
        Self::with_backend(
            settings,
            source,
            Box::new(HttpConnector),
            Arc::new(SystemClock),
            CommonTags::detect(),
        )
    }

    /// Plugin with an explicit connector, clock and common tags.
    pub fn with_backend(
        settings: Arc<dyn SettingsStore>,
        source: Arc<dyn PrinterSource>,
        connector: Box<dyn Connector>,
        clock: Arc<dyn Clock>,
        common: CommonTags,
    ) -> Self {
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&settings),
            connector,
            clock,
        ));
        let sampler = Arc::new(Sampler::new(
            Arc::clone(&manager),
            Arc::clone(&source),
            common.clone(),
        ));

        // The manager must not keep the sampler alive: the sampler owns it.
        let weak = Arc::downgrade(&sampler);
        let tick: TickFn = Arc::new(move || {
            if let Some(sampler) = weak.upgrade() {
                sampler.gather();
            }
        });
        manager.set_tick(tick);

        let events = EventBridge::new(Arc::clone(&manager), source, Arc::clone(&settings), common);

        Self {
            settings,
            manager,
            sampler,
            events,
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn sampler(&self) -> &Arc<Sampler> {
        &self.sampler
    }

    pub fn update_information(&self) -> UpdateInformation {
        UpdateInformation::for_version(env!("CARGO_PKG_VERSION"))
    }
}

impl LifecycleHooks for InfluxPlugin {
    fn on_after_startup(&self) {
        tracing::info!("starting InfluxDB telemetry");
        self.manager.reconnect(true);
    }

    fn on_shutdown(&self) {
        self.manager.shutdown();
    }
}

impl SettingsHooks for InfluxPlugin {
    fn settings_version(&self) -> u32 {
        SETTINGS_VERSION
    }

    fn settings_defaults(&self) -> Value {
        settings::defaults()
    }

    fn restricted_paths(&self) -> &'static [&'static str] {
        &RESTRICTED_PATHS
    }

    fn on_settings_migrate(&self, target: u32, current: Option<u32>) -> Result<(), SettingsError> {
        settings::migrate(current, target)
    }

    fn on_settings_save(&self, data: &Value) {
        self.settings.merge(data);
        if let Err(e) = self.settings.save() {
            tracing::error!(error = %e, "could not persist settings");
        }
        self.manager.reconnect(true);
    }
}

impl EventHooks for InfluxPlugin {
    fn on_event(&self, event: &str, payload: &Map<String, Value>) {
        self.events.on_event(event, payload);
    }
}

impl TemplateHooks for InfluxPlugin {
    fn template_configs(&self) -> Vec<TemplateConfig> {
        vec![TemplateConfig {
            kind: "settings".to_string(),
            custom_bindings: false,
        }]
    }
}
