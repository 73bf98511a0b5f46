// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle.
//!
//! The [`ConnectionManager`] owns the single live client, the parameters it
//! was opened with, the measurement prefix and the sampler timer. It is
//! shared between the timer thread and the host's event callbacks.
//!
//! Remote store failures never escape: they are logged and turn into "not
//! connected". Reconnection happens on demand only, and unforced attempts
//! are debounced to one per [`RECONNECT_DEBOUNCE`].

use crate::client::{ClientError, Connector, InfluxClient};
use crate::clock::Clock;
use crate::params::{measurement_prefix, sample_interval, ConnectionParameters};
use crate::point::{CommonTags, Fields, Point, PointBuilder, Tags};
use crate::settings::SettingsStore;
use crate::timer::{RepeatingTimer, TickFn, TimerHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum spacing between two unforced reconnect attempts.
pub const RECONNECT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Name of the sampler timer thread.
const SAMPLER_THREAD: &str = "printwatch-sampler";

/// Why a connection attempt produced no client.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not connect to InfluxDB: {0}")]
    Connect(#[source] ClientError),

    #[error("could not set up database '{database}': {source}")]
    Provision {
        database: String,
        #[source]
        source: ClientError,
    },
}

/// Mutable connection record.
#[derive(Default)]
pub struct ConnectionState {
    client: Option<Arc<dyn InfluxClient>>,
    active: Option<ConnectionParameters>,
    prefix: String,
    timer: Option<TimerHandle>,
    last_attempt: Option<Instant>,
    /// Set by `shutdown`; only a forced reconnect clears it.
    shut_down: bool,
}

impl ConnectionState {
    fn cancel_timer(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Owns the remote store connection and the sampler timer.
pub struct ConnectionManager {
    settings: Arc<dyn SettingsStore>,
    connector: Box<dyn Connector>,
    clock: Arc<dyn Clock>,
    state: Mutex<ConnectionState>,
    /// Serializes the reconnect procedure.
    reconnect_lock: Mutex<()>,
    tick: Mutex<Option<TickFn>>,
}

impl ConnectionManager {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        connector: Box<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            connector,
            clock,
            state: Mutex::new(ConnectionState::default()),
            reconnect_lock: Mutex::new(()),
            tick: Mutex::new(None),
        }
    }

    /// Callback the sampler timer runs. Takes effect on the next reconnect.
    pub fn set_tick(&self, tick: TickFn) {
        *self.tick.lock() = Some(tick);
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().client.is_some()
    }

    /// Whether a sampler timer is currently running.
    pub fn is_sampling(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    /// Measurement prefix read at the last reconnect that left a client.
    pub fn measurement_prefix(&self) -> String {
        self.state.lock().prefix.clone()
    }

    /// Parameters of the live client, if any connect succeeded.
    pub fn active_parameters(&self) -> Option<ConnectionParameters> {
        self.state.lock().active.clone()
    }

    /// True if a client exists, otherwise try a (debounced) reconnect first.
    pub fn ensure_connected(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        self.reconnect(false);
        self.is_connected()
    }

    /// Rebuild the connection from the current settings.
    ///
    /// Unforced calls within [`RECONNECT_DEBOUNCE`] of the previous attempt
    /// do nothing. An existing client is reused when the parameters did not
    /// change. The sampler timer is restarted only if a client exists
    /// afterwards. After [`shutdown`](Self::shutdown) only a forced call
    /// reconnects.
    pub fn reconnect(&self, force: bool) {
        let _serial = self.reconnect_lock.lock();
        let now = self.clock.now();

        let (existing, active) = {
            let mut state = self.state.lock();
            if state.shut_down {
                if !force {
                    tracing::debug!("shut down, not reconnecting");
                    return;
                }
                state.shut_down = false;
            }
            if let Some(last) = state.last_attempt {
                if !force && now.saturating_duration_since(last) < RECONNECT_DEBOUNCE {
                    tracing::debug!("reconnect attempted recently, skipping");
                    return;
                }
            }
            state.last_attempt = Some(now);
            state.cancel_timer();
            (state.client.clone(), state.active.clone())
        };

        let params = ConnectionParameters::from_settings(self.settings.as_ref());

        let client: Option<Arc<dyn InfluxClient>> = match existing {
            Some(client) if active.as_ref() == Some(&params) => {
                tracing::debug!("connection parameters unchanged, reusing client");
                Some(client)
            }
            _ => self.try_connect(&params).map(Arc::from),
        };

        {
            let mut state = self.state.lock();
            state.client = client.clone();
            if client.is_none() {
                return;
            }
            state.active = Some(params);
            state.prefix = measurement_prefix(self.settings.as_ref());
        }

        let Some(tick) = self.tick.lock().clone() else {
            return;
        };
        let interval = sample_interval(self.settings.as_ref());
        match RepeatingTimer::start(SAMPLER_THREAD, interval, tick) {
            Ok(timer) => {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "sampler started");
                self.state.lock().timer = Some(timer);
            }
            Err(e) => tracing::error!(error = %e, "could not start sampler thread"),
        }
    }

    /// Open and provision a client, logging any failure.
    pub fn try_connect(&self, params: &ConnectionParameters) -> Option<Box<dyn InfluxClient>> {
        match self.connect(params) {
            Ok(client) => {
                tracing::info!(%params, "connected to InfluxDB");
                Some(client)
            }
            Err(e) => {
                tracing::error!(%params, error = %e, "InfluxDB connection failed");
                None
            }
        }
    }

    /// Open a client, check liveness, create the target database if it is
    /// missing and select it.
    pub fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn InfluxClient>, ConnectError> {
        let (options, database) = params.clone().into_parts();

        let mut client = self.connector.open(&options).map_err(ConnectError::Connect)?;
        client.ping().map_err(ConnectError::Connect)?;

        let provision = |source: ClientError| ConnectError::Provision {
            database: database.clone(),
            source,
        };
        let existing = client.list_databases().map_err(provision)?;
        if !existing.iter().any(|name| *name == database) {
            tracing::info!(database = %database, "creating database");
            client.create_database(&database).map_err(provision)?;
        }

        client.switch_database(&database);
        Ok(client)
    }

    /// Write one point through the live client.
    ///
    /// Returns false if there is no client or the write failed. A failed
    /// write drops the client (unless it was already replaced) and runs an
    /// unforced reconnect before returning.
    pub fn write_point(&self, point: &Point) -> bool {
        let client = {
            let state = self.state.lock();
            if state.shut_down {
                return false;
            }
            state.client.clone()
        };
        let Some(client) = client else {
            tracing::debug!(measurement = %point.measurement, "not connected, dropping point");
            return false;
        };

        match client.write_points(std::slice::from_ref(point)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(measurement = %point.measurement, error = %e, "write failed");
                {
                    let mut state = self.state.lock();
                    if state.client.as_ref().is_some_and(|c| Arc::ptr_eq(c, &client)) {
                        state.client = None;
                    }
                }
                self.reconnect(false);
                false
            }
        }
    }

    /// Build a point with the current prefix and write it.
    pub fn emit(&self, common: &CommonTags, measurement: &str, fields: Fields, tags: Tags) -> bool {
        let builder = PointBuilder::new(common.clone(), self.measurement_prefix());
        match builder.build(measurement, fields, tags) {
            Ok(point) => self.write_point(&point),
            Err(e) => {
                tracing::warn!(measurement, error = %e, "dropping point");
                false
            }
        }
    }

    /// Stop sampling and drop the client. Stays down until a forced
    /// reconnect.
    pub fn shutdown(&self) {
        let _serial = self.reconnect_lock.lock();
        let mut state = self.state.lock();
        state.shut_down = true;
        state.cancel_timer();
        state.client = None;
        state.active = None;
        tracing::info!("connection closed");
    }
}
