// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB 1.x client.
//!
//! Administrative calls go over HTTP:
//!
//! | Call              | Request                                        |
//! |-------------------|------------------------------------------------|
//! | liveness probe    | `GET /ping`                                    |
//! | list databases    | `GET /query?q=SHOW DATABASES`                  |
//! | create database   | `POST /query?q=CREATE DATABASE "<name>"`       |
//! | write points      | `POST /write?db=<name>&precision=ns`           |
//!
//! With the datagram transport enabled, writes are sent as Line Protocol
//! over UDP instead; the administrative calls still use HTTP on the
//! default port.

use crate::params::ClientOptions;
use crate::point::Point;
use parking_lot::Mutex;
use serde::Deserialize;
use std::net::UdpSocket;
use std::sync::Arc;
use thiserror::Error;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// HTTP API port used when none is configured.
pub const DEFAULT_PORT: u16 = 8086;

/// UDP listener port used when none is configured.
pub const DEFAULT_UDP_PORT: u16 = 4444;

/// Remote store errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("server error: {0}")]
    Server(String),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no database selected")]
    NoDatabase,
}

/// Operations the pipeline needs from a remote store client.
pub trait InfluxClient: Send + Sync {
    /// Lightweight liveness probe.
    fn ping(&self) -> Result<(), ClientError>;

    /// Names of all databases on the server.
    fn list_databases(&self) -> Result<Vec<String>, ClientError>;

    /// Create a database.
    fn create_database(&self, name: &str) -> Result<(), ClientError>;

    /// Select the database subsequent writes go to.
    fn switch_database(&mut self, name: &str);

    /// Write points to the selected database.
    fn write_points(&self, points: &[Point]) -> Result<(), ClientError>;
}

/// Opens clients. Separate from [`InfluxClient`] so connection management can
/// be exercised without a server.
pub trait Connector: Send + Sync {
    fn open(&self, options: &ClientOptions) -> Result<Box<dyn InfluxClient>, ClientError>;
}

/// Connector producing [`HttpInfluxClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn open(&self, options: &ClientOptions) -> Result<Box<dyn InfluxClient>, ClientError> {
        Ok(Box::new(HttpInfluxClient::new(options)?))
    }
}

/// Datagram write path.
struct UdpTarget {
    socket: UdpSocket,
    host: String,
    port: u16,
}

/// InfluxDB 1.x HTTP API client with optional UDP writes.
pub struct HttpInfluxClient {
    http: reqwest::blocking::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    udp: Option<UdpTarget>,
}

impl HttpInfluxClient {
    /// Build a client. No network traffic happens until the first call.
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        let host = options.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = options.port.unwrap_or(DEFAULT_PORT);
        let scheme = if options.use_tls { "https" } else { "http" };

        let mut builder = reqwest::blocking::Client::builder();
        if options.use_tls && options.verify_tls == Some(false) {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        let udp = if options.use_datagram_transport {
            Some(UdpTarget {
                socket: UdpSocket::bind(("0.0.0.0", 0))?,
                host: host.clone(),
                port: options.datagram_port.unwrap_or(DEFAULT_UDP_PORT),
            })
        } else {
            None
        };

        Ok(Self {
            http,
            base_url: format!("{}://{}:{}", scheme, host, port),
            username: options.username.clone(),
            password: options.password.clone(),
            database: None,
            udp,
        })
    }

    /// Base URL of the HTTP API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Currently selected database.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Url, ClientError> {
        reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<String, ClientError> {
        let request = match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        };
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }

    fn query(&self, method: reqwest::Method, q: &str) -> Result<QueryResponse, ClientError> {
        let url = self.url("/query", &[("q", q)])?;
        let body = self.send(self.http.request(method, url))?;
        let response: QueryResponse = serde_json::from_str(&body)?;
        response.check()?;
        Ok(response)
    }
}

impl InfluxClient for HttpInfluxClient {
    fn ping(&self) -> Result<(), ClientError> {
        let url = self.url("/ping", &[])?;
        self.send(self.http.get(url))?;
        Ok(())
    }

    fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        let response = self.query(reqwest::Method::GET, "SHOW DATABASES")?;
        Ok(response.first_column())
    }

    fn create_database(&self, name: &str) -> Result<(), ClientError> {
        let q = format!("CREATE DATABASE {}", quote_identifier(name));
        self.query(reqwest::Method::POST, &q)?;
        Ok(())
    }

    fn switch_database(&mut self, name: &str) {
        self.database = Some(name.to_string());
    }

    fn write_points(&self, points: &[Point]) -> Result<(), ClientError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = points
            .iter()
            .map(Point::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(udp) = &self.udp {
            udp.socket.send_to(body.as_bytes(), (udp.host.as_str(), udp.port))?;
            return Ok(());
        }

        let database = self.database.as_deref().ok_or(ClientError::NoDatabase)?;
        let url = self.url("/write", &[("db", database), ("precision", "ns")])?;
        self.send(self.http.post(url).body(body))?;
        Ok(())
    }
}

/// Body of a `/query` response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// Errors can be reported at the top level or per statement.
    fn check(&self) -> Result<(), ClientError> {
        if let Some(error) = &self.error {
            return Err(ClientError::Server(error.clone()));
        }
        if let Some(error) = self.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(ClientError::Server(error.clone()));
        }
        Ok(())
    }

    /// String values of the first column across all series.
    fn first_column(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| &r.series)
            .flat_map(|s| &s.values)
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }
}

/// Pull the `error` member out of a JSON error body, or return it raw.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Double-quote an identifier for InfluxQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[derive(Default)]
struct MockStoreState {
    databases: Vec<String>,
    created: Vec<String>,
    opened: Vec<ClientOptions>,
    written: Vec<(String, Point)>,
    unreachable: bool,
    fail_writes: bool,
}

/// In-memory remote store for testing without a server.
///
/// Cloning shares the store; every client it opens reads and writes the
/// same state.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockStoreState>>,
}

impl MockStore {
    /// Create an empty, reachable store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds the given databases
    pub fn with_databases(names: &[&str]) -> Self {
        let store = Self::new();
        store.state.lock().databases = names.iter().map(|n| n.to_string()).collect();
        store
    }

    /// Make pings fail (or succeed again)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Make writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Number of clients opened so far
    pub fn open_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Options of every client opened, oldest first
    pub fn opened(&self) -> Vec<ClientOptions> {
        self.state.lock().opened.clone()
    }

    /// Databases created through the API, in order
    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    pub fn databases(&self) -> Vec<String> {
        self.state.lock().databases.clone()
    }

    /// Points written so far with their target database
    pub fn written(&self) -> Vec<(String, Point)> {
        self.state.lock().written.clone()
    }

    /// Points written to `measurement`
    pub fn points(&self, measurement: &str) -> Vec<Point> {
        self.state
            .lock()
            .written
            .iter()
            .filter(|(_, p)| p.measurement == measurement)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Connector for MockStore {
    fn open(&self, options: &ClientOptions) -> Result<Box<dyn InfluxClient>, ClientError> {
        self.state.lock().opened.push(options.clone());
        Ok(Box::new(MockClient {
            state: Arc::clone(&self.state),
            database: None,
        }))
    }
}

/// Mock client
struct MockClient {
    state: Arc<Mutex<MockStoreState>>,
    database: Option<String>,
}

impl InfluxClient for MockClient {
    fn ping(&self) -> Result<(), ClientError> {
        if self.state.lock().unreachable {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.state.lock().databases.clone())
    }

    fn create_database(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.created.push(name.to_string());
        if !state.databases.iter().any(|d| d == name) {
            state.databases.push(name.to_string());
        }
        Ok(())
    }

    fn switch_database(&mut self, name: &str) {
        self.database = Some(name.to_string());
    }

    fn write_points(&self, points: &[Point]) -> Result<(), ClientError> {
        let database = self.database.clone().ok_or(ClientError::NoDatabase)?;
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(ClientError::Status {
                status: 500,
                message: "write failed".to_string(),
            });
        }
        state
            .written
            .extend(points.iter().map(|p| (database.clone(), p.clone())));
        Ok(())
    }
}
