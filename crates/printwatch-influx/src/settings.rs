// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key-path addressed settings store.
//!
//! Settings live in a JSON-like tree. Lookups fall back to [`defaults`] when
//! a key is missing or `null`. The YAML file carries a `_config_version`
//! entry; loading a file whose version cannot be migrated fails.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current settings schema version.
pub const SETTINGS_VERSION: u32 = 0;

/// Key holding the schema version in the settings file.
pub const VERSION_KEY: &str = "_config_version";

/// Settings errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("settings root must be a mapping")]
    NotAMapping,

    #[error("could not migrate settings from version {current} to {target}")]
    Migration { current: u32, target: u32 },
}

/// Default value for every known key.
pub fn defaults() -> Value {
    json!({
        "host": null,
        "port": null,
        "authenticate": false,
        "udp": false,
        "ssl": false,
        "verify_ssl": true,
        "database": "octoprint",
        "prefix": "",
        "username": null,
        "password": null,
        "interval": 1,
        "events": "all",
        "state": true,
    })
}

/// Migrate stored settings from `current` (unversioned = 0) to `target`.
///
/// There are no migration steps yet, so any mismatch is fatal.
pub fn migrate(current: Option<u32>, target: u32) -> Result<(), SettingsError> {
    let current = current.unwrap_or(0);
    // Migration steps go here, each bumping `current`.
    if current != target {
        return Err(SettingsError::Migration { current, target });
    }
    Ok(())
}

/// A settings store addressed by key path, e.g. `["events"]`.
pub trait SettingsStore: Send + Sync {
    /// Raw value at `path`, with defaults applied. `None` when unset.
    fn get(&self, path: &[&str]) -> Option<Value>;

    /// Store a value at `path`.
    fn set(&self, path: &[&str], value: Value);

    /// Deep-merge a partial settings tree into the stored values.
    fn merge(&self, data: &Value);

    /// Persist the stored values. Stores without a backing file do nothing.
    fn save(&self) -> Result<(), SettingsError> {
        Ok(())
    }
}

/// Typed accessors with the host's lenient coercions.
pub trait SettingsExt: SettingsStore {
    /// String value; numbers and booleans are stringified.
    fn get_str(&self, path: &[&str]) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean value; "true", "yes", "y", "1" and "on" count as true.
    fn get_bool(&self, path: &[&str]) -> bool {
        match self.get(path) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "y" | "1" | "on"
            ),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        }
    }

    /// Integer value; floats truncate and numeric strings parse.
    fn get_int(&self, path: &[&str]) -> Option<i64> {
        match self.get(path)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float value; numeric strings parse.
    fn get_float(&self, path: &[&str]) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl<T: SettingsStore + ?Sized> SettingsExt for T {}

/// Settings tree optionally backed by a YAML file.
pub struct YamlSettings {
    path: Option<PathBuf>,
    values: Mutex<Value>,
    defaults: Value,
}

impl YamlSettings {
    /// Empty in-memory settings (defaults only).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Value::Object(Default::default())),
            defaults: defaults(),
        }
    }

    /// Parse settings from a YAML string and migrate them.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let values: Value = if yaml.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_yaml::from_str(yaml)?
        };
        if !values.is_object() {
            return Err(SettingsError::NotAMapping);
        }

        let current = values
            .get(VERSION_KEY)
            .and_then(Value::as_u64)
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX));
        migrate(current, SETTINGS_VERSION)?;

        Ok(Self {
            path: None,
            values: Mutex::new(values),
            defaults: defaults(),
        })
    }

    /// Load and migrate settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_yaml(&content)?;
        settings.path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Stored values as YAML, version key included.
    pub fn to_yaml(&self) -> Result<String, SettingsError> {
        let mut values = self.values.lock().clone();
        if let Value::Object(map) = &mut values {
            map.insert(VERSION_KEY.to_string(), json!(SETTINGS_VERSION));
        }
        Ok(serde_yaml::to_string(&values)?)
    }

    /// The default settings file, ready to be edited.
    pub fn default_yaml() -> Result<String, SettingsError> {
        let mut values = defaults();
        if let Value::Object(map) = &mut values {
            map.insert(VERSION_KEY.to_string(), json!(SETTINGS_VERSION));
        }
        Ok(serde_yaml::to_string(&values)?)
    }
}

impl SettingsStore for YamlSettings {
    fn get(&self, path: &[&str]) -> Option<Value> {
        let values = self.values.lock();
        lookup(&values, path)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| lookup(&self.defaults, path).filter(|v| !v.is_null()).cloned())
    }

    fn set(&self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut values = self.values.lock();
        let mut node = &mut *values;
        for key in parents {
            if !node.get(*key).is_some_and(Value::is_object) {
                node[*key] = Value::Object(Default::default());
            }
            node = &mut node[*key];
        }
        node[*last] = value;
    }

    fn merge(&self, data: &Value) {
        merge_into(&mut self.values.lock(), data);
    }

    /// Write the stored values (with the current version) back to the file.
    fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(*key))
}

fn merge_into(target: &mut Value, data: &Value) {
    match (target, data) {
        (Value::Object(target), Value::Object(data)) => {
            for (key, value) in data {
                merge_into(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, data) => *target = data.clone(),
    }
}
