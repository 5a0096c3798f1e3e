//! Typed reads over a filter's untyped JSON settings.
//!
//! Reading never fails: a missing key silently takes the filter's default, a value of
//! the wrong shape takes the default and records a [`SettingWarning`].
use std::fmt;

use serde_json::{Map, Value};

use crate::config::models::FilterSpec;

/// A malformed or missing setting that was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingWarning {
    pub filter: String,
    pub key: String,
    pub message: String,
}

impl fmt::Display for SettingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter '{}' setting '{}': {}", self.filter, self.key, self.message)
    }
}

pub struct SettingsReader<'a> {
    filter: &'a str,
    settings: &'a Map<String, Value>,
    warnings: Vec<SettingWarning>,
}

impl<'a> SettingsReader<'a> {
    pub fn new(spec: &'a FilterSpec) -> Self {
        Self {
            filter: &spec.name,
            settings: &spec.settings,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, key: &str, message: impl Into<String>) {
        self.warnings.push(SettingWarning {
            filter: self.filter.to_string(),
            key: key.to_string(),
            message: message.into(),
        });
    }

    pub fn finish(self) -> Vec<SettingWarning> {
        self.warnings
    }

    pub fn string_or(&mut self, key: &str, default: &str) -> String {
        match self.settings.get(key) {
            None => default.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                self.warn(key, format!("expected a string, got {other}; using '{default}'"));
                default.to_string()
            }
        }
    }

    /// A string the filter cannot meaningfully default; absence is reported.
    pub fn required_string(&mut self, key: &str) -> String {
        match self.settings.get(key) {
            Some(Value::String(s)) => s.clone(),
            None => {
                self.warn(key, "missing; using an empty string");
                String::new()
            }
            Some(other) => {
                self.warn(key, format!("expected a string, got {other}; using an empty string"));
                String::new()
            }
        }
    }

    /// Non-negative integer; integral floats such as `10.0` are accepted.
    pub fn u64_or(&mut self, key: &str, default: u64) -> u64 {
        match self.settings.get(key) {
            None => default,
            Some(value) => match as_u64(value) {
                Some(n) => n,
                None => {
                    self.warn(
                        key,
                        format!("expected a non-negative integer, got {value}; using {default}"),
                    );
                    default
                }
            },
        }
    }

    /// Like [`Self::u64_or`], reading the first key present among `keys`.
    pub fn u64_any_or(&mut self, keys: &[&str], default: u64) -> u64 {
        match keys.iter().find(|k| self.settings.contains_key(**k)) {
            Some(key) => self.u64_or(key, default),
            None => default,
        }
    }

    pub fn bool_or(&mut self, key: &str, default: bool) -> bool {
        match self.settings.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                self.warn(key, format!("expected a boolean, got {other}; using {default}"));
                default
            }
        }
    }

    /// A list of strings; non-string items are skipped with a warning.
    pub fn string_list(&mut self, key: &str) -> Vec<String> {
        match self.settings.get(key) {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => self.warn(key, format!("skipping non-string item {other}")),
                    }
                }
                out
            }
            Some(other) => {
                self.warn(key, format!("expected a list, got {other}; using an empty list"));
                Vec::new()
            }
        }
    }

    /// A string-to-string map. Scalar values are stringified and `null` becomes "".
    pub fn string_map(&mut self, key: &str) -> Vec<(String, String)> {
        match self.settings.get(key) {
            None => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), stringify(v)))
                .collect(),
            Some(other) => {
                self.warn(key, format!("expected a map, got {other}; using an empty map"));
                Vec::new()
            }
        }
    }

    /// Names given either as a list or as the keys of a map.
    pub fn name_list(&mut self, key: &str) -> Vec<String> {
        match self.settings.get(key) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => self.string_list(key),
        }
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
