use indexmap::IndexMap;
use std::fmt;
use std::path::Path;

use crate::error::{PortError, Result};

/// Map node of a [`ConfigValue`]; keys keep the order they were read in.
pub type ConfigMap = IndexMap<String, ConfigValue>;

/// In-memory configuration tree shared by the sanitizer, path adapter and merger.
///
/// Every stage takes a tree by reference and returns a new one, so no two
/// stages ever hold the same mutable value. Map equality ignores key order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// JSON integers above `i64::MAX`
    Unsigned(u64),
    Float(f64),
    String(String),
    /// TOML offset/local date-times, kept verbatim
    Datetime(toml::value::Datetime),
    Sequence(Vec<ConfigValue>),
    Map(ConfigMap),
}

impl ConfigValue {
    pub fn map() -> Self {
        ConfigValue::Map(ConfigMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ConfigMap> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a direct child of a map.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Follow a dot-separated path through nested maps; numeric segments
    /// index into sequences.
    pub fn pointer(&self, path: &str) -> Option<&ConfigValue> {
        path.split('.').try_fold(self, |node, segment| match node {
            ConfigValue::Sequence(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => node.get(segment),
        })
    }

    /// Render a scalar for conflict reports and logs.
    pub fn summary(&self) -> String {
        match self {
            ConfigValue::Null => "null".to_string(),
            ConfigValue::Bool(value) => value.to_string(),
            ConfigValue::Integer(value) => value.to_string(),
            ConfigValue::Unsigned(value) => value.to_string(),
            ConfigValue::Float(value) => value.to_string(),
            ConfigValue::String(value) => value.clone(),
            ConfigValue::Datetime(value) => value.to_string(),
            other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(value) => ConfigValue::Bool(value),
            serde_json::Value::Number(number) => match (number.as_i64(), number.as_u64()) {
                (Some(int), _) => ConfigValue::Integer(int),
                (None, Some(unsigned)) => ConfigValue::Unsigned(unsigned),
                (None, None) => ConfigValue::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => ConfigValue::String(value),
            serde_json::Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => ConfigValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Null => serde_json::Value::Null,
            ConfigValue::Bool(value) => serde_json::Value::Bool(*value),
            ConfigValue::Integer(value) => serde_json::Value::from(*value),
            ConfigValue::Unsigned(value) => serde_json::Value::from(*value),
            ConfigValue::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConfigValue::String(value) => serde_json::Value::String(value.clone()),
            ConfigValue::Datetime(value) => serde_json::Value::String(value.to_string()),
            ConfigValue::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            ConfigValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::String(value) => ConfigValue::String(value),
            toml::Value::Integer(value) => ConfigValue::Integer(value),
            toml::Value::Float(value) => ConfigValue::Float(value),
            toml::Value::Boolean(value) => ConfigValue::Bool(value),
            toml::Value::Datetime(value) => ConfigValue::Datetime(value),
            toml::Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(Self::from_toml).collect())
            }
            toml::Value::Table(table) => ConfigValue::Map(
                table
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_toml(value)))
                    .collect(),
            ),
        }
    }

    /// TOML has no null; null map entries and sequence items are dropped.
    /// Integers beyond `i64::MAX` have no TOML form and are written as floats.
    pub fn to_toml(&self) -> Option<toml::Value> {
        match self {
            ConfigValue::Null => None,
            ConfigValue::Bool(value) => Some(toml::Value::Boolean(*value)),
            ConfigValue::Integer(value) => Some(toml::Value::Integer(*value)),
            ConfigValue::Unsigned(value) => Some(toml::Value::Float(*value as f64)),
            ConfigValue::Float(value) => Some(toml::Value::Float(*value)),
            ConfigValue::String(value) => Some(toml::Value::String(value.clone())),
            ConfigValue::Datetime(value) => Some(toml::Value::Datetime(*value)),
            ConfigValue::Sequence(items) => Some(toml::Value::Array(
                items.iter().filter_map(Self::to_toml).collect(),
            )),
            ConfigValue::Map(map) => {
                let mut table = toml::Table::new();
                for (key, value) in map {
                    if let Some(value) = value.to_toml() {
                        table.insert(key.clone(), value);
                    }
                }
                Some(toml::Value::Table(table))
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl serde::Serialize for ConfigValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Structured formats the engine can parse, sanitize, adapt and merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn for_path(path: &str) -> Option<Self> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("json") => Some(DocumentFormat::Json),
            Some("toml") => Some(DocumentFormat::Toml),
            _ => None,
        }
    }

    pub fn parse(self, contents: &str) -> Result<ConfigValue> {
        match self {
            DocumentFormat::Json => {
                if contents.trim().is_empty() {
                    return Ok(ConfigValue::map());
                }
                let value: serde_json::Value = serde_json::from_str(contents)?;
                Ok(ConfigValue::from_json(value))
            }
            DocumentFormat::Toml => {
                let table: toml::Table = toml::from_str(contents)?;
                Ok(ConfigValue::from_toml(toml::Value::Table(table)))
            }
        }
    }

    pub fn render(self, value: &ConfigValue) -> Result<String> {
        match self {
            DocumentFormat::Json => {
                let mut rendered = serde_json::to_string_pretty(&value.to_json())?;
                rendered.push('\n');
                Ok(rendered)
            }
            DocumentFormat::Toml => match value.to_toml() {
                Some(toml::Value::Table(table)) => Ok(toml::to_string_pretty(&table)?),
                _ => Err(PortError::Parse(
                    "TOML documents must have a table at the top level".to_string(),
                )),
            },
        }
    }
}
