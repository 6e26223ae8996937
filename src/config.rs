//! Config loading.
//!
//! Two files are involved: the optional app config (`./epscrape.toml`, then
//! `$XDG_CONFIG_HOME/epscrape/config.toml`) and the scrapers config document, whose top-level
//! keys are configuration-section names handed to individual scrapers.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Default scrapers config document path when neither CLI nor app config names one.
pub const DEFAULT_SCRAPERS_CONFIG: &str = "scrapers.json";

/// Parameters for one scraper, taken from one section of the config document.
pub type ScraperConfig = Map<String, Value>;

/// App config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Scrapers config document (JSON or TOML) when -p is not set.
    pub scrapers_config: Option<PathBuf>,
    /// HTTP User-Agent header for thumbnail downloads.
    pub user_agent: Option<String>,
    /// Delay in seconds between thumbnail requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for thumbnail downloads.
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
}

/// Load the app config. An explicit path must exist; otherwise search order is
/// (1) ./epscrape.toml, (2) $XDG_CONFIG_HOME/epscrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<Config>, String> {
    if let Some(path) = explicit {
        return read_config(path).map(Some);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("epscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("epscrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return read_config(path).map(Some);
        }
    }
    Ok(None)
}

fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

/// The scrapers config document: configuration-section name to scraper parameters.
///
/// Shape of each section is scraper-specific; this type only guarantees sections are tables.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    sections: Map<String, Value>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. The root must be an object.
    pub fn from_json_str(s: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| format!("Invalid JSON: {}", e))?;
        Self::from_value(value)
    }

    /// Parse a TOML document into the same shape as the JSON form. Native TOML dates and
    /// times become strings in their TOML spelling.
    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        let table: toml::Table = s.parse().map_err(|e| format!("Invalid TOML: {}", e))?;
        Self::from_value(toml_to_json(toml::Value::Table(table))?)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(sections) => Ok(Self { sections }),
            other => Err(format!(
                "Scrapers config root must be a table of sections, got {}",
                json_kind(&other)
            )),
        }
    }

    /// Read a document from disk; `.json` files are JSON, anything else is TOML.
    pub fn load(path: &Path) -> Result<Self, String> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read scrapers config {}: {}", path.display(), e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let parsed = if is_json {
            Self::from_json_str(&s)
        } else {
            Self::from_toml_str(&s)
        };
        parsed.map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Add or replace one section.
    pub fn insert(&mut self, key: impl Into<String>, section: ScraperConfig) {
        self.sections.insert(key.into(), Value::Object(section));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sections.contains_key(key)
    }

    /// The named section, or an empty table if absent. A present section that is not a table
    /// is an error.
    pub fn section(&self, key: &str) -> Result<ScraperConfig, String> {
        match self.sections.get(key) {
            None => Ok(ScraperConfig::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(format!(
                "config section '{}' must be a table, got {}",
                key,
                json_kind(other)
            )),
        }
    }
}

fn toml_to_json(value: toml::Value) -> Result<Value, String> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("Unsupported float {} in config", f))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(toml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| Ok((k, toml_to_json(v)?)))
                .collect::<Result<_, String>>()?,
        ),
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}
