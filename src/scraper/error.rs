//! Shared error type for scrapers: construction, HTTP, parsing, and lookups.

use crate::model::{EpisodeField, FieldError};
use thiserror::Error;

/// Shared scraper error. Whether it aborts the episode depends on the scraper's catch flag.
#[derive(Debug, Error)]
pub enum ScraperError {
    // Configuration
    #[error("Invalid scraper config: {0}")]
    InvalidConfig(String),

    #[error("Invalid scraper config: {source}")]
    ConfigDecode {
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported scraper name '{name}'")]
    UnsupportedScraper { name: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Headless browser unavailable: {reason}")]
    Browser { reason: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "wiki page", "episode 5") for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    // Tables
    #[error("There are only {count} table(s); table {index} does not exist.")]
    TableNotFound { index: usize, count: usize },

    #[error("Row {row} is outside the table ({rows} rows).")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("Column {column} for '{field}' is outside row {row} ({columns} columns).")]
    ColumnOutOfRange {
        field: EpisodeField,
        column: usize,
        row: usize,
        columns: usize,
    },

    // Episode data
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("Episode number {episode_num} cannot be mapped: {reason}")]
    Numbering { episode_num: u32, reason: String },

    #[error("No remote episode for season {season} episode {episode}.")]
    EpisodeNotFound { season: u32, episode: u32 },

    #[error("Could not parse page for episode {episode_num}: {message}")]
    Parse { episode_num: u32, message: String },
}
