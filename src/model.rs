//! Episode record shared by every scraper.
//!
//! Scrapers write into one [Episode] in pipeline order; the XML writer consumes it once
//! the runner is done. Fields a scraper may set by name are listed in [EpisodeField].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Date format used for `aired` in config literals and the remote API.
pub const AIRED_FORMAT: &str = "%Y-%m-%d";

/// Metadata for one episode. Only `episode` is always set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode: u32,
    pub title: Option<String>,
    pub plot: Option<String>,
    pub aired: Option<NaiveDate>,
    pub writers: Vec<String>,
    pub directors: Vec<String>,
    pub rating: Option<f64>,
    pub mpaa: Option<String>,
    /// Local file name of the downloaded thumbnail. Filled after scraping, not by scrapers.
    pub thumbnail: Option<String>,
}

/// Scraper-writable episode fields, in output order.
///
/// The episode number is absent: it keys the record and only the scraper contract writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeField {
    Title,
    Plot,
    Aired,
    Writers,
    Directors,
    Rating,
    Mpaa,
}

impl EpisodeField {
    pub const ALL: [EpisodeField; 7] = [
        EpisodeField::Title,
        EpisodeField::Plot,
        EpisodeField::Aired,
        EpisodeField::Writers,
        EpisodeField::Directors,
        EpisodeField::Rating,
        EpisodeField::Mpaa,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EpisodeField::Title => "title",
            EpisodeField::Plot => "plot",
            EpisodeField::Aired => "aired",
            EpisodeField::Writers => "writers",
            EpisodeField::Directors => "directors",
            EpisodeField::Rating => "rating",
            EpisodeField::Mpaa => "mpaa",
        }
    }

    /// True for fields holding an ordered list of names.
    pub fn is_list(self) -> bool {
        matches!(self, EpisodeField::Writers | EpisodeField::Directors)
    }
}

impl fmt::Display for EpisodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A literal value for one field, as it appears in configuration or scraped text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Number(_) => "a number",
            FieldValue::Text(_) => "text",
            FieldValue::List(_) => "a list",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// A value could not be stored in the named field.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("field '{field}' expects {expected}, got {got}")]
    WrongType {
        field: EpisodeField,
        expected: &'static str,
        got: &'static str,
    },

    #[error("field '{field}': '{value}' is not a number")]
    InvalidNumber { field: EpisodeField, value: String },

    #[error("field '{field}': '{value}' is not a date (expected YYYY-MM-DD)")]
    InvalidDate { field: EpisodeField, value: String },
}

impl Episode {
    /// Empty record for the given episode number.
    pub fn new(episode: u32) -> Self {
        Self {
            episode,
            ..Self::default()
        }
    }

    /// Store `value` in `field`, converting where the conversion is unambiguous.
    ///
    /// List fields accept a single text as a one-element list; `rating` accepts numeric text;
    /// `aired` accepts `YYYY-MM-DD` text. Anything else is a [FieldError].
    pub fn set(&mut self, field: EpisodeField, value: FieldValue) -> Result<(), FieldError> {
        match field {
            EpisodeField::Title => self.title = Some(expect_text(field, value)?),
            EpisodeField::Plot => self.plot = Some(expect_text(field, value)?),
            EpisodeField::Mpaa => self.mpaa = Some(expect_text(field, value)?),
            EpisodeField::Writers => self.writers = expect_list(field, value)?,
            EpisodeField::Directors => self.directors = expect_list(field, value)?,
            EpisodeField::Rating => {
                self.rating = Some(match value {
                    FieldValue::Number(n) => n,
                    FieldValue::Text(s) => {
                        s.trim()
                            .parse::<f64>()
                            .map_err(|_| FieldError::InvalidNumber { field, value: s })?
                    }
                    other => {
                        return Err(FieldError::WrongType {
                            field,
                            expected: "a number",
                            got: other.kind(),
                        })
                    }
                })
            }
            EpisodeField::Aired => {
                let text = expect_text(field, value)?;
                let date = NaiveDate::parse_from_str(text.trim(), AIRED_FORMAT)
                    .map_err(|_| FieldError::InvalidDate { field, value: text })?;
                self.aired = Some(date);
            }
        }
        Ok(())
    }
}

fn expect_text(field: EpisodeField, value: FieldValue) -> Result<String, FieldError> {
    match value {
        FieldValue::Text(s) => Ok(s),
        other => Err(FieldError::WrongType {
            field,
            expected: "text",
            got: other.kind(),
        }),
    }
}

fn expect_list(field: EpisodeField, value: FieldValue) -> Result<Vec<String>, FieldError> {
    match value {
        FieldValue::List(v) => Ok(v),
        FieldValue::Text(s) => Ok(vec![s]),
        other => Err(FieldError::WrongType {
            field,
            expected: "a list",
            got: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn new_sets_only_episode_number() {
        let ep = Episode::new(7);
        assert_eq!(ep.episode, 7);
        assert!(ep.title.is_none());
        assert!(ep.writers.is_empty());
        assert!(ep.rating.is_none());
    }

    #[test]
    fn set_text_list_and_rating() -> Result<(), FieldError> {
        let mut ep = Episode::new(1);
        ep.set(EpisodeField::Title, "Opening".into())?;
        ep.set(EpisodeField::Writers, vec!["A".to_string(), "B".to_string()].into())?;
        ep.set(EpisodeField::Directors, "Solo".into())?;
        ep.set(EpisodeField::Rating, " 8.5 ".into())?;
        assert_eq!(ep.title.as_deref(), Some("Opening"));
        assert_eq!(ep.writers, vec!["A", "B"]);
        assert_eq!(ep.directors, vec!["Solo"]);
        assert_eq!(ep.rating, Some(8.5));
        Ok(())
    }

    #[test]
    fn set_aired_parses_iso_date() -> Result<(), Box<dyn Error>> {
        let mut ep = Episode::new(1);
        ep.set(EpisodeField::Aired, "2009-10-09".into())?;
        assert_eq!(ep.aired, NaiveDate::from_ymd_opt(2009, 10, 9));
        Ok(())
    }

    #[test]
    fn set_rejects_mismatched_types() {
        let mut ep = Episode::new(1);
        assert!(matches!(
            ep.set(EpisodeField::Title, FieldValue::Number(1.0)),
            Err(FieldError::WrongType { .. })
        ));
        assert!(matches!(
            ep.set(EpisodeField::Rating, "high".into()),
            Err(FieldError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ep.set(EpisodeField::Aired, "9 Oct 2009".into()),
            Err(FieldError::InvalidDate { .. })
        ));
        assert!(ep.title.is_none());
    }

    #[test]
    fn field_value_deserializes_untagged() -> Result<(), serde_json::Error> {
        let v: FieldValue = serde_json::from_str("8")?;
        assert_eq!(v, FieldValue::Number(8.0));
        let v: FieldValue = serde_json::from_str("\"x\"")?;
        assert_eq!(v, FieldValue::Text("x".to_string()));
        let v: FieldValue = serde_json::from_str("[\"a\",\"b\"]")?;
        assert_eq!(v, FieldValue::List(vec!["a".to_string(), "b".to_string()]));
        Ok(())
    }

    #[test]
    fn episode_field_names_round_trip_through_serde() -> Result<(), serde_json::Error> {
        for field in EpisodeField::ALL {
            let parsed: EpisodeField = serde_json::from_str(&format!("\"{}\"", field.name()))?;
            assert_eq!(parsed, field);
        }
        Ok(())
    }
}
