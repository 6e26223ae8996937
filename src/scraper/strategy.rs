//! Numbering and splitting strategies selected by configuration.
//!
//! Row indices, remote season/episode numbers, and name lists are derived from the episode
//! number or a cell's text through one of these closed sets. Plugin code may supply a plain
//! function through the `Custom` variants; configuration can only pick the named ones.

use super::ScraperError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Maps a local episode number to another number (row index, remote season or episode).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberStrategy {
    /// The episode number itself.
    #[default]
    Identity,
    /// Always the same number, e.g. season 1.
    Fixed(u32),
    /// Episode number plus a signed offset; results below zero are errors.
    Offset(i64),
    /// Explicit table; numbers missing from it map to themselves.
    Lookup(BTreeMap<u32, u32>),
    /// Plugin-supplied mapping, for numbering no named strategy covers.
    #[serde(skip)]
    Custom(fn(u32) -> u32),
}

impl NumberStrategy {
    pub fn apply(&self, episode_num: u32) -> Result<u32, ScraperError> {
        match self {
            NumberStrategy::Identity => Ok(episode_num),
            NumberStrategy::Fixed(n) => Ok(*n),
            NumberStrategy::Offset(k) => {
                let shifted = i64::from(episode_num) + k;
                u32::try_from(shifted).map_err(|_| ScraperError::Numbering {
                    episode_num,
                    reason: format!("offset {} gives {}", k, shifted),
                })
            }
            NumberStrategy::Lookup(table) => {
                Ok(table.get(&episode_num).copied().unwrap_or(episode_num))
            }
            NumberStrategy::Custom(f) => Ok(f(episode_num)),
        }
    }
}

/// Splits one text cell into an ordered list of names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Split on any run of whitespace.
    #[default]
    Whitespace,
    /// Split on a literal delimiter; pieces are trimmed and empty ones dropped.
    Delimiter(String),
    /// One name per line.
    Lines,
    #[serde(skip)]
    Custom(fn(&str) -> Vec<String>),
}

impl SplitStrategy {
    pub fn split(&self, text: &str) -> Vec<String> {
        match self {
            SplitStrategy::Whitespace => text.split_whitespace().map(String::from).collect(),
            SplitStrategy::Delimiter(d) => non_empty_trimmed(text.split(d.as_str())),
            SplitStrategy::Lines => non_empty_trimmed(text.lines()),
            SplitStrategy::Custom(f) => f(text),
        }
    }
}

fn non_empty_trimmed<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
