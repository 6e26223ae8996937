//! Constant scraper: literal values, globally or per episode, used to patch other sources.

use super::{decode_config, Scraper, ScraperError};
use crate::config::ScraperConfig;
use crate::model::{Episode, EpisodeField, FieldValue};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Literal values by field.
pub type FieldValues = BTreeMap<EpisodeField, FieldValue>;

/// Config for [ConstantScraper] (section `constant` for the default factory).
///
/// ```toml
/// [constant.global]
/// directors = ["Someone"]
///
/// [constant.episodes.3]
/// title = "Corrected title"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConstantConfig {
    pub global: FieldValues,
    pub episodes: BTreeMap<u32, FieldValues>,
    pub catch: bool,
}

impl ConstantConfig {
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        decode_config(config)
    }

    /// Global value used unless the section sets the same field.
    pub fn with_global(mut self, field: EpisodeField, value: impl Into<FieldValue>) -> Self {
        self.global.entry(field).or_insert_with(|| value.into());
        self
    }

    /// Per-episode value used unless the section sets the same field for that episode.
    pub fn with_episode(
        mut self,
        episode_num: u32,
        field: EpisodeField,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.episodes
            .entry(episode_num)
            .or_default()
            .entry(field)
            .or_insert_with(|| value.into());
        self
    }
}

/// For each field: the per-episode value if present, else the global one, else untouched.
#[derive(Debug, Clone)]
pub struct ConstantScraper {
    global: FieldValues,
    episodes: BTreeMap<u32, FieldValues>,
    catch: bool,
}

impl ConstantScraper {
    pub fn new(config: ConstantConfig) -> Self {
        Self {
            global: config.global,
            episodes: config.episodes,
            catch: config.catch,
        }
    }

    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        ConstantConfig::from_section(config).map(Self::new)
    }

    fn value_for(&self, episode_num: u32, field: EpisodeField) -> Option<&FieldValue> {
        self.episodes
            .get(&episode_num)
            .and_then(|values| values.get(&field))
            .or_else(|| self.global.get(&field))
    }
}

impl Scraper for ConstantScraper {
    fn catch_errors(&self) -> bool {
        self.catch
    }

    fn scrape_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError> {
        for field in EpisodeField::ALL {
            if let Some(value) = self.value_for(episode_num, field) {
                episode.set(field, value.clone())?;
            }
        }
        Ok(())
    }
}
