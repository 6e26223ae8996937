//! 11eyes (2009, season 1): TVDB for titles and air dates, the Japanese Wikipedia episode
//! table for writers, a constant director, and episode titles from the official story pages.

use super::default::TVDB_SECTION;
use crate::config::ScraperConfig;
use crate::factory::{ConfigSection, ScraperEntry, SimpleScraperFactory};
use crate::model::{Episode, EpisodeField};
use crate::registry::RegistryBuilder;
use crate::runner::Runner;
use crate::scraper::constant::{ConstantConfig, ConstantScraper};
use crate::scraper::html::{fetcher_for, HtmlConfig, HtmlScraper, HtmlSource};
use crate::scraper::table::{parse_selector, TableConfig, TableScraper};
use crate::scraper::tvdb::{TvdbConfig, TvdbScraper};
use crate::scraper::ScraperError;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;

pub const NAME: &str = "11eyes";

const TVDB_ID: &str = "117851";
const WIKI_URL: &str = "https://ja.wikipedia.org/wiki/11eyes_-罪と罰と贖いの少女-";
const WRITERS_COLUMN: usize = 2;
const DIRECTOR: &str = "下田正美";

const PIPELINE: [&str; 4] = ["11eyes.tvdb", "11eyes.wiki", "11eyes.constant", "11eyes.html"];

/// Official story pages: `storyNN.html`, title in the heading as `第N話「...」`.
#[derive(Debug, Clone)]
pub struct StoryPageSource {
    heading: Selector,
    title: Regex,
}

impl StoryPageSource {
    pub fn new() -> Result<Self, ScraperError> {
        let pattern = ".*「(.*)」";
        Ok(Self {
            heading: parse_selector("div.storyInner h2")?,
            title: Regex::new(pattern).map_err(|source| ScraperError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?,
        })
    }
}

impl HtmlSource for StoryPageSource {
    fn url(&self, episode_num: u32) -> Result<String, ScraperError> {
        Ok(format!("http://gabdro.com/story{:02}.html", episode_num))
    }

    fn parse_episode(
        &self,
        episode: &mut Episode,
        episode_num: u32,
        doc: &Html,
    ) -> Result<(), ScraperError> {
        let heading = doc
            .select(&self.heading)
            .next()
            .map(|h| h.text().collect::<String>())
            .ok_or_else(|| ScraperError::Parse {
                episode_num,
                message: "story page has no heading".to_string(),
            })?;
        let title = self
            .title
            .captures(&heading)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ScraperError::Parse {
                episode_num,
                message: format!("no quoted title in heading {:?}", heading.trim()),
            })?;
        episode.title = Some(title.as_str().to_string());
        Ok(())
    }
}

fn tvdb_config(config: &ScraperConfig) -> Result<TvdbConfig, ScraperError> {
    Ok(TvdbConfig::from_section(config)?.with_series_id(TVDB_ID))
}

fn tvdb(config: &ScraperConfig) -> Result<TvdbScraper, ScraperError> {
    TvdbScraper::from_config(tvdb_config(config)?)
}

fn wiki(config: &ScraperConfig) -> Result<TableScraper, ScraperError> {
    let config = TableConfig::from_section(config)?
        .with_url(WIKI_URL)
        .with_default_mapping(&[(EpisodeField::Writers, WRITERS_COLUMN)]);
    TableScraper::from_config(config)
}

fn constant(config: &ScraperConfig) -> Result<ConstantScraper, ScraperError> {
    let config = ConstantConfig::from_section(config)?
        .with_global(EpisodeField::Directors, vec![DIRECTOR.to_string()]);
    Ok(ConstantScraper::new(config))
}

/// Only `catch`, `browser` and `http` of the section apply; the page layout is fixed.
fn story_pages(config: &ScraperConfig) -> Result<HtmlScraper<StoryPageSource>, ScraperError> {
    let config = HtmlConfig::from_section(config)?;
    let fetcher = fetcher_for(config.browser, &config.http)?;
    Ok(HtmlScraper::new(StoryPageSource::new()?, fetcher, config.catch))
}

pub fn factory() -> SimpleScraperFactory {
    SimpleScraperFactory::new(NAME)
        .with(
            PIPELINE[0],
            ScraperEntry::new(ConfigSection::shared(TVDB_SECTION), tvdb),
        )
        .with(PIPELINE[1], ScraperEntry::new(ConfigSection::Named, wiki))
        .with(PIPELINE[2], ScraperEntry::new(ConfigSection::Named, constant))
        .with(PIPELINE[3], ScraperEntry::new(ConfigSection::Named, story_pages))
}

pub fn runner() -> Runner {
    Runner::new(NAME, "11eyes", 1, PIPELINE.into_iter().collect())
}

pub fn register(builder: &mut RegistryBuilder) {
    builder
        .add_factory(NAME, Arc::new(factory()))
        .add_runner(NAME, runner());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ScraperFactory;
    use crate::scraper::Scraper;

    #[test]
    fn story_page_title() -> Result<(), ScraperError> {
        let source = StoryPageSource::new()?;
        assert_eq!(source.url(3)?, "http://gabdro.com/story03.html");
        let doc = Html::parse_document(
            r#"<div class="storyInner"><h2>第3話「紅い夜の中で」</h2></div>"#,
        );
        let mut ep = Episode::new(3);
        source.parse_episode(&mut ep, 3, &doc)?;
        assert_eq!(ep.title.as_deref(), Some("紅い夜の中で"));
        Ok(())
    }

    #[test]
    fn story_page_without_heading_is_parse_error() -> Result<(), ScraperError> {
        let source = StoryPageSource::new()?;
        let doc = Html::parse_document("<div class=\"story\"></div>");
        let mut ep = Episode::new(1);
        assert!(matches!(
            source.parse_episode(&mut ep, 1, &doc),
            Err(ScraperError::Parse { episode_num: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn constant_preset_gives_director() -> Result<(), ScraperError> {
        let mut scraper = constant(&ScraperConfig::new())?;
        let mut ep = Episode::new(5);
        scraper.process_episode(&mut ep, 5)?;
        assert_eq!(ep.directors, vec![DIRECTOR]);
        Ok(())
    }

    #[test]
    fn tvdb_preset_requests_japanese_records() -> Result<(), ScraperError> {
        let config = tvdb_config(&ScraperConfig::new())?;
        assert_eq!(config.id.as_deref(), Some(TVDB_ID));
        assert_eq!(config.language, "ja");

        let mut section = ScraperConfig::new();
        section.insert("language".to_string(), "en".into());
        section.insert("id".to_string(), "1".into());
        let config = tvdb_config(&section)?;
        assert_eq!(config.language, "en");
        assert_eq!(config.id.as_deref(), Some(TVDB_ID));
        Ok(())
    }

    #[test]
    fn factory_routes_tvdb_to_shared_section() {
        let f = factory();
        assert_eq!(f.available_scrapers().len(), 4);
        assert_eq!(f.config_section("11eyes.tvdb").as_deref(), Some(TVDB_SECTION));
        assert_eq!(f.config_section("11eyes.wiki").as_deref(), Some("11eyes.wiki"));
    }

    #[test]
    fn runner_pipeline_order() {
        let r = runner();
        assert_eq!(r.series(), "11eyes");
        assert_eq!(r.season(), 1);
        assert_eq!(r.scraper_names(), PIPELINE);
    }
}
