//! Runner: an ordered scraper pipeline bound to one series and season.
//!
//! `run` resolves every scraper name and builds every scraper before any of them touches the
//! episode, then drives them in declared order over one fresh [Episode]. Later scrapers
//! overwrite fields set by earlier ones.

use crate::config::{ConfigDocument, ScraperConfig};
use crate::factory::FactoryMap;
use crate::model::Episode;
use crate::scraper::{Scraper, ScraperError};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

/// Runner failures. Each aborts the run for the episode.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("'{name}' is not a recognizable scraper name (runner '{runner}')")]
    UnrecognizedScraper { runner: String, name: String },

    #[error("Cannot build scraper '{name}': {source}")]
    Construct {
        name: String,
        #[source]
        source: ScraperError,
    },

    #[error("Scraper '{name}' failed on episode {episode_num}: {source}")]
    Scraper {
        name: String,
        episode_num: u32,
        #[source]
        source: ScraperError,
    },
}

/// Where a runner's scraper names come from.
#[derive(Clone)]
pub enum Pipeline {
    Static(Vec<String>),
    /// Computed on first use, then reused for every run.
    Computed(fn() -> Vec<String>),
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Static(names) => f.debug_tuple("Static").field(names).finish(),
            Pipeline::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Pipeline {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Pipeline::Static(iter.into_iter().map(Into::into).collect())
    }
}

/// Result of one run: the finished record and thumbnail locators in pipeline order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub episode: Episode,
    pub thumbnails: Vec<String>,
}

pub struct Runner {
    name: String,
    series: String,
    season: u32,
    pipeline: Pipeline,
    names: OnceLock<Vec<String>>,
    factories: Arc<FactoryMap>,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.name)
            .field("series", &self.series)
            .field("season", &self.season)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// A runner with no factories; every name fails to resolve until [set_factories] is called.
    ///
    /// [set_factories]: Runner::set_factories
    pub fn new(
        name: impl Into<String>,
        series: impl Into<String>,
        season: u32,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            name: name.into(),
            series: series.into(),
            season,
            pipeline,
            names: OnceLock::new(),
            factories: Arc::new(FactoryMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn season(&self) -> u32 {
        self.season
    }

    pub fn set_factories(&mut self, factories: Arc<FactoryMap>) {
        self.factories = factories;
    }

    /// Pipeline names, computed once per runner.
    pub fn scraper_names(&self) -> &[String] {
        self.names.get_or_init(|| match &self.pipeline {
            Pipeline::Static(names) => names.clone(),
            Pipeline::Computed(compute) => compute(),
        })
    }

    /// Build every scraper in the pipeline. Nothing runs until all names resolve and build.
    fn build_scrapers(
        &self,
        config: &ConfigDocument,
    ) -> Result<Vec<(String, Box<dyn Scraper>)>, RunnerError> {
        let names = self.scraper_names();
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let Some(factory) = self.factories.get(name) else {
                error!(runner = %self.name, scraper = %name, "unrecognizable scraper name");
                return Err(RunnerError::UnrecognizedScraper {
                    runner: self.name.clone(),
                    name: name.clone(),
                });
            };
            resolved.push((name, factory));
        }

        let mut scrapers = Vec::with_capacity(resolved.len());
        for (name, factory) in resolved {
            let section = match factory.config_section(name) {
                Some(key) => config.section(&key).map_err(|reason| RunnerError::Construct {
                    name: name.clone(),
                    source: ScraperError::InvalidConfig(reason),
                })?,
                None => ScraperConfig::new(),
            };
            debug!(scraper = %name, factory = factory.name(), "building scraper");
            let scraper =
                factory
                    .create_scraper(name, &section)
                    .map_err(|source| RunnerError::Construct {
                        name: name.clone(),
                        source,
                    })?;
            scrapers.push((name.clone(), scraper));
        }
        Ok(scrapers)
    }

    /// Scrape one episode through the whole pipeline.
    pub fn run(&self, episode_num: u32, config: &ConfigDocument) -> Result<RunOutput, RunnerError> {
        let mut scrapers = self.build_scrapers(config)?;
        if scrapers.is_empty() {
            warn!(runner = %self.name, "no scrapers are set; episode will be empty");
        }

        let mut episode = Episode::new(episode_num);
        let mut thumbnails = Vec::new();
        for (name, scraper) in &mut scrapers {
            let _span = info_span!("scraper", name = %name).entered();
            let failed = |source: ScraperError| RunnerError::Scraper {
                name: name.clone(),
                episode_num,
                source,
            };
            scraper
                .process_episode(&mut episode, episode_num)
                .map_err(failed)?;
            if let Some(thumbnail) = scraper.get_thumbnail(episode_num).map_err(failed)? {
                debug!(thumbnail = %thumbnail, "thumbnail found");
                thumbnails.push(thumbnail);
            }
        }
        info!(
            runner = %self.name,
            episode = episode_num,
            thumbnails = thumbnails.len(),
            "episode scraped"
        );
        Ok(RunOutput {
            episode,
            thumbnails,
        })
    }
}
