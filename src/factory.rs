//! Scraper factories: named constructors plus the config section each name reads.

use crate::config::ScraperConfig;
use crate::scraper::{Scraper, ScraperError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scraper name to the factory that builds it, shared by every runner.
pub type FactoryMap = BTreeMap<String, Arc<dyn ScraperFactory>>;

/// Boxed constructor: config section in, ready scraper out.
pub type Constructor =
    dyn Fn(&ScraperConfig) -> Result<Box<dyn Scraper>, ScraperError> + Send + Sync;

/// Which section of the config document a scraper name reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSection {
    /// The section named like the scraper itself.
    Named,
    /// A section several names share, e.g. credentials for one remote API.
    Shared(String),
    /// No section; the scraper is built from an empty config.
    None,
}

impl ConfigSection {
    pub fn shared(key: impl Into<String>) -> Self {
        ConfigSection::Shared(key.into())
    }

    fn key(&self, name: &str) -> Option<String> {
        match self {
            ConfigSection::Named => Some(name.to_string()),
            ConfigSection::Shared(key) => Some(key.clone()),
            ConfigSection::None => None,
        }
    }
}

/// Builds scrapers by name.
pub trait ScraperFactory: Send + Sync {
    /// Identifies the factory in logs and collision reports.
    fn name(&self) -> &str;

    fn available_scrapers(&self) -> Vec<String>;

    /// Build `name` from its config section. Names this factory does not advertise fail with
    /// [ScraperError::UnsupportedScraper].
    fn create_scraper(
        &self,
        name: &str,
        config: &ScraperConfig,
    ) -> Result<Box<dyn Scraper>, ScraperError>;

    /// Config section key for `name`, or None if it needs none.
    fn config_section(&self, name: &str) -> Option<String>;
}

/// One registered scraper name.
pub struct ScraperEntry {
    section: ConfigSection,
    constructor: Box<Constructor>,
}

impl ScraperEntry {
    pub fn new<F, S>(section: ConfigSection, build: F) -> Self
    where
        F: Fn(&ScraperConfig) -> Result<S, ScraperError> + Send + Sync + 'static,
        S: Scraper + 'static,
    {
        Self {
            section,
            constructor: Box::new(move |config: &ScraperConfig| {
                build(config).map(|s| Box::new(s) as Box<dyn Scraper>)
            }),
        }
    }

    pub fn section(&self) -> &ConfigSection {
        &self.section
    }
}

impl fmt::Debug for ScraperEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperEntry")
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

/// Factory over a fixed name-to-constructor table.
#[derive(Debug)]
pub struct SimpleScraperFactory {
    name: String,
    entries: BTreeMap<String, ScraperEntry>,
}

impl SimpleScraperFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add a scraper name. A repeated name replaces the earlier entry.
    pub fn with(mut self, name: impl Into<String>, entry: ScraperEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }
}

impl ScraperFactory for SimpleScraperFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn available_scrapers(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn create_scraper(
        &self,
        name: &str,
        config: &ScraperConfig,
    ) -> Result<Box<dyn Scraper>, ScraperError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ScraperError::UnsupportedScraper {
                name: name.to_string(),
            })?;
        (entry.constructor)(config)
    }

    fn config_section(&self, name: &str) -> Option<String> {
        self.entries.get(name).and_then(|e| e.section.key(name))
    }
}
