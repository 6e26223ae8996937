//! epscrape: CLI scraper that composes per-episode metadata from several sources (wiki episode
//! tables, TheTVDB, HTML pages, constant overrides) and writes XML records plus thumbnails.

pub mod cli;
pub mod config;
pub mod factory;
pub mod model;
pub mod output;
pub mod plugins;
pub mod registry;
pub mod runner;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use config::{ConfigDocument, ScraperConfig};
pub use factory::{ConfigSection, FactoryMap, ScraperEntry, ScraperFactory, SimpleScraperFactory};
pub use model::{Episode, EpisodeField, FieldValue};
pub use output::OutputError;
pub use registry::{Registry, RegistryBuilder};
pub use runner::{Pipeline, RunOutput, Runner, RunnerError};
pub use scraper::{PoliteClient, PoliteClientBuilder, Scraper, ScraperError};
