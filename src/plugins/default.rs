//! Generic scrapers, configured entirely from their config sections.
//!
//! | name       | section    | scraper            |
//! |------------|------------|--------------------|
//! | `constant` | `constant` | [ConstantScraper]  |
//! | `wiki`     | `wiki`     | [TableScraper]     |
//! | `tvdb`     | `tvdb`     | [TvdbScraper]      |
//! | `html`     | `html`     | [HtmlScraper] over [SelectorSource](crate::scraper::html::SelectorSource) |

use crate::factory::{ConfigSection, ScraperEntry, SimpleScraperFactory};
use crate::registry::RegistryBuilder;
use crate::scraper::constant::ConstantScraper;
use crate::scraper::html::HtmlScraper;
use crate::scraper::table::TableScraper;
use crate::scraper::tvdb::TvdbScraper;
use std::sync::Arc;

pub const NAME: &str = "default";

/// Section every TVDB scraper reads, whichever plugin registers it.
pub const TVDB_SECTION: &str = "tvdb";

pub fn factory() -> SimpleScraperFactory {
    SimpleScraperFactory::new(NAME)
        .with(
            "constant",
            ScraperEntry::new(ConfigSection::Named, ConstantScraper::from_section),
        )
        .with(
            "wiki",
            ScraperEntry::new(ConfigSection::Named, TableScraper::from_section),
        )
        .with(
            "tvdb",
            ScraperEntry::new(ConfigSection::shared(TVDB_SECTION), TvdbScraper::from_section),
        )
        .with(
            "html",
            ScraperEntry::new(ConfigSection::Named, HtmlScraper::from_section),
        )
}

pub fn register(builder: &mut RegistryBuilder) {
    builder.add_factory(NAME, Arc::new(factory()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::ScraperFactory;

    #[test]
    fn default_names_and_sections() {
        let f = factory();
        assert_eq!(f.available_scrapers(), ["constant", "html", "tvdb", "wiki"]);
        assert_eq!(f.config_section("wiki").as_deref(), Some("wiki"));
        assert_eq!(f.config_section("tvdb").as_deref(), Some(TVDB_SECTION));
    }
}
