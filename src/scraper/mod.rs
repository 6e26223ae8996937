//! Scraper capability, shared client, and the built-in data-source adapters.

mod client;
mod error;

pub mod constant;
pub mod html;
pub mod strategy;
pub mod table;
pub mod tvdb;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;
pub use strategy::{NumberStrategy, SplitStrategy};

use crate::config::ScraperConfig;
use crate::model::Episode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

/// One data source that fills in episode fields and optionally a thumbnail locator.
///
/// Implementors provide [scrape_episode](Scraper::scrape_episode) and, if the source has
/// thumbnails, [scrape_thumbnail](Scraper::scrape_thumbnail). Callers use the provided
/// [process_episode](Scraper::process_episode) and [get_thumbnail](Scraper::get_thumbnail),
/// which apply the catch policy: with `catch_errors()` set, failures are logged and dropped;
/// otherwise they propagate and abort the episode.
pub trait Scraper {
    fn catch_errors(&self) -> bool;

    /// Write this source's fields for `episode_num` into `episode`. Fields the source does not
    /// provide are left untouched.
    fn scrape_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError>;

    fn scrape_thumbnail(&mut self, _episode_num: u32) -> Result<Option<String>, ScraperError> {
        Ok(None)
    }

    /// Sets `episode.episode` then scrapes, honoring the catch policy.
    fn process_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError> {
        episode.episode = episode_num;
        match self.scrape_episode(episode, episode_num) {
            Err(e) if self.catch_errors() => {
                warn!(episode = episode_num, error = %e, "scraper failed, skipping its fields");
                Ok(())
            }
            other => other,
        }
    }

    /// Thumbnail locator for `episode_num`, or None. Honors the catch policy.
    fn get_thumbnail(&mut self, episode_num: u32) -> Result<Option<String>, ScraperError> {
        match self.scrape_thumbnail(episode_num) {
            Err(e) if self.catch_errors() => {
                warn!(episode = episode_num, error = %e, "thumbnail lookup failed, skipping");
                Ok(None)
            }
            other => other,
        }
    }
}

/// Per-scraper HTTP settings, read from the `http` table of a scraper's config section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub user_agent: Option<String>,
    pub delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub retry_count: Option<u32>,
}

impl HttpOptions {
    /// Build this scraper's own client.
    pub fn client(&self) -> Result<PoliteClient, ScraperError> {
        let mut builder = PoliteClient::builder();
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(delay) = self.delay_secs {
            builder = builder.delay_secs(delay);
        }
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout_secs(timeout);
        }
        if let Some(n) = self.retry_count {
            builder = builder.retry_count(n);
        }
        builder
            .build()
            .map_err(|e| ScraperError::InvalidConfig(format!("cannot build HTTP client: {}", e)))
    }
}

/// Deserialize a typed config from one config section.
pub fn decode_config<T: DeserializeOwned>(config: &ScraperConfig) -> Result<T, ScraperError> {
    serde_json::from_value(serde_json::Value::Object(config.clone()))
        .map_err(|source| ScraperError::ConfigDecode { source })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::EpisodeField;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut inner) = self.0.lock() {
                inner.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a thread-local subscriber and return its result plus everything logged.
    pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = buffer
            .0
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();
        (result, logs)
    }

    /// Sets the title, then fails if asked to.
    pub(crate) struct Flaky {
        pub title: &'static str,
        pub fail: bool,
        pub catch: bool,
    }

    impl Scraper for Flaky {
        fn catch_errors(&self) -> bool {
            self.catch
        }

        fn scrape_episode(
            &mut self,
            episode: &mut Episode,
            episode_num: u32,
        ) -> Result<(), ScraperError> {
            episode.set(EpisodeField::Title, self.title.into())?;
            if self.fail {
                return Err(ScraperError::Parse {
                    episode_num,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }

        fn scrape_thumbnail(&mut self, episode_num: u32) -> Result<Option<String>, ScraperError> {
            if self.fail {
                return Err(ScraperError::Parse {
                    episode_num,
                    message: "no thumb".to_string(),
                });
            }
            Ok(Some(format!("https://img.example/{}.jpg", episode_num)))
        }
    }

    #[test]
    fn process_episode_always_sets_number() -> Result<(), ScraperError> {
        let mut s = Flaky {
            title: "T",
            fail: false,
            catch: false,
        };
        let mut ep = Episode::default();
        s.process_episode(&mut ep, 9)?;
        assert_eq!(ep.episode, 9);
        assert_eq!(ep.title.as_deref(), Some("T"));
        Ok(())
    }

    #[test]
    fn caught_failure_is_swallowed() -> Result<(), ScraperError> {
        let mut s = Flaky {
            title: "T",
            fail: true,
            catch: true,
        };
        let mut ep = Episode::default();
        s.process_episode(&mut ep, 4)?;
        assert_eq!(ep.episode, 4);
        assert_eq!(s.get_thumbnail(4)?, None);
        Ok(())
    }

    #[test]
    fn uncaught_failure_propagates_but_number_is_set() {
        let mut s = Flaky {
            title: "T",
            fail: true,
            catch: false,
        };
        let mut ep = Episode::default();
        assert!(s.process_episode(&mut ep, 4).is_err());
        assert_eq!(ep.episode, 4);
        assert!(s.get_thumbnail(4).is_err());
    }

    #[test]
    fn http_options_decode_from_section() -> Result<(), ScraperError> {
        #[derive(Deserialize)]
        struct Section {
            #[serde(default)]
            http: HttpOptions,
        }
        let config: ScraperConfig = serde_json::from_str(
            r#"{"http": {"user_agent": "UA/1", "delay_secs": 0}}"#,
        )
        .map_err(|source| ScraperError::ConfigDecode { source })?;
        let section: Section = decode_config(&config)?;
        assert_eq!(section.http.user_agent.as_deref(), Some("UA/1"));
        assert_eq!(section.http.delay_secs, Some(0));
        section.http.client()?;
        Ok(())
    }
}
