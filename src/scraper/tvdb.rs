//! TheTVDB (v2 API) scraper: title, plot, air date and thumbnail for one series.
//!
//! Construction logs in and caches the series' full episode list. Each episode number is mapped
//! to a remote (season, episode) pair, looked up in that list, and its detail record fetched
//! once per scraper instance.

use super::client::read_body;
use super::{decode_config, HttpOptions, NumberStrategy, PoliteClient, Scraper, ScraperError};
use crate::config::ScraperConfig;
use crate::model::{Episode, AIRED_FORMAT};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.thetvdb.com";
const DEFAULT_BANNER_URL: &str = "https://www.thetvdb.com/banners/";
/// Original-language (Japanese) titles and plots unless a section asks otherwise.
const DEFAULT_LANGUAGE: &str = "ja";

/// Credentials exchanged for a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvdbAuth {
    pub apikey: String,
    pub userkey: String,
    pub username: String,
}

/// Fields a TVDB scraper may write. Absent allow-list means all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TvdbUsage {
    Title,
    Plot,
    Aired,
    Thumbnail,
}

/// Config for [TvdbScraper]. Every TVDB scraper name reads the shared `tvdb` section, which
/// holds the credentials; the series id is usually preset by the plugin.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TvdbConfig {
    pub auth: Option<TvdbAuth>,
    pub id: Option<String>,
    pub usage: Option<Vec<TvdbUsage>>,
    pub language: String,
    pub season: NumberStrategy,
    pub episode: NumberStrategy,
    pub base_url: String,
    pub banner_url: String,
    pub catch: bool,
    pub http: HttpOptions,
}

impl Default for TvdbConfig {
    fn default() -> Self {
        Self {
            auth: None,
            id: None,
            usage: None,
            language: DEFAULT_LANGUAGE.to_string(),
            season: NumberStrategy::Fixed(1),
            episode: NumberStrategy::Identity,
            base_url: DEFAULT_BASE_URL.to_string(),
            banner_url: DEFAULT_BANNER_URL.to_string(),
            catch: false,
            http: HttpOptions::default(),
        }
    }
}

impl TvdbConfig {
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        decode_config(config)
    }

    /// Fix the series id; the shared section cannot name one series.
    pub fn with_series_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_season(mut self, season: NumberStrategy) -> Self {
        self.season = season;
        self
    }

    pub fn with_episode(mut self, episode: NumberStrategy) -> Self {
        self.episode = episode;
        self
    }
}

/// One entry of the series episode list.
#[derive(Debug, Clone, Deserialize)]
pub struct TvdbEpisodeSummary {
    pub id: u64,
    #[serde(rename = "airedSeason")]
    pub aired_season: Option<u32>,
    #[serde(rename = "airedEpisodeNumber")]
    pub aired_episode_number: Option<u32>,
}

/// The detail record of one episode; only the fields this scraper uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TvdbEpisodeDetail {
    #[serde(rename = "episodeName")]
    pub episode_name: Option<String>,
    pub overview: Option<String>,
    #[serde(rename = "firstAired")]
    pub first_aired: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct EpisodePage {
    #[serde(default)]
    data: Vec<TvdbEpisodeSummary>,
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: TvdbEpisodeDetail,
}

/// Source of episode detail records; the HTTP client in production, a fake in tests.
pub trait TvdbApi {
    fn episode_detail(&mut self, id: u64) -> Result<TvdbEpisodeDetail, ScraperError>;
}

/// Authenticated TVDB API client.
#[derive(Debug)]
pub struct TvdbClient {
    client: PoliteClient,
    base_url: String,
    bearer: String,
    language: String,
}

impl TvdbClient {
    /// Exchange credentials for a token.
    pub fn login(
        mut client: PoliteClient,
        base_url: &str,
        auth: &TvdbAuth,
        language: &str,
    ) -> Result<Self, ScraperError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let url = format!("{}/login", base_url);
        debug!(url = %url, "logging in to TVDB");
        let response = client
            .post_json(&url, auth, &[("Accept", "application/json")])
            .map_err(|e| ScraperError::Network {
                url: url.clone(),
                source: e,
            })?;
        let body = read_body(response, &url, Some("login")).map_err(|e| match e {
            ScraperError::HttpStatus { status, .. } => ScraperError::Auth {
                reason: format!("login returned HTTP {}", status),
            },
            other => other,
        })?;
        let login: LoginResponse = decode(&url, &body)?;
        Ok(Self {
            client,
            base_url,
            bearer: format!("Bearer {}", login.token),
            language: language.to_string(),
        })
    }

    /// Every episode of the series, following pagination to the end.
    pub fn series_episodes(&mut self, series_id: &str) -> Result<Vec<TvdbEpisodeSummary>, ScraperError> {
        let mut episodes = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/series/{}/episodes?page={}",
                self.base_url, series_id, page
            );
            let body: EpisodePage = self.get_json(&url, "episode list")?;
            episodes.extend(body.data);
            match body.links.and_then(|l| l.next) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        debug!(series = series_id, count = episodes.len(), "loaded TVDB episode list");
        Ok(episodes)
    }

    fn get_json<T: DeserializeOwned>(&mut self, url: &str, context: &str) -> Result<T, ScraperError> {
        let headers = [
            ("Accept", "application/json"),
            ("Authorization", self.bearer.as_str()),
            ("Accept-Language", self.language.as_str()),
        ];
        let response = self
            .client
            .get_with_headers(url, &headers)
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let body = read_body(response, url, Some(context))?;
        decode(url, &body)
    }
}

impl TvdbApi for TvdbClient {
    fn episode_detail(&mut self, id: u64) -> Result<TvdbEpisodeDetail, ScraperError> {
        let url = format!("{}/episodes/{}", self.base_url, id);
        let response: DetailResponse = self.get_json(&url, "episode detail")?;
        Ok(response.data)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ScraperError> {
    serde_json::from_str(body).map_err(|source| ScraperError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Scraper over one TVDB series. Lookups are memoized per episode number for the lifetime of
/// the instance.
pub struct TvdbScraper<A = TvdbClient> {
    api: A,
    episodes: Vec<TvdbEpisodeSummary>,
    usage: Option<Vec<TvdbUsage>>,
    season: NumberStrategy,
    episode: NumberStrategy,
    banner_url: String,
    catch: bool,
    details: HashMap<u32, TvdbEpisodeDetail>,
    thumbnails: HashMap<u32, Option<String>>,
}

impl TvdbScraper<TvdbClient> {
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        Self::from_config(TvdbConfig::from_section(config)?)
    }

    /// Log in and load the series episode list.
    pub fn from_config(config: TvdbConfig) -> Result<Self, ScraperError> {
        let auth = config
            .auth
            .as_ref()
            .ok_or_else(|| ScraperError::InvalidConfig("tvdb scraper needs 'auth'".to_string()))?;
        let series_id = config
            .id
            .clone()
            .ok_or_else(|| ScraperError::InvalidConfig("tvdb scraper needs 'id'".to_string()))?;
        let client = config.http.client()?;
        let mut api = TvdbClient::login(client, &config.base_url, auth, &config.language)?;
        let episodes = api.series_episodes(&series_id)?;
        Ok(Self::with_api(api, episodes, config))
    }
}

impl<A: TvdbApi> TvdbScraper<A> {
    /// Build over an already loaded episode list.
    pub fn with_api(api: A, episodes: Vec<TvdbEpisodeSummary>, config: TvdbConfig) -> Self {
        Self {
            api,
            episodes,
            usage: config.usage,
            season: config.season,
            episode: config.episode,
            banner_url: config.banner_url,
            catch: config.catch,
            details: HashMap::new(),
            thumbnails: HashMap::new(),
        }
    }

    fn allows(&self, usage: TvdbUsage) -> bool {
        self.usage.as_ref().map_or(true, |u| u.contains(&usage))
    }

    fn load_episode(&mut self, episode_num: u32) -> Result<TvdbEpisodeDetail, ScraperError> {
        if let Some(detail) = self.details.get(&episode_num) {
            return Ok(detail.clone());
        }
        let season = self.season.apply(episode_num)?;
        let number = self.episode.apply(episode_num)?;
        let id = find_episode(&self.episodes, season, number)?.id;
        debug!(episode = episode_num, season, number, id, "fetching TVDB episode");
        let detail = self.api.episode_detail(id)?;
        self.details.insert(episode_num, detail.clone());
        Ok(detail)
    }
}

/// The list entry aired as `season` x `number`.
pub fn find_episode(
    episodes: &[TvdbEpisodeSummary],
    season: u32,
    number: u32,
) -> Result<&TvdbEpisodeSummary, ScraperError> {
    episodes
        .iter()
        .find(|e| e.aired_season == Some(season) && e.aired_episode_number == Some(number))
        .ok_or(ScraperError::EpisodeNotFound {
            season,
            episode: number,
        })
}

impl<A: TvdbApi> Scraper for TvdbScraper<A> {
    fn catch_errors(&self) -> bool {
        self.catch
    }

    fn scrape_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError> {
        let detail = self.load_episode(episode_num)?;
        if self.allows(TvdbUsage::Title) {
            episode.title = detail.episode_name;
        }
        if self.allows(TvdbUsage::Plot) {
            episode.plot = detail.overview;
        }
        if self.allows(TvdbUsage::Aired) {
            episode.aired = detail
                .first_aired
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), AIRED_FORMAT).ok());
        }
        Ok(())
    }

    fn scrape_thumbnail(&mut self, episode_num: u32) -> Result<Option<String>, ScraperError> {
        if let Some(cached) = self.thumbnails.get(&episode_num) {
            return Ok(cached.clone());
        }
        let detail = self.load_episode(episode_num)?;
        let thumbnail = detail
            .filename
            .filter(|f| !f.trim().is_empty() && self.allows(TvdbUsage::Thumbnail))
            .map(|f| format!("{}{}", self.banner_url, f));
        self.thumbnails.insert(episode_num, thumbnail.clone());
        Ok(thumbnail)
    }
}
