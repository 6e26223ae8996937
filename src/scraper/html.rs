//! Generic HTML scraper: one page per episode, fields picked out by source-specific logic.
//!
//! [HtmlScraper] owns fetching and caching; an [HtmlSource] says which URL holds an episode and
//! how to read fields and a thumbnail from the parsed page. [SelectorSource] is the
//! config-driven source (CSS selector, optional attribute, optional regex per field).

use super::table::parse_selector;
use super::{decode_config, HttpOptions, PoliteClient, Scraper, ScraperError, SplitStrategy};
use crate::config::ScraperConfig;
use crate::model::{Episode, EpisodeField, FieldValue};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fetches raw page HTML.
pub trait PageFetcher {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError>;
}

/// Plain HTTP fetcher.
#[derive(Debug)]
pub struct HttpFetcher {
    client: PoliteClient,
}

impl HttpFetcher {
    pub fn new(client: PoliteClient) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
        self.client.fetch_text(url, "episode page")
    }
}

#[cfg(feature = "browser")]
pub use browser::BrowserFetcher;

#[cfg(feature = "browser")]
mod browser {
    use super::PageFetcher;
    use crate::scraper::ScraperError;
    use headless_chrome::{Browser, LaunchOptions};
    use std::time::Duration;
    use tracing::debug;

    /// Time given to page scripts after navigation completes.
    const SETTLE_DELAY: Duration = Duration::from_secs(1);

    fn browser_error(e: impl std::fmt::Display) -> ScraperError {
        ScraperError::Browser {
            reason: e.to_string(),
        }
    }

    /// Headless Chrome fetcher for pages that render their content with scripts.
    pub struct BrowserFetcher {
        browser: Browser,
    }

    impl BrowserFetcher {
        pub fn launch() -> Result<Self, ScraperError> {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .build()
                .map_err(browser_error)?;
            let browser = Browser::new(options).map_err(browser_error)?;
            Ok(Self { browser })
        }
    }

    impl PageFetcher for BrowserFetcher {
        fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
            debug!(url, "fetching with headless browser");
            let tab = self.browser.new_tab().map_err(browser_error)?;
            tab.navigate_to(url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(browser_error)?;
            std::thread::sleep(SETTLE_DELAY);
            let html = tab.get_content().map_err(browser_error)?;
            let _ = tab.close(true);
            Ok(html)
        }
    }
}

#[cfg(feature = "browser")]
fn browser_fetcher() -> Result<Box<dyn PageFetcher>, ScraperError> {
    Ok(Box::new(BrowserFetcher::launch()?))
}

#[cfg(not(feature = "browser"))]
fn browser_fetcher() -> Result<Box<dyn PageFetcher>, ScraperError> {
    Err(ScraperError::Browser {
        reason: "epscrape was built without the 'browser' feature".to_string(),
    })
}

/// Browser fetcher if asked for, else HTTP with the given options.
pub fn fetcher_for(browser: bool, http: &HttpOptions) -> Result<Box<dyn PageFetcher>, ScraperError> {
    if browser {
        return browser_fetcher();
    }
    Ok(Box::new(HttpFetcher::new(http.client()?)))
}

/// Source-specific part of an HTML scraper.
pub trait HtmlSource {
    /// Page holding `episode_num`.
    fn url(&self, episode_num: u32) -> Result<String, ScraperError>;

    /// Write fields read from `doc`. Fields the page does not have are left untouched.
    fn parse_episode(
        &self,
        episode: &mut Episode,
        episode_num: u32,
        doc: &Html,
    ) -> Result<(), ScraperError>;

    fn parse_thumbnail(&self, _episode_num: u32, _doc: &Html) -> Result<Option<String>, ScraperError> {
        Ok(None)
    }
}

/// HTML scraper over one [HtmlSource]. URLs and thumbnails are cached per episode number and
/// parsed pages per URL, for the lifetime of the instance.
pub struct HtmlScraper<S> {
    source: S,
    fetcher: Box<dyn PageFetcher>,
    catch: bool,
    urls: HashMap<u32, String>,
    documents: HashMap<String, Html>,
    thumbnails: HashMap<u32, Option<String>>,
}

impl<S: HtmlSource> HtmlScraper<S> {
    pub fn new(source: S, fetcher: Box<dyn PageFetcher>, catch: bool) -> Self {
        Self {
            source,
            fetcher,
            catch,
            urls: HashMap::new(),
            documents: HashMap::new(),
            thumbnails: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and parse the page for `episode_num` unless cached; returns its URL.
    fn ensure_document(&mut self, episode_num: u32) -> Result<String, ScraperError> {
        let url = match self.urls.get(&episode_num) {
            Some(url) => url.clone(),
            None => {
                let url = self.source.url(episode_num)?;
                self.urls.insert(episode_num, url.clone());
                url
            }
        };
        if self.documents.contains_key(&url) {
            debug!(url = %url, "page cache hit");
        } else {
            let body = self.fetcher.fetch(&url)?;
            self.documents.insert(url.clone(), Html::parse_document(&body));
        }
        Ok(url)
    }

    fn document(&self, url: &str, episode_num: u32) -> Result<&Html, ScraperError> {
        self.documents.get(url).ok_or_else(|| ScraperError::Parse {
            episode_num,
            message: format!("page {} missing from cache", url),
        })
    }
}

impl HtmlScraper<SelectorSource> {
    /// Default-factory constructor: selector source plus HTTP or browser fetcher.
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        Self::from_config(HtmlConfig::from_section(config)?)
    }

    pub fn from_config(config: HtmlConfig) -> Result<Self, ScraperError> {
        let source = SelectorSource::new(&config)?;
        let fetcher = fetcher_for(config.browser, &config.http)?;
        Ok(Self::new(source, fetcher, config.catch))
    }
}

impl<S: HtmlSource> Scraper for HtmlScraper<S> {
    fn catch_errors(&self) -> bool {
        self.catch
    }

    fn scrape_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError> {
        let url = self.ensure_document(episode_num)?;
        let doc = self.document(&url, episode_num)?;
        self.source.parse_episode(episode, episode_num, doc)
    }

    fn scrape_thumbnail(&mut self, episode_num: u32) -> Result<Option<String>, ScraperError> {
        if let Some(cached) = self.thumbnails.get(&episode_num) {
            return Ok(cached.clone());
        }
        let url = self.ensure_document(episode_num)?;
        let doc = self.document(&url, episode_num)?;
        let thumbnail = self.source.parse_thumbnail(episode_num, doc)?;
        self.thumbnails.insert(episode_num, thumbnail.clone());
        Ok(thumbnail)
    }
}

/// Fill `{episode}` and `{episode:0N}` (zero-padded to N digits) in a URL template.
pub fn render_url(template: &str, episode_num: u32) -> Result<String, ScraperError> {
    const OPEN: &str = "{episode";
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let placeholder = &rest[start..];
        let end = placeholder.find('}').ok_or_else(|| {
            ScraperError::InvalidConfig(format!("unclosed placeholder in url {:?}", template))
        })?;
        match &placeholder[OPEN.len()..end] {
            "" => out.push_str(&episode_num.to_string()),
            format => {
                let width = format
                    .strip_prefix(":0")
                    .and_then(|w| w.parse::<usize>().ok())
                    .ok_or_else(|| {
                        ScraperError::InvalidConfig(format!(
                            "unsupported placeholder {:?} in url {:?}",
                            &placeholder[..=end],
                            template
                        ))
                    })?;
                out.push_str(&format!("{:0width$}", episode_num, width = width));
            }
        }
        rest = &placeholder[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// How to read one value from a page, as written in config.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub selector: String,
    /// Attribute to read instead of the element text.
    pub attr: Option<String>,
    /// Regex applied to the value; the first capture group (or the whole match) is kept.
    pub pattern: Option<String>,
    /// How list fields are split.
    #[serde(default)]
    pub split: SplitStrategy,
}

/// Config for [SelectorSource] (section `html` for the default factory).
///
/// ```toml
/// [html]
/// url = "http://example.com/story{episode:02}.html"
///
/// [html.fields.title]
/// selector = "div.story h2"
/// pattern = "「(.*)」"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    pub url: Option<String>,
    /// Fetch through a headless browser (needs the `browser` feature).
    pub browser: bool,
    pub fields: BTreeMap<EpisodeField, ExtractorConfig>,
    pub thumbnail: Option<ExtractorConfig>,
    /// Per-episode extractors that replace the ones in `fields`.
    pub episodes: BTreeMap<u32, BTreeMap<EpisodeField, ExtractorConfig>>,
    pub catch: bool,
    pub http: HttpOptions,
}

impl HtmlConfig {
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        decode_config(config)
    }
}

#[derive(Debug, Clone)]
struct Extractor {
    selector: Selector,
    attr: Option<String>,
    pattern: Option<Regex>,
    split: SplitStrategy,
}

impl Extractor {
    fn compile(config: &ExtractorConfig) -> Result<Self, ScraperError> {
        let pattern = config
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|source| ScraperError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .transpose()?;
        Ok(Self {
            selector: parse_selector(&config.selector)?,
            attr: config.attr.clone(),
            pattern,
            split: config.split.clone(),
        })
    }

    /// Value from the first matching element, or None if nothing matches.
    fn extract(&self, doc: &Html) -> Option<String> {
        let element = doc.select(&self.selector).next()?;
        let raw = match &self.attr {
            Some(attr) => element.value().attr(attr)?.to_string(),
            None => element.text().collect::<String>(),
        };
        let raw = raw.trim();
        match &self.pattern {
            Some(re) => {
                let caps = re.captures(raw)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().trim().to_string())
            }
            None => Some(raw.to_string()),
        }
    }
}

fn compile_all(
    configs: &BTreeMap<EpisodeField, ExtractorConfig>,
) -> Result<BTreeMap<EpisodeField, Extractor>, ScraperError> {
    configs
        .iter()
        .map(|(field, config)| Ok((*field, Extractor::compile(config)?)))
        .collect()
}

/// [HtmlSource] driven entirely by [HtmlConfig]. Selectors and patterns are compiled up front.
#[derive(Debug, Clone)]
pub struct SelectorSource {
    url: String,
    fields: BTreeMap<EpisodeField, Extractor>,
    thumbnail: Option<Extractor>,
    episodes: BTreeMap<u32, BTreeMap<EpisodeField, Extractor>>,
}

impl SelectorSource {
    pub fn new(config: &HtmlConfig) -> Result<Self, ScraperError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ScraperError::InvalidConfig("html scraper needs 'url'".to_string()))?;
        // Catch bad templates at construction rather than on the first episode.
        render_url(&url, 1)?;
        let episodes = config
            .episodes
            .iter()
            .map(|(n, fields)| Ok((*n, compile_all(fields)?)))
            .collect::<Result<_, ScraperError>>()?;
        Ok(Self {
            url,
            fields: compile_all(&config.fields)?,
            thumbnail: config.thumbnail.as_ref().map(Extractor::compile).transpose()?,
            episodes,
        })
    }

    fn extractor(&self, episode_num: u32, field: EpisodeField) -> Option<&Extractor> {
        self.episodes
            .get(&episode_num)
            .and_then(|fields| fields.get(&field))
            .or_else(|| self.fields.get(&field))
    }
}

impl HtmlSource for SelectorSource {
    fn url(&self, episode_num: u32) -> Result<String, ScraperError> {
        render_url(&self.url, episode_num)
    }

    fn parse_episode(
        &self,
        episode: &mut Episode,
        episode_num: u32,
        doc: &Html,
    ) -> Result<(), ScraperError> {
        for field in EpisodeField::ALL {
            let Some(extractor) = self.extractor(episode_num, field) else {
                continue;
            };
            let Some(text) = extractor.extract(doc) else {
                debug!(episode = episode_num, field = %field, "selector matched nothing");
                continue;
            };
            let value = if field.is_list() {
                FieldValue::List(extractor.split.split(&text))
            } else {
                FieldValue::Text(text)
            };
            episode.set(field, value)?;
        }
        Ok(())
    }

    /// Thumbnail value resolved against the page URL, so relative `src` attributes work.
    fn parse_thumbnail(&self, episode_num: u32, doc: &Html) -> Result<Option<String>, ScraperError> {
        let Some(value) = self.thumbnail.as_ref().and_then(|t| t.extract(doc)) else {
            return Ok(None);
        };
        let page = self.url(episode_num)?;
        let resolved = reqwest::Url::parse(&page)
            .and_then(|base| base.join(&value))
            .map_err(|e| ScraperError::Parse {
                episode_num,
                message: format!("bad thumbnail url {:?}: {}", value, e),
            })?;
        Ok(Some(resolved.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeFetcher {
        pages: HashMap<String, String>,
        calls: Rc<Cell<u32>>,
    }

    impl PageFetcher for FakeFetcher {
        fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
            self.calls.set(self.calls.get() + 1);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScraperError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                    context: None,
                })
        }
    }

    const STORY_01: &str = r#"<html><body>
        <div class="storyInner">
          <h2>第1話「赤い夜」</h2>
          <p class="staff">脚本 山田太郎、佐藤花子</p>
          <span class="date">2009-10-09</span>
          <img class="thumb" src="/img/story01.jpg">
        </div></body></html>"#;

    const STORY_02: &str = r#"<html><body>
        <div class="storyInner"><h2>第2話「黒い月」</h2><h3>Alt title</h3></div>
        </body></html>"#;

    fn fetcher() -> (Box<dyn PageFetcher>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let pages = [
            ("http://story.example/story01.html", STORY_01),
            ("http://story.example/story02.html", STORY_02),
        ]
        .into_iter()
        .map(|(u, p)| (u.to_string(), p.to_string()))
        .collect();
        (
            Box::new(FakeFetcher {
                pages,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn config() -> Result<HtmlConfig, ScraperError> {
        let section: ScraperConfig = serde_json::from_str(
            r#"{
                "url": "http://story.example/story{episode:02}.html",
                "fields": {
                    "title": {"selector": "div.storyInner h2", "pattern": ".*「(.*)」"},
                    "writers": {"selector": "p.staff", "pattern": "脚本 (.*)", "split": {"delimiter": "、"}},
                    "aired": {"selector": "span.date"}
                },
                "thumbnail": {"selector": "img.thumb", "attr": "src"},
                "episodes": {"2": {"title": {"selector": "div.storyInner h3"}}}
            }"#,
        )
        .map_err(|source| ScraperError::ConfigDecode { source })?;
        HtmlConfig::from_section(&section)
    }

    fn scraper() -> Result<(HtmlScraper<SelectorSource>, Rc<Cell<u32>>), ScraperError> {
        let config = config()?;
        let (fetcher, calls) = fetcher();
        Ok((
            HtmlScraper::new(SelectorSource::new(&config)?, fetcher, config.catch),
            calls,
        ))
    }

    #[test]
    fn render_url_placeholders() -> Result<(), ScraperError> {
        assert_eq!(render_url("http://a/{episode}.html", 7)?, "http://a/7.html");
        assert_eq!(render_url("http://a/s{episode:02}.html", 7)?, "http://a/s07.html");
        assert_eq!(render_url("http://a/{episode:03}/{episode}", 12)?, "http://a/012/12");
        assert_eq!(render_url("http://a/static", 3)?, "http://a/static");
        assert!(render_url("http://a/{episode:x}", 1).is_err());
        assert!(render_url("http://a/{episode", 1).is_err());
        Ok(())
    }

    #[test]
    fn selectors_fill_fields() -> Result<(), ScraperError> {
        let (mut s, _) = scraper()?;
        let mut ep = Episode::new(1);
        ep.plot = Some("kept".to_string());
        s.process_episode(&mut ep, 1)?;
        assert_eq!(ep.title.as_deref(), Some("赤い夜"));
        assert_eq!(ep.writers, vec!["山田太郎", "佐藤花子"]);
        assert_eq!(ep.aired, NaiveDate::from_ymd_opt(2009, 10, 9));
        assert_eq!(ep.plot.as_deref(), Some("kept"));
        Ok(())
    }

    #[test]
    fn per_episode_extractor_replaces_default() -> Result<(), ScraperError> {
        let (mut s, _) = scraper()?;
        let mut ep = Episode::new(2);
        s.process_episode(&mut ep, 2)?;
        assert_eq!(ep.title.as_deref(), Some("Alt title"));
        assert!(ep.writers.is_empty());
        Ok(())
    }

    #[test]
    fn thumbnail_is_resolved_against_page() -> Result<(), ScraperError> {
        let (mut s, _) = scraper()?;
        assert_eq!(
            s.get_thumbnail(1)?.as_deref(),
            Some("http://story.example/img/story01.jpg")
        );
        assert_eq!(s.get_thumbnail(2)?, None);
        Ok(())
    }

    #[test]
    fn pages_are_fetched_once_per_episode() -> Result<(), ScraperError> {
        let (mut s, calls) = scraper()?;
        let mut ep = Episode::new(1);
        s.process_episode(&mut ep, 1)?;
        s.get_thumbnail(1)?;
        s.process_episode(&mut ep, 1)?;
        s.get_thumbnail(1)?;
        assert_eq!(calls.get(), 1);
        s.process_episode(&mut ep, 2)?;
        assert_eq!(calls.get(), 2);
        Ok(())
    }

    #[test]
    fn missing_page_propagates_unless_caught() -> Result<(), ScraperError> {
        let (mut s, _) = scraper()?;
        let mut ep = Episode::new(3);
        assert!(matches!(
            s.process_episode(&mut ep, 3),
            Err(ScraperError::HttpStatus { status: 404, .. })
        ));

        let (fetcher, _) = fetcher();
        let mut caught = HtmlScraper::new(SelectorSource::new(&config()?)?, fetcher, true);
        caught.process_episode(&mut ep, 3)?;
        assert_eq!(ep.episode, 3);
        assert_eq!(caught.get_thumbnail(3)?, None);
        Ok(())
    }

    #[test]
    fn bad_selector_or_pattern_fails_construction() -> Result<(), ScraperError> {
        let mut bad_pattern = config()?;
        if let Some(title) = bad_pattern.fields.get_mut(&EpisodeField::Title) {
            title.pattern = Some("(".to_string());
        }
        assert!(matches!(
            SelectorSource::new(&bad_pattern),
            Err(ScraperError::InvalidPattern { .. })
        ));
        let mut bad_selector = config()?;
        if let Some(aired) = bad_selector.fields.get_mut(&EpisodeField::Aired) {
            aired.selector = "span[".to_string();
        }
        assert!(matches!(
            SelectorSource::new(&bad_selector),
            Err(ScraperError::InvalidSelector { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_url_is_config_error() {
        assert!(matches!(
            SelectorSource::new(&HtmlConfig::default()),
            Err(ScraperError::InvalidConfig(_))
        ));
    }

    #[cfg(not(feature = "browser"))]
    #[test]
    fn browser_without_feature_is_construction_error() {
        assert!(matches!(
            fetcher_for(true, &HttpOptions::default()),
            Err(ScraperError::Browser { .. })
        ));
    }
}
