//! Episode XML record.
//!
//! ```xml
//! <episode>
//!   <title>...</title>
//!   <episode>3</episode>
//!   <aired>2009-10-23</aired>
//!   <plot/>
//!   <writers><writer>...</writer></writers>
//!   ...
//! </episode>
//! ```
//!
//! Every element is always present; absent values are written as empty elements.

use super::OutputError;
use crate::model::{Episode, AIRED_FORMAT};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::{Path, PathBuf};

/// Serialize one episode to an indented UTF-8 XML document.
pub fn episode_xml(episode: &Episode) -> Result<String, OutputError> {
    let mut xml = EpisodeXml::new(episode.episode);
    xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.event(Event::Start(BytesStart::new("episode")))?;
    xml.text("title", episode.title.as_deref())?;
    xml.text("episode", Some(&episode.episode.to_string()))?;
    let aired = episode.aired.map(|d| d.format(AIRED_FORMAT).to_string());
    xml.text("aired", aired.as_deref())?;
    xml.text("plot", episode.plot.as_deref())?;
    xml.list("writers", "writer", &episode.writers)?;
    xml.list("directors", "director", &episode.directors)?;
    let rating = episode.rating.map(|r| r.to_string());
    xml.text("rating", rating.as_deref())?;
    xml.text("mpaa", episode.mpaa.as_deref())?;
    xml.text("thumbnail", episode.thumbnail.as_deref())?;
    xml.event(Event::End(BytesEnd::new("episode")))?;
    xml.finish()
}

/// Write `<dir>/<base_name>.xml`, returning its path.
pub fn write_episode(dir: &Path, base_name: &str, episode: &Episode) -> Result<PathBuf, OutputError> {
    let path = dir.join(format!("{}.xml", base_name));
    let xml = episode_xml(episode)?;
    std::fs::write(&path, xml).map_err(|source| OutputError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

struct EpisodeXml {
    episode: u32,
    writer: Writer<Vec<u8>>,
}

impl EpisodeXml {
    fn new(episode: u32) -> Self {
        Self {
            episode,
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn error(&self, reason: impl ToString) -> OutputError {
        OutputError::Xml {
            episode: self.episode,
            reason: reason.to_string(),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), OutputError> {
        self.writer.write_event(event).map_err(|e| self.error(e))
    }

    fn text(&mut self, name: &str, value: Option<&str>) -> Result<(), OutputError> {
        match value {
            Some(v) => {
                self.event(Event::Start(BytesStart::new(name)))?;
                self.event(Event::Text(BytesText::new(v)))?;
                self.event(Event::End(BytesEnd::new(name)))
            }
            None => self.event(Event::Empty(BytesStart::new(name))),
        }
    }

    fn list(&mut self, name: &str, item: &str, values: &[String]) -> Result<(), OutputError> {
        if values.is_empty() {
            return self.event(Event::Empty(BytesStart::new(name)));
        }
        self.event(Event::Start(BytesStart::new(name)))?;
        for v in values {
            self.text(item, Some(v))?;
        }
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> Result<String, OutputError> {
        let episode = self.episode;
        String::from_utf8(self.writer.into_inner()).map_err(|e| OutputError::Xml {
            episode,
            reason: e.to_string(),
        })
    }
}
