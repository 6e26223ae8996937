//! Episode output: XML record, normalized text, downloaded thumbnail.

pub mod text;
pub mod thumbnail;
pub mod xml;

pub use text::{normalize, normalize_episode};
pub use thumbnail::{download_thumbnail, extension_for_content_type};
pub use xml::{episode_xml, write_episode};

use std::path::PathBuf;
use thiserror::Error;

/// Output errors. All of them abort the run with exit code 3.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Cannot serialize episode {episode}: {reason}")]
    Xml { episode: u32, reason: String },

    #[error("Cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot save thumbnail {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// File base name shared by an episode's XML and thumbnail.
pub fn episode_base_name(series: &str, season: u32, episode: u32) -> String {
    format!("{} - s{:02}e{:02}", series, season, episode)
}
