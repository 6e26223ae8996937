//! Text cleanup applied to scraped values before they are written.

use crate::model::Episode;

/// Longest bracket content treated as a footnote marker, in chars.
const MAX_FOOTNOTE_LEN: usize = 8;

/// Drop footnote markers like `[1]` or `[注 2]`, trim, and collapse whitespace runs (including
/// ideographic spaces) to one ASCII space.
pub fn normalize(text: &str) -> String {
    strip_footnotes(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize title, plot, writers and directors in place. Names left empty are dropped.
pub fn normalize_episode(episode: &mut Episode) {
    if let Some(title) = episode.title.as_mut() {
        *title = normalize(title);
    }
    if let Some(plot) = episode.plot.as_mut() {
        *plot = normalize(plot);
    }
    for names in [&mut episode.writers, &mut episode.directors] {
        *names = names
            .iter()
            .map(|n| normalize(n))
            .filter(|n| !n.is_empty())
            .collect();
    }
}

fn strip_footnotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if is_footnote(&after[..close]) => rest = &after[close + 1..],
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Short and ending in a digit: `1`, `12`, `注 3`, `note 4`.
fn is_footnote(inner: &str) -> bool {
    let inner = inner.trim();
    !inner.is_empty()
        && inner.chars().count() <= MAX_FOOTNOTE_LEN
        && inner.ends_with(|c: char| c.is_ascii_digit())
}
