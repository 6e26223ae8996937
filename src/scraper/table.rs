//! Table-derived scraper. Reads episode rows from a wiki-style episode table.
//!
//! The page is fetched once at construction; its `table.wikitable` elements are expanded into
//! plain grids (row/col spans copied into every covered cell) and one grid is kept.

use super::{decode_config, HttpOptions, NumberStrategy, Scraper, ScraperError, SplitStrategy};
use crate::config::ScraperConfig;
use crate::model::{Episode, EpisodeField, AIRED_FORMAT};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Rows of cell texts. Every row has the same length.
pub type Grid = Vec<Vec<String>>;

/// Config for [TableScraper] (section `wiki` for the default factory).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Page holding the episode table.
    pub url: Option<String>,
    /// Which `table.wikitable` on the page, 0-based.
    pub table: usize,
    /// Field name to column index. Fields not listed are never written.
    pub mapping: BTreeMap<EpisodeField, usize>,
    /// Episode number to row index.
    pub row: NumberStrategy,
    pub writers_split: SplitStrategy,
    pub directors_split: SplitStrategy,
    /// chrono format for the `aired` column.
    pub aired_format: Option<String>,
    pub catch: bool,
    pub http: HttpOptions,
}

impl TableConfig {
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        decode_config(config)
    }

    /// Fix the page URL (plugin presets override the section).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add column mappings the section does not already define.
    pub fn with_default_mapping(mut self, mapping: &[(EpisodeField, usize)]) -> Self {
        for (field, column) in mapping {
            self.mapping.entry(*field).or_insert(*column);
        }
        self
    }
}

/// Scraper over one parsed table grid.
#[derive(Debug)]
pub struct TableScraper {
    grid: Grid,
    mapping: BTreeMap<EpisodeField, usize>,
    row: NumberStrategy,
    writers_split: SplitStrategy,
    directors_split: SplitStrategy,
    aired_format: String,
    catch: bool,
}

impl TableScraper {
    /// Default-factory constructor: decode the section and fetch the page.
    pub fn from_section(config: &ScraperConfig) -> Result<Self, ScraperError> {
        Self::from_config(TableConfig::from_section(config)?)
    }

    /// Fetch the configured page and pick its table. Fails if the table index does not exist.
    pub fn from_config(config: TableConfig) -> Result<Self, ScraperError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ScraperError::InvalidConfig("table scraper needs 'url'".to_string()))?;
        let mut client = config.http.client()?;
        let html = client.fetch_text(&url, "episode table page")?;
        Self::from_html(&html, config)
    }

    /// Pick the configured table from already fetched HTML.
    pub fn from_html(html: &str, config: TableConfig) -> Result<Self, ScraperError> {
        let mut tables = parse_wikitables(html)?;
        let count = tables.len();
        if config.table >= count {
            return Err(ScraperError::TableNotFound {
                index: config.table,
                count,
            });
        }
        let grid = tables.swap_remove(config.table);
        debug!(rows = grid.len(), table = config.table, "parsed episode table");
        Ok(Self::from_grid(grid, config))
    }

    pub fn from_grid(grid: Grid, config: TableConfig) -> Self {
        Self {
            grid,
            mapping: config.mapping,
            row: config.row,
            writers_split: config.writers_split,
            directors_split: config.directors_split,
            aired_format: config
                .aired_format
                .unwrap_or_else(|| AIRED_FORMAT.to_string()),
            catch: config.catch,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn write_field(
        &self,
        episode: &mut Episode,
        field: EpisodeField,
        cell: &str,
    ) -> Result<(), ScraperError> {
        let text = cell.trim();
        match field {
            EpisodeField::Title => episode.title = Some(text.to_string()),
            EpisodeField::Plot => episode.plot = Some(text.to_string()),
            EpisodeField::Mpaa => episode.mpaa = Some(text.to_string()),
            EpisodeField::Writers => episode.writers = self.writers_split.split(text),
            EpisodeField::Directors => episode.directors = self.directors_split.split(text),
            EpisodeField::Rating => episode.set(field, text.into())?,
            // Dates in wiki tables vary too much to fail on; an unparseable cell clears it.
            EpisodeField::Aired => {
                episode.aired = NaiveDate::parse_from_str(text, &self.aired_format).ok()
            }
        }
        Ok(())
    }
}

impl Scraper for TableScraper {
    fn catch_errors(&self) -> bool {
        self.catch
    }

    fn scrape_episode(
        &mut self,
        episode: &mut Episode,
        episode_num: u32,
    ) -> Result<(), ScraperError> {
        let row_index = self.row.apply(episode_num)? as usize;
        let row = self
            .grid
            .get(row_index)
            .ok_or(ScraperError::RowOutOfRange {
                row: row_index,
                rows: self.grid.len(),
            })?;
        for (field, column) in &self.mapping {
            let cell = row.get(*column).ok_or(ScraperError::ColumnOutOfRange {
                field: *field,
                column: *column,
                row: row_index,
                columns: row.len(),
            })?;
            self.write_field(episode, *field, cell)?;
        }
        Ok(())
    }
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Every `table.wikitable` in the document, as grids, in document order.
pub fn parse_wikitables(html: &str) -> Result<Vec<Grid>, ScraperError> {
    let doc = Html::parse_document(html);
    let table_sel = parse_selector("table.wikitable")?;
    let row_sel = parse_selector("tr")?;
    Ok(doc
        .select(&table_sel)
        .map(|table| table_to_grid(table, &row_sel))
        .collect())
}

/// Expand one table into a grid. A cell with `rowspan`/`colspan` is copied into every cell it
/// covers; a span of 0 runs to the end of the table. Uncovered cells are empty strings.
pub fn table_to_grid(table: ElementRef<'_>, row_sel: &Selector) -> Grid {
    let rows: Vec<Vec<ElementRef<'_>>> = table.select(row_sel).map(row_cells).collect();
    let row_count = rows.len();

    // First pass: how many columns, counting cells carried down by earlier rowspans.
    // The last cell of a row counts as width 1 so trailing colspans add no phantom columns.
    let mut col_count = 0;
    let mut carried: Vec<usize> = Vec::new();
    for (r, cells) in rows.iter().enumerate() {
        let leading: usize = cells
            .iter()
            .take(cells.len().saturating_sub(1))
            .map(|c| span(c, "colspan").max(1))
            .sum();
        let width = leading + cells.len().min(1) + carried.len();
        col_count = col_count.max(width);
        carried.extend(cells.iter().map(|c| match span(c, "rowspan") {
            0 => row_count - r,
            n => n,
        }));
        carried = carried.into_iter().filter(|s| *s > 1).map(|s| s - 1).collect();
    }

    let mut grid = vec![vec![String::new(); col_count]; row_count];
    let mut pending: HashMap<usize, usize> = HashMap::new();
    for (r, cells) in rows.iter().enumerate() {
        let mut span_offset = 0;
        for (c, cell) in cells.iter().enumerate() {
            let mut col = c + span_offset;
            while pending.get(&col).copied().unwrap_or(0) > 0 {
                span_offset += 1;
                col += 1;
            }
            // Spans reaching outside the table are clipped.
            let rowspan = match span(cell, "rowspan") {
                0 => row_count - r,
                n => n.min(row_count - r),
            };
            pending.insert(col, rowspan);
            let colspan = match span(cell, "colspan") {
                0 => col_count.saturating_sub(col).max(1),
                n => n.min(col_count.saturating_sub(col).max(1)),
            };
            span_offset += colspan - 1;
            let value = cell.text().collect::<String>().trim().to_string();
            for dr in 0..rowspan {
                for dc in 0..colspan {
                    if let Some(slot) = grid.get_mut(r + dr).and_then(|row| row.get_mut(col + dc)) {
                        *slot = value.clone();
                    }
                }
            }
        }
        pending = pending
            .into_iter()
            .filter(|(_, s)| *s > 1)
            .map(|(c, s)| (c, s - 1))
            .collect();
    }
    grid
}

/// Direct `td`/`th` children of a row.
fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .collect()
}

/// Span attribute value; missing or unparseable means 1.
/// Span attribute value, capped at the limits HTML parsers apply (1000 columns, 65534 rows).
fn span(cell: &ElementRef<'_>, attr: &str) -> usize {
    let limit = if attr == "colspan" { 1000 } else { 65534 };
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map_or(1, |n| n.min(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_3x4() -> Grid {
        vec![
            vec!["Title".into(), "Writer".into(), "Rating".into(), "Plot".into()],
            vec!["First".into(), "A B".into(), "7.5".into(), "p1".into()],
            vec!["Second".into(), "C".into(), "8".into(), "p2".into()],
        ]
    }

    fn mapping(pairs: &[(EpisodeField, usize)]) -> TableConfig {
        TableConfig::default().with_default_mapping(pairs)
    }

    #[test]
    fn writes_only_mapped_fields() -> Result<(), ScraperError> {
        let config = mapping(&[(EpisodeField::Title, 0), (EpisodeField::Rating, 2)]);
        let mut scraper = TableScraper::from_grid(grid_3x4(), config);
        let mut ep = Episode::new(1);
        ep.plot = Some("kept".to_string());
        scraper.process_episode(&mut ep, 1)?;
        assert_eq!(ep.title.as_deref(), Some("First"));
        assert_eq!(ep.rating, Some(7.5));
        assert_eq!(ep.plot.as_deref(), Some("kept"));
        assert!(ep.writers.is_empty());
        assert!(ep.directors.is_empty());
        Ok(())
    }

    #[test]
    fn list_fields_use_split_strategy() -> Result<(), ScraperError> {
        let mut config = mapping(&[(EpisodeField::Writers, 1), (EpisodeField::Directors, 1)]);
        config.directors_split = SplitStrategy::Delimiter(",".to_string());
        let mut scraper = TableScraper::from_grid(grid_3x4(), config);
        let mut ep = Episode::new(1);
        scraper.process_episode(&mut ep, 1)?;
        assert_eq!(ep.writers, vec!["A", "B"]);
        assert_eq!(ep.directors, vec!["A B"]);
        Ok(())
    }

    #[test]
    fn row_strategy_selects_row() -> Result<(), ScraperError> {
        let mut config = mapping(&[(EpisodeField::Title, 0)]);
        config.row = NumberStrategy::Offset(-11);
        let mut scraper = TableScraper::from_grid(grid_3x4(), config);
        let mut ep = Episode::new(13);
        scraper.process_episode(&mut ep, 13)?;
        assert_eq!(ep.title.as_deref(), Some("Second"));
        assert_eq!(ep.episode, 13);
        Ok(())
    }

    #[test]
    fn out_of_range_row_and_column_fail() {
        let mut scraper =
            TableScraper::from_grid(grid_3x4(), mapping(&[(EpisodeField::Title, 0)]));
        let mut ep = Episode::new(5);
        assert!(matches!(
            scraper.process_episode(&mut ep, 5),
            Err(ScraperError::RowOutOfRange { row: 5, rows: 3 })
        ));
        let mut scraper =
            TableScraper::from_grid(grid_3x4(), mapping(&[(EpisodeField::Plot, 9)]));
        assert!(matches!(
            scraper.process_episode(&mut ep, 1),
            Err(ScraperError::ColumnOutOfRange { column: 9, .. })
        ));
    }

    #[test]
    fn bad_rating_fails_unless_caught() {
        let grid = vec![vec!["x".to_string(), "n/a".to_string()]];
        let mut config = mapping(&[(EpisodeField::Rating, 1)]);
        config.row = NumberStrategy::Fixed(0);
        let mut scraper = TableScraper::from_grid(grid.clone(), config.clone());
        let mut ep = Episode::new(1);
        assert!(scraper.process_episode(&mut ep, 1).is_err());

        config.catch = true;
        let mut scraper = TableScraper::from_grid(grid, config);
        assert!(scraper.process_episode(&mut ep, 1).is_ok());
        assert!(ep.rating.is_none());
    }

    #[test]
    fn missing_table_index_fails_at_construction() {
        let html = r#"<table class="wikitable"><tr><td>a</td></tr></table>"#;
        let config = TableConfig {
            table: 2,
            ..TableConfig::default()
        };
        assert!(matches!(
            TableScraper::from_html(html, config),
            Err(ScraperError::TableNotFound { index: 2, count: 1 })
        ));
    }

    #[test]
    fn only_wikitables_are_considered() -> Result<(), ScraperError> {
        let html = r#"<html><body>
<table class="infobox"><tr><td>skip</td></tr></table>
<table class="wikitable sortable"><tr><th>No.</th><th>Title</th></tr>
<tr><td>1</td><td> Opening </td></tr></table>
</body></html>"#;
        let tables = parse_wikitables(html)?;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][1], vec!["1", "Opening"]);
        Ok(())
    }

    #[test]
    fn spans_are_expanded_into_covered_cells() -> Result<(), ScraperError> {
        let html = r#"<table class="wikitable">
<tr><th>No.</th><th>Title</th><th>Writer</th></tr>
<tr><td>1</td><td>Ep One</td><td rowspan="2">Shared Writer</td></tr>
<tr><td>2</td><td>Ep Two</td></tr>
<tr><td colspan="2">Recap</td><td>W3</td></tr>
</table>"#;
        let tables = parse_wikitables(html)?;
        let grid = &tables[0];
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[1], vec!["1", "Ep One", "Shared Writer"]);
        assert_eq!(grid[2], vec!["2", "Ep Two", "Shared Writer"]);
        assert_eq!(grid[3], vec!["Recap", "Recap", "W3"]);
        Ok(())
    }

    #[test]
    fn oversized_spans_are_clipped_to_the_table() -> Result<(), ScraperError> {
        let html = r#"<table class="wikitable">
<tr><th>No.</th><th>Title</th><th>Writer</th></tr>
<tr><td>1</td><td>Ep One</td><td colspan="4000000000" rowspan="4000000000">W</td></tr>
<tr><td>2</td><td>Ep Two</td></tr>
</table>"#;
        let tables = parse_wikitables(html)?;
        let grid = &tables[0];
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1], vec!["1", "Ep One", "W"]);
        assert_eq!(grid[2], vec!["2", "Ep Two", "W"]);

        let wide = r#"<table class="wikitable">
<tr><td colspan="4000000000">Recap</td><td>X</td></tr>
</table>"#;
        let tables = parse_wikitables(wide)?;
        assert_eq!(tables[0][0].len(), 1001);
        assert_eq!(tables[0][0][1000], "X");
        Ok(())
    }

    #[test]
    fn leading_rowspan_shifts_following_cells() -> Result<(), ScraperError> {
        let html = r#"<table class="wikitable">
<tr><td rowspan="2">S1</td><td>a</td></tr>
<tr><td>b</td></tr>
</table>"#;
        let tables = parse_wikitables(html)?;
        assert_eq!(tables[0], vec![vec!["S1", "a"], vec!["S1", "b"]]);
        Ok(())
    }

    #[test]
    fn config_decodes_mapping_and_presets_apply() -> Result<(), ScraperError> {
        let section: ScraperConfig = serde_json::from_str(
            r#"{"table": 1, "mapping": {"title": 3}, "row": {"offset": 1}, "writers_split": {"delimiter": "/"}}"#,
        )
        .map_err(|source| ScraperError::ConfigDecode { source })?;
        let config = TableConfig::from_section(&section)?
            .with_url("https://ja.wikipedia.org/wiki/Example")
            .with_default_mapping(&[(EpisodeField::Title, 0), (EpisodeField::Writers, 2)]);
        assert_eq!(config.table, 1);
        assert_eq!(config.mapping.get(&EpisodeField::Title), Some(&3));
        assert_eq!(config.mapping.get(&EpisodeField::Writers), Some(&2));
        assert_eq!(config.row.apply(1)?, 2);
        assert_eq!(config.url.as_deref(), Some("https://ja.wikipedia.org/wiki/Example"));
        Ok(())
    }
}
