//! Collects season match files from football-data.co.uk.
//!
//! The season index page links every season's CSV as
//! `mmz4281/<season>/<league>.csv`, e.g. `mmz4281/2324/E0.csv` for the
//! 2023/24 Premier League. Links are fetched in page order (newest first on
//! the live site) and stacked into one table.

use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use crate::config::{OutputMode, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::http_cache::{SeasonCache, fetch_text_cached};
use crate::http_client::http_client;
use crate::table::MatchTable;

pub const TEAM_COLUMNS: [&str; 2] = ["HomeTeam", "AwayTeam"];
const DATE_COLUMN: &str = "Date";

/// Source of page and file bodies.
pub trait Fetch {
    fn fetch_text(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: &'static Client,
    cache: Option<RefCell<SeasonCache>>,
}

impl HttpFetcher {
    /// With `use_cache`, downloads are revalidated against the user cache
    /// directory; without a resolvable directory the fetcher runs uncached.
    pub fn new(timeout: Duration, use_cache: bool) -> Result<Self> {
        let cache = if use_cache {
            let cache = SeasonCache::from_env();
            if cache.is_none() {
                warn!("no cache directory (XDG_CACHE_HOME / HOME unset), fetching uncached");
            }
            cache
        } else {
            None
        };
        Ok(Self {
            client: http_client(timeout)?,
            cache: cache.map(RefCell::new),
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        if let Some(cache) = &self.cache {
            return fetch_text_cached(self.client, &mut cache.borrow_mut(), url);
        }
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::fetch(url, format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("http {status}")));
        }
        resp.text()
            .map_err(|e| PipelineError::fetch(url, format!("failed reading body: {e}")))
    }
}

pub struct Crawler<F> {
    fetcher: F,
    index_url: String,
    league_code: String,
    season_limit: usize,
}

impl<F: Fetch> Crawler<F> {
    pub fn new(
        fetcher: F,
        index_url: impl Into<String>,
        league_code: impl Into<String>,
        season_limit: usize,
    ) -> Self {
        Self {
            fetcher,
            index_url: index_url.into(),
            league_code: league_code.into(),
            season_limit,
        }
    }

    pub fn from_config(fetcher: F, config: &PipelineConfig) -> Self {
        Self::new(
            fetcher,
            config.index_url(),
            config.league_code.clone(),
            config.season_count,
        )
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Absolute download URLs for every season file linked from the index, in page order.
    pub fn season_urls(&self) -> Result<Vec<String>> {
        let html = self.fetcher.fetch_text(&self.index_url)?;
        let hyperlinks = find_all_hyperlinks(&html);
        let links = filter_resource_links(&hyperlinks, &self.league_code)?;
        compose_resource_urls(&self.index_url, &links)
    }

    /// Fetches the first `season_limit` season files and stacks them. Rows
    /// without both team names are dropped. Any failed fetch aborts the crawl.
    pub fn crawl(&self) -> Result<MatchTable> {
        let urls = self.season_urls()?;
        info!(
            found = urls.len(),
            limit = self.season_limit,
            "resolved season links"
        );

        let mut combined = MatchTable::default();
        for url in urls.iter().take(self.season_limit) {
            let body = self.fetcher.fetch_text(url)?;
            let season = parse_season_csv(&body, url)?;
            info!(url = %url, rows = season.len(), "loaded season");
            combined.append(season);
        }

        if combined.headers.is_empty() {
            return Ok(combined);
        }
        let missing = combined.missing_columns(&TEAM_COLUMNS);
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                origin: self.index_url.clone(),
                missing,
            });
        }
        let dropped = combined.drop_rows_missing(&TEAM_COLUMNS);
        debug!(dropped, "dropped rows without team names");
        Ok(combined)
    }

    /// Crawls, then applies the output mode. The table is returned for every
    /// mode; an unrecognised mode is logged and nothing is written.
    pub fn process_to_output(&self, output_mode: &str, output_path: &Path) -> Result<MatchTable> {
        let table = self.crawl()?;
        match output_mode.parse::<OutputMode>() {
            Ok(OutputMode::Csv) => {
                table.write_csv(output_path)?;
                info!(path = %output_path.display(), rows = table.len(), "saved combined seasons");
            }
            Ok(OutputMode::Table) => {}
            Err(err) => {
                error!(error = %err, path = %output_path.display(), "combined seasons not written");
            }
        }
        Ok(table)
    }
}

/// `href` targets of every anchor in document order.
pub fn find_all_hyperlinks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&anchor)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect()
}

/// Links naming a season file for `league_code`, such as `mmz4281/2324/E0.csv`.
pub fn filter_resource_links(hyperlinks: &[String], league_code: &str) -> Result<Vec<String>> {
    let pattern = format!(r"mmz4281/\d{{4}}/{}\b", regex::escape(league_code));
    let re = Regex::new(&pattern)
        .map_err(|e| PipelineError::Config(format!("invalid league code {league_code:?}: {e}")))?;
    Ok(hyperlinks
        .iter()
        .filter(|link| re.is_match(link))
        .cloned()
        .collect())
}

/// Resolves links against the page they were found on.
pub fn compose_resource_urls(page_url: &str, links: &[String]) -> Result<Vec<String>> {
    let base = Url::parse(page_url)
        .map_err(|e| PipelineError::Config(format!("invalid index url {page_url:?}: {e}")))?;
    links
        .iter()
        .map(|link| {
            base.join(link)
                .map(String::from)
                .map_err(|e| PipelineError::parse(page_url, format!("bad link {link:?}: {e}")))
        })
        .collect()
}

/// Parses one season file, rewriting the day-first `Date` column to ISO dates.
pub fn parse_season_csv(raw: &str, origin: &str) -> Result<MatchTable> {
    let mut table = MatchTable::from_csv_str(raw, origin)?;
    let Some(date_idx) = table.column_index(DATE_COLUMN) else {
        return Ok(table);
    };
    for (row_idx, row) in table.rows.iter_mut().enumerate() {
        let cell = &mut row[date_idx];
        if cell.is_empty() {
            continue;
        }
        let date = parse_match_date(cell).ok_or_else(|| {
            PipelineError::parse(
                origin,
                format!("row {}: unrecognised date {cell:?}", row_idx + 1),
            )
        })?;
        *cell = date.format("%Y-%m-%d").to_string();
    }
    Ok(table)
}

/// Accepts `dd/mm/yy`, `dd/mm/yyyy` and ISO `yyyy-mm-dd`.
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    let year_len = raw.rsplit('/').next().map(str::len)?;
    let format = match year_len {
        2 => "%d/%m/%y",
        4 => "%d/%m/%Y",
        _ => return None,
    };
    NaiveDate::parse_from_str(raw, format).ok()
}
