//! On-disk store of downloaded season files, revalidated with conditional GETs.
//!
//! Entries are keyed by season resource (`mmz4281/2324/E0`) rather than by the
//! full URL, so a mirror or scheme change reuses the same slot. Only the most
//! recently fetched `MAX_ENTRIES` files are kept.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

const CACHE_VERSION: u32 = 2;
const CACHE_DIR: &str = "football_etl";
const CACHE_FILE: &str = "season_cache.json";
pub const MAX_ENTRIES: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct CacheFile {
    version: u32,
    seasons: BTreeMap<String, CachedBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedBody {
    url: String,
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: i64,
}

#[derive(Debug)]
pub struct SeasonCache {
    path: PathBuf,
    file: CacheFile,
}

impl SeasonCache {
    /// Loads `dir/season_cache.json`; a missing, unreadable or older-version
    /// file yields an empty cache.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(CACHE_FILE);
        let file = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CacheFile>(&raw).ok())
            .filter(|file| file.version == CACHE_VERSION)
            .unwrap_or_else(|| CacheFile {
                version: CACHE_VERSION,
                seasons: BTreeMap::new(),
            });
        Self { path, file }
    }

    pub fn from_env() -> Option<Self> {
        cache_dir_from(|key| std::env::var(key).ok()).map(|dir| Self::open(&dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.file.seasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.seasons.is_empty()
    }

    pub fn body(&self, url: &str) -> Option<&str> {
        self.file
            .seasons
            .get(&season_key(url))
            .map(|entry| entry.body.as_str())
    }

    fn entry(&self, url: &str) -> Option<&CachedBody> {
        self.file.seasons.get(&season_key(url))
    }

    /// Records a fresh body, evicts the oldest entries past `MAX_ENTRIES` and persists.
    pub fn store(
        &mut self,
        url: &str,
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Result<()> {
        self.file.seasons.insert(
            season_key(url),
            CachedBody {
                url: url.to_string(),
                body,
                etag,
                last_modified,
                fetched_at: Utc::now().timestamp(),
            },
        );
        self.evict_oldest();
        self.save()
    }

    fn evict_oldest(&mut self) {
        while self.file.seasons.len() > MAX_ENTRIES {
            let oldest = self
                .file
                .seasons
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone());
            let Some(key) = oldest else {
                break;
            };
            self.file.seasons.remove(&key);
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }
        let json = serde_json::to_string(&self.file)
            .map_err(|e| PipelineError::parse(self.path.display().to_string(), e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| PipelineError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| PipelineError::io(&self.path, e))?;
        Ok(())
    }
}

/// `mmz4281/<season>/<league>` for season files, the URL itself otherwise.
pub fn season_key(url: &str) -> String {
    let Ok(re) = Regex::new(r"mmz4281/\d{4}/[A-Za-z0-9]+") else {
        return url.to_string();
    };
    re.find(url)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| url.to_string())
}

/// `$XDG_CACHE_HOME/football_etl`, else `$HOME/.cache/football_etl`.
pub fn cache_dir_from(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(base) = lookup("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = lookup("HOME").filter(|h| !h.trim().is_empty())?;
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// GET revalidated against the cached copy. A 304 answer returns the cached
/// body; a failure to persist the cache is logged and does not fail the fetch.
pub fn fetch_text_cached(client: &Client, cache: &mut SeasonCache, url: &str) -> Result<String> {
    let mut req = client.get(url);
    if let Some(entry) = cache.entry(url) {
        if let Some(etag) = entry.etag.as_deref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_deref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req
        .send()
        .map_err(|e| PipelineError::fetch(url, format!("request failed: {e}")))?;
    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        debug!(url, "season file not modified");
        return cache
            .body(url)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::fetch(url, "received 304 without cached body"));
    }
    if !status.is_success() {
        return Err(PipelineError::fetch(url, format!("http {status}")));
    }

    let header = |name| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let etag = header(ETAG);
    let last_modified = header(LAST_MODIFIED);
    let body = resp
        .text()
        .map_err(|e| PipelineError::fetch(url, format!("failed reading body: {e}")))?;

    if etag.is_some() || last_modified.is_some() {
        if let Err(err) = cache.store(url, body.clone(), etag, last_modified) {
            warn!(error = %err, path = %cache.path().display(), "failed to persist season cache");
        }
    }
    Ok(body)
}
