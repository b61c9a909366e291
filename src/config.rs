use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::PipelineError;

const DEFAULT_BASE_URL: &str = "https://www.football-data.co.uk";
const DEFAULT_INDEX_PATH: &str = "englandm.php";
const DEFAULT_LEAGUE_CODE: &str = "E0";
const DEFAULT_SEASON_COUNT: usize = 15;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Write the combined table to disk and return it.
    Csv,
    /// Return the combined table without writing anything.
    Table,
}

impl FromStr for OutputMode {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "table" => Ok(Self::Table),
            _ => Err(PipelineError::UnknownOutputMode(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_url: String,
    pub index_path: String,
    pub league_code: String,
    pub season_count: usize,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub file_extension: String,
    pub dataset_name: String,
    // Kept raw so an unknown value reaches the crawler, which reports it.
    pub output_mode: String,
    pub http_timeout: Duration,
    pub http_cache: bool,
    pub column_mapping_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            league_code: DEFAULT_LEAGUE_CODE.to_string(),
            season_count: DEFAULT_SEASON_COUNT,
            input_folder: PathBuf::from("data/raw"),
            output_folder: PathBuf::from("data/processed"),
            file_extension: "csv".to_string(),
            dataset_name: "EPL".to_string(),
            output_mode: "csv".to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            http_cache: true,
            column_mapping_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let season_count = env_clamped(&lookup, "SEASON_COUNT", DEFAULT_SEASON_COUNT, 1, 64);
        let timeout_secs =
            env_clamped(&lookup, "HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS, 1, 600);
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let path = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };

        Self {
            base_url: text("FOOTBALL_DATA_BASE_URL", &defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            index_path: text("FOOTBALL_DATA_INDEX_PATH", &defaults.index_path)
                .trim_start_matches('/')
                .to_string(),
            league_code: text("FOOTBALL_DATA_LEAGUE", &defaults.league_code),
            season_count,
            input_folder: path("PIPELINE_INPUT_DIR").unwrap_or(defaults.input_folder),
            output_folder: path("PIPELINE_OUTPUT_DIR").unwrap_or(defaults.output_folder),
            file_extension: text("PIPELINE_FILE_EXTENSION", &defaults.file_extension)
                .trim_start_matches('.')
                .to_ascii_lowercase(),
            dataset_name: text("PIPELINE_DATASET_NAME", &defaults.dataset_name),
            output_mode: text("CRAWL_OUTPUT_MODE", &defaults.output_mode),
            http_timeout: Duration::from_secs(timeout_secs),
            http_cache: env_bool(lookup("HTTP_CACHE_ENABLED"), defaults.http_cache),
            column_mapping_path: path("COLUMN_MAPPING_PATH"),
        }
    }

    pub fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index_path)
    }

    /// Where the crawl step writes and the transform step reads.
    pub fn combined_csv_path(&self) -> PathBuf {
        self.input_folder
            .join(format!("{}.{}", self.dataset_name, self.file_extension))
    }

    pub fn team_perspective_csv_path(&self) -> PathBuf {
        self.output_folder.join(format!(
            "{}_team_perspective.{}",
            self.dataset_name, self.file_extension
        ))
    }
}

fn env_clamped<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    min: T,
    max: T,
) -> T
where
    T: FromStr + Ord + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return default;
    };
    let Ok(value) = raw.parse::<T>() else {
        warn!(key, value = %raw, %default, "unparseable setting, using default");
        return default;
    };
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(key, %value, %clamped, "setting out of range, clamped");
    }
    clamped
}

fn env_bool(raw: Option<String>, default: bool) -> bool {
    raw.map(|v| {
        let t = v.trim().to_ascii_lowercase();
        !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
    })
    .unwrap_or(default)
}
