use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use football_etl::PipelineError;
use football_etl::column_mapping::{ColumnMappings, HOME_AWAY_FLAG};
use football_etl::config::PipelineConfig;
use football_etl::crawler::Fetch;
use football_etl::pipeline::{CRAWL_TASK, TRANSFORM_TASK, football_pipeline};
use football_etl::table::MatchTable;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

struct FixtureSite {
    pages: HashMap<String, String>,
}

impl FixtureSite {
    fn new(seasons: &[(&str, &str)]) -> Self {
        let mut pages = HashMap::new();
        pages.insert(
            "https://www.football-data.co.uk/englandm.php".to_string(),
            read_fixture("englandm.html"),
        );
        for (season, fixture) in seasons {
            pages.insert(
                format!("https://www.football-data.co.uk/mmz4281/{season}/E0.csv"),
                read_fixture(fixture),
            );
        }
        Self { pages }
    }
}

impl Fetch for FixtureSite {
    fn fetch_text(&self, url: &str) -> football_etl::Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::fetch(url, "http 404 Not Found"))
    }
}

fn config_in(dir: &std::path::Path, season_count: usize) -> PipelineConfig {
    PipelineConfig {
        season_count,
        input_folder: dir.join("raw"),
        output_folder: dir.join("processed"),
        http_cache: false,
        ..PipelineConfig::default()
    }
}

#[test]
fn crawl_then_transform_writes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let site = FixtureSite::new(&[
        ("2324", "season_2324_E0.csv"),
        ("2223", "season_2223_E0.csv"),
    ]);

    let mut pipeline =
        football_pipeline(site, &config, ColumnMappings::football_data()).unwrap();
    assert_eq!(
        pipeline.execution_order().unwrap(),
        vec![CRAWL_TASK, TRANSFORM_TASK]
    );
    let summary = pipeline.run().expect("pipeline should succeed");
    assert_eq!(summary.executed, vec![CRAWL_TASK, TRANSFORM_TASK]);
    assert!(pipeline.is_complete(CRAWL_TASK));
    assert!(pipeline.is_complete(TRANSFORM_TASK));

    let combined = MatchTable::read_csv(&config.combined_csv_path()).unwrap();
    assert_eq!(combined.len(), 5);

    let flat = MatchTable::read_csv(&config.team_perspective_csv_path()).unwrap();
    assert_eq!(flat.len(), combined.len() * 2);
    let homes = (0..flat.len())
        .filter(|i| flat.value(*i, HOME_AWAY_FLAG) == Some("home"))
        .count();
    assert_eq!(homes, combined.len());
    assert!(flat.column_index("pinnacle_team_win_odds").is_some());
}

#[test]
fn crawl_failure_stops_before_transform() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let site = FixtureSite::new(&[("2324", "season_2324_E0.csv")]);

    let mut pipeline =
        football_pipeline(site, &config, ColumnMappings::football_data()).unwrap();
    let err = pipeline.run().expect_err("missing season should fail the run");
    assert!(matches!(err, PipelineError::Fetch { .. }));
    assert!(!pipeline.is_complete(CRAWL_TASK));
    assert!(!pipeline.is_complete(TRANSFORM_TASK));
    assert!(!config.combined_csv_path().exists());
    assert!(!config.team_perspective_csv_path().exists());
}

#[test]
fn table_mode_leaves_transform_without_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        output_mode: "table".to_string(),
        ..config_in(dir.path(), 1)
    };
    let site = FixtureSite::new(&[("2324", "season_2324_E0.csv")]);

    let mut pipeline =
        football_pipeline(site, &config, ColumnMappings::football_data()).unwrap();
    let err = pipeline.run().expect_err("transform has no input file");
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(pipeline.is_complete(CRAWL_TASK));
    assert!(!pipeline.is_complete(TRANSFORM_TASK));
}
