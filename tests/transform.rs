use std::collections::HashSet;
use std::path::PathBuf;

use football_etl::PipelineError;
use football_etl::column_mapping::{
    ColumnMappings, DERIVED_COLUMNS, FULL_TIME_DIFFERENCE, FULL_TIME_RESULT,
    HALF_TIME_DIFFERENCE, HALF_TIME_RESULT, HOME_AWAY_FLAG,
};
use football_etl::crawler::parse_season_csv;
use football_etl::table::MatchTable;
use football_etl::transform::{Flattener, process_file_to_csv};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn season_table() -> MatchTable {
    let raw = std::fs::read_to_string(fixture_path("season_2324_E0.csv"))
        .expect("fixture file should be readable");
    parse_season_csv(&raw, "season_2324_E0.csv").expect("fixture should parse")
}

fn sign_label(difference: &str) -> &'static str {
    let value = difference.parse::<i32>().expect("numeric difference");
    if value > 0 {
        "team"
    } else if value == 0 {
        "draw"
    } else {
        "opponent"
    }
}

#[test]
fn two_match_scenario_produces_four_rows() {
    let mappings = ColumnMappings::football_data();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("flat.csv");

    let summary = process_file_to_csv(&fixture_path("matches.csv"), &output, &mappings)
        .expect("transform should succeed");
    assert_eq!(summary.input_rows, 2);
    assert_eq!(summary.output_rows, 4);

    let out = MatchTable::read_csv(&output).unwrap();
    assert_eq!(out.len(), 4);

    assert_eq!(out.value(0, "team"), Some("A"));
    assert_eq!(out.value(0, HOME_AWAY_FLAG), Some("home"));
    assert_eq!(out.value(0, FULL_TIME_RESULT), Some("team"));
    assert_eq!(out.value(0, HALF_TIME_RESULT), Some("draw"));

    assert_eq!(out.value(2, "team"), Some("B"));
    assert_eq!(out.value(2, "opponent"), Some("A"));
    assert_eq!(out.value(2, HOME_AWAY_FLAG), Some("away"));
    assert_eq!(out.value(2, FULL_TIME_RESULT), Some("opponent"));
    assert_eq!(out.value(2, FULL_TIME_DIFFERENCE), Some("-1"));

    for row in [1, 3] {
        assert_eq!(out.value(row, FULL_TIME_RESULT), Some("draw"));
        assert_eq!(out.value(row, HALF_TIME_RESULT), Some("draw"));
    }
    assert_eq!(out.value(1, "team"), Some("C"));
    assert_eq!(out.value(3, "team"), Some("D"));
}

#[test]
fn output_doubles_rows_and_flags_agree_with_differences() {
    let mappings = ColumnMappings::football_data();
    let source = season_table();
    let out = Flattener::new(&mappings)
        .flatten(&source, "season")
        .expect("flatten should succeed");
    assert_eq!(out.len(), source.len() * 2);

    for row in 0..out.len() {
        let flag = out.value(row, HOME_AWAY_FLAG).unwrap();
        let expected_flag = if row < source.len() { "home" } else { "away" };
        assert_eq!(flag, expected_flag);

        let ft = out.value(row, FULL_TIME_DIFFERENCE).unwrap();
        assert_eq!(out.value(row, FULL_TIME_RESULT), Some(sign_label(ft)));
        let ht = out.value(row, HALF_TIME_DIFFERENCE).unwrap();
        assert_eq!(out.value(row, HALF_TIME_RESULT), Some(sign_label(ht)));
    }

    // Burnley 0-3 Man City, from both sides.
    assert_eq!(out.value(0, "team"), Some("Burnley"));
    assert_eq!(out.value(0, FULL_TIME_RESULT), Some("opponent"));
    assert_eq!(out.value(3, "team"), Some("Man City"));
    assert_eq!(out.value(3, FULL_TIME_RESULT), Some("team"));
    assert_eq!(out.value(3, "team_shots"), Some("17"));
    assert_eq!(out.value(3, "opponent_shots"), Some("6"));
    assert_eq!(out.value(3, "bet365_team_win_odds"), Some("1.33"));
    assert_eq!(out.value(3, "bet365_draw_odds"), Some("5.50"));
    assert_eq!(out.value(3, "date"), Some("2023-08-11"));
}

#[test]
fn output_columns_are_unique_and_map_back_to_source() {
    let mappings = ColumnMappings::football_data();
    let source = season_table();
    let out = Flattener::new(&mappings).flatten(&source, "season").unwrap();

    let unique = out.headers.iter().collect::<HashSet<_>>();
    assert_eq!(unique.len(), out.headers.len());
    assert_eq!(&out.headers[out.headers.len() - 5..], &DERIVED_COLUMNS);

    let inverse = mappings.forward.inverse();
    let renamed = &out.headers[..out.headers.len() - 5];
    let recovered = renamed
        .iter()
        .map(|name| inverse.get(name).expect("every renamed column maps back"))
        .collect::<Vec<_>>();
    let expected = source
        .headers
        .iter()
        .filter(|h| mappings.forward.get(h).is_some())
        .map(String::as_str)
        .collect::<Vec<_>>();
    assert_eq!(recovered, expected);

    for dropped in ["FTR", "HTR", "AHh"] {
        assert!(out.column_index(dropped).is_none());
    }
}

#[test]
fn mixed_outcomes_keep_per_row_results() {
    let raw = "HomeTeam,AwayTeam,FTHG,FTAG,HTHG,HTAG\n\
               A,B,1,0,0,0\n\
               C,D,0,1,1,0\n\
               E,F,2,2,0,1\n\
               G,H,4,1,2,2\n";
    let source = MatchTable::from_csv_str(raw, "mixed").unwrap();
    let mappings = ColumnMappings::football_data();
    let out = Flattener::new(&mappings).flatten(&source, "mixed").unwrap();

    let full_time = (0..out.len())
        .map(|i| out.value(i, FULL_TIME_RESULT).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        full_time,
        vec!["team", "opponent", "draw", "team", "opponent", "team", "draw", "opponent"]
    );
    let half_time = (0..out.len())
        .map(|i| out.value(i, HALF_TIME_RESULT).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        half_time,
        vec!["draw", "team", "opponent", "draw", "draw", "opponent", "team", "draw"]
    );
}

#[test]
fn missing_input_file_is_io_error_with_path() {
    let mappings = ColumnMappings::football_data();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("absent.csv");
    let err = process_file_to_csv(&input, &dir.path().join("out.csv"), &mappings)
        .expect_err("missing input should fail");
    assert!(matches!(err, PipelineError::Io { ref path, .. } if path == &input));
    assert!(err.to_string().contains("absent.csv"));
}

#[test]
fn input_without_goal_columns_is_schema_mismatch() {
    let mappings = ColumnMappings::football_data();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("teams_only.csv");
    std::fs::write(&input, "HomeTeam,AwayTeam\nA,B\n").unwrap();
    let err = process_file_to_csv(&input, &dir.path().join("out.csv"), &mappings)
        .expect_err("schema mismatch expected");
    match err {
        PipelineError::SchemaMismatch { missing, .. } => {
            assert_eq!(missing, vec!["FTHG", "FTAG", "HTHG", "HTAG"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}
