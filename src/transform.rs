//! Reshapes one-row-per-match tables into one row per team per match.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::column_mapping::{
    ColumnMapping, ColumnMappings, FULL_TIME_DIFFERENCE, FULL_TIME_RESULT, HALF_TIME_DIFFERENCE,
    HALF_TIME_RESULT, HOME_AWAY_FLAG,
};
use crate::error::{PipelineError, Result};
use crate::table::MatchTable;

pub const REQUIRED_SOURCE_COLUMNS: [&str; 6] =
    ["HomeTeam", "AwayTeam", "FTHG", "FTAG", "HTHG", "HTAG"];

const FULL_TIME_TEAM_GOALS: &str = "full_time_team_goals";
const FULL_TIME_OPPONENT_GOALS: &str = "full_time_opponent_goals";
const HALF_TIME_TEAM_GOALS: &str = "half_time_team_goals";
const HALF_TIME_OPPONENT_GOALS: &str = "half_time_opponent_goals";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Home,
    Away,
}

impl Perspective {
    pub fn as_str(self) -> &'static str {
        match self {
            Perspective::Home => "home",
            Perspective::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Team,
    Draw,
    Opponent,
}

impl MatchResult {
    pub fn from_difference(difference: i32) -> Self {
        match difference.cmp(&0) {
            Ordering::Greater => MatchResult::Team,
            Ordering::Equal => MatchResult::Draw,
            Ordering::Less => MatchResult::Opponent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchResult::Team => "team",
            MatchResult::Draw => "draw",
            MatchResult::Opponent => "opponent",
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    pub input_rows: usize,
    pub output_rows: usize,
    pub columns: usize,
    pub dropped_columns: Vec<String>,
}

pub struct Flattener<'a> {
    mappings: &'a ColumnMappings,
}

impl<'a> Flattener<'a> {
    pub fn new(mappings: &'a ColumnMappings) -> Self {
        Self { mappings }
    }

    /// Builds the home view then the away view and stacks them, home rows first.
    /// `origin` names the input in errors.
    pub fn flatten(&self, source: &MatchTable, origin: &str) -> Result<MatchTable> {
        let missing = source.missing_columns(&REQUIRED_SOURCE_COLUMNS);
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                origin: origin.to_string(),
                missing,
            });
        }

        let unknown = self.unknown_columns(source);
        if !unknown.is_empty() {
            warn!(columns = ?unknown, "dropping columns with no mapping");
        }

        let mut out = self.view(source, Perspective::Home, origin)?;
        let away = self.view(source, Perspective::Away, origin)?;
        out.append(away);
        Ok(out)
    }

    /// Source columns that are neither mapped nor listed for dropping.
    pub fn unknown_columns(&self, source: &MatchTable) -> Vec<String> {
        source
            .headers
            .iter()
            .filter(|h| self.mappings.forward.get(h).is_none() && !self.mappings.is_dropped(h))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// One renamed, flagged view of every source row.
    pub fn view(
        &self,
        source: &MatchTable,
        perspective: Perspective,
        origin: &str,
    ) -> Result<MatchTable> {
        let mapping = match perspective {
            Perspective::Home => &self.mappings.forward,
            Perspective::Away => &self.mappings.reverse,
        };
        let (headers, keep) = renamed_columns(&source.headers, mapping);
        let mut view = MatchTable::new(headers);
        view.rows = source
            .rows
            .iter()
            .map(|row| keep.iter().map(|idx| row[*idx].clone()).collect())
            .collect();
        add_home_away_flag(&mut view, perspective);
        add_result_flag(
            &mut view,
            (FULL_TIME_TEAM_GOALS, FULL_TIME_OPPONENT_GOALS),
            (FULL_TIME_DIFFERENCE, FULL_TIME_RESULT),
            origin,
        )?;
        add_result_flag(
            &mut view,
            (HALF_TIME_TEAM_GOALS, HALF_TIME_OPPONENT_GOALS),
            (HALF_TIME_DIFFERENCE, HALF_TIME_RESULT),
            origin,
        )?;
        Ok(view)
    }
}

/// Renamed headers and the source indices they came from. Unmapped columns are
/// skipped, and a repeated source header keeps only its first occurrence.
fn renamed_columns(headers: &[String], mapping: &ColumnMapping) -> (Vec<String>, Vec<usize>) {
    let mut names = Vec::new();
    let mut keep = Vec::new();
    let mut seen = BTreeSet::new();
    for (idx, header) in headers.iter().enumerate() {
        let Some(name) = mapping.get(header) else {
            continue;
        };
        if seen.insert(name) {
            names.push(name.to_string());
            keep.push(idx);
        }
    }
    (names, keep)
}

fn add_home_away_flag(view: &mut MatchTable, perspective: Perspective) {
    view.headers.push(HOME_AWAY_FLAG.to_string());
    for row in &mut view.rows {
        row.push(perspective.as_str().to_string());
    }
}

/// Appends the goal difference and result columns, computed row by row.
fn add_result_flag(
    view: &mut MatchTable,
    (team_goals, opponent_goals): (&str, &str),
    (difference_column, result_column): (&str, &str),
    origin: &str,
) -> Result<()> {
    let team_idx = view.column_index(team_goals);
    let opponent_idx = view.column_index(opponent_goals);
    let (Some(team_idx), Some(opponent_idx)) = (team_idx, opponent_idx) else {
        return Err(PipelineError::SchemaMismatch {
            origin: origin.to_string(),
            missing: view.missing_columns(&[team_goals, opponent_goals]),
        });
    };

    let flags = view
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let team = parse_goals(&row[team_idx], origin, row_idx, team_goals)?;
            let opponent = parse_goals(&row[opponent_idx], origin, row_idx, opponent_goals)?;
            Ok(match (team, opponent) {
                (Some(team), Some(opponent)) => {
                    let difference = i32::from(team) - i32::from(opponent);
                    (
                        difference.to_string(),
                        MatchResult::from_difference(difference).to_string(),
                    )
                }
                _ => (String::new(), String::new()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    view.headers.push(difference_column.to_string());
    view.headers.push(result_column.to_string());
    for (row, (difference, result)) in view.rows.iter_mut().zip(flags) {
        row.push(difference);
        row.push(result);
    }
    Ok(())
}

/// Empty cells are missing goals. Integral floats ("2.0") are accepted;
/// negative or oversized counts are not.
pub fn parse_goals(raw: &str, origin: &str, row: usize, column: &str) -> Result<Option<u16>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let invalid = |reason: &str| {
        PipelineError::parse(
            origin,
            format!("row {}: column {column} has {reason} goals {raw:?}", row + 1),
        )
    };
    if let Ok(goals) = raw.parse::<i64>() {
        return u16::try_from(goals)
            .map(Some)
            .map_err(|_| invalid("out of range"));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => {
            if (0.0..=f64::from(u16::MAX)).contains(&v) {
                Ok(Some(v as u16))
            } else {
                Err(invalid("out of range"))
            }
        }
        _ => Err(invalid("non-numeric")),
    }
}

/// Loads the combined match file, flattens it and writes the result.
pub fn process_file_to_csv(
    input: &Path,
    output: &Path,
    mappings: &ColumnMappings,
) -> Result<TransformSummary> {
    let source = MatchTable::read_csv(input)?;
    let flattener = Flattener::new(mappings);
    let dropped_columns = dropped_columns(&source, mappings);
    let flattened = flattener.flatten(&source, &input.display().to_string())?;
    flattened.write_csv(output)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows = flattened.len(),
        "wrote team perspective table"
    );

    Ok(TransformSummary {
        input_rows: source.len(),
        output_rows: flattened.len(),
        columns: flattened.headers.len(),
        dropped_columns,
    })
}

fn dropped_columns(source: &MatchTable, mappings: &ColumnMappings) -> Vec<String> {
    source
        .headers
        .iter()
        .filter(|h| mappings.forward.get(h).is_none())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
