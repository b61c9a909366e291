//! Rename tables from football-data short codes to team-perspective names.
//!
//! The forward table reads a match from the home side ("team" is the home
//! club), the reverse table from the away side. Both tables share the same
//! source codes and the same output names, so the two views line up column
//! for column when they are stacked.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const HOME_AWAY_FLAG: &str = "team_home_away_flag";
pub const FULL_TIME_DIFFERENCE: &str = "full_time_results_difference";
pub const FULL_TIME_RESULT: &str = "full_time_result";
pub const HALF_TIME_DIFFERENCE: &str = "half_time_results_difference";
pub const HALF_TIME_RESULT: &str = "half_time_result";

/// Columns appended by the transform, in output order.
pub const DERIVED_COLUMNS: [&str; 5] = [
    HOME_AWAY_FLAG,
    FULL_TIME_DIFFERENCE,
    FULL_TIME_RESULT,
    HALF_TIME_DIFFERENCE,
    HALF_TIME_RESULT,
];

/// One rename table, source code -> output name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    entries: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn codes(&self) -> BTreeSet<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    /// Output name -> source code. Only meaningful for a table with unique names.
    pub fn inverse(&self) -> ColumnMapping {
        ColumnMapping {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (v.clone(), k.clone()))
                .collect(),
        }
    }

    fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.entries.insert(code.into(), name.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMappings {
    pub forward: ColumnMapping,
    pub reverse: ColumnMapping,
    /// Known codes that have no team-perspective meaning.
    #[serde(default)]
    pub drop: BTreeSet<String>,
}

enum Entry {
    Shared(String, String),
    Sided {
        home: String,
        away: String,
        team: String,
        opponent: String,
    },
}

fn shared(code: &str, name: &str) -> Entry {
    Entry::Shared(code.to_string(), name.to_string())
}

fn sided(home: &str, away: &str, stat: &str) -> Entry {
    Entry::Sided {
        home: home.to_string(),
        away: away.to_string(),
        team: format!("team_{stat}"),
        opponent: format!("opponent_{stat}"),
    }
}

// 1X2 bookmaker prefixes as they appear in the site's headers, e.g. B365H/B365D/B365A.
const MATCH_ODDS_PREFIXES: &[(&str, &str)] = &[
    ("B365", "bet365"),
    ("BS", "blue_square"),
    ("BW", "bet_and_win"),
    ("GB", "gamebookers"),
    ("IW", "interwetten"),
    ("LB", "ladbrokes"),
    ("PS", "pinnacle"),
    ("SO", "sporting_odds"),
    ("SB", "sportingbet"),
    ("SJ", "stan_james"),
    ("SY", "stanleybet"),
    ("VC", "vc_bet"),
    ("WH", "william_hill"),
    ("BbMx", "betbrain_max"),
    ("BbAv", "betbrain_average"),
    ("Max", "market_max"),
    ("Avg", "market_average"),
    ("B365C", "bet365_closing"),
    ("BWC", "bet_and_win_closing"),
    ("IWC", "interwetten_closing"),
    ("PSC", "pinnacle_closing"),
    ("WHC", "william_hill_closing"),
    ("VCC", "vc_bet_closing"),
    ("MaxC", "market_max_closing"),
    ("AvgC", "market_average_closing"),
    ("1XB", "one_x_bet"),
    ("1XBC", "one_x_bet_closing"),
];

// Over/under and Asian handicap columns use "P" rather than "PS" for Pinnacle.
const GOAL_MARKET_PREFIXES: &[(&str, &str)] = &[
    ("B365", "bet365"),
    ("P", "pinnacle"),
    ("GB", "gamebookers"),
    ("BbMx", "betbrain_max"),
    ("BbAv", "betbrain_average"),
    ("Max", "market_max"),
    ("Avg", "market_average"),
    ("B365C", "bet365_closing"),
    ("PC", "pinnacle_closing"),
    ("MaxC", "market_max_closing"),
    ("AvgC", "market_average_closing"),
];

const DROPPED_CODES: &[&str] = &["FTR", "HTR", "AHh", "AHCh", "BbAHh", "Bb1X2", "BbOU", "BbAH"];

fn football_data_entries() -> Vec<Entry> {
    let mut entries = vec![
        shared("Div", "division"),
        shared("Date", "date"),
        shared("Time", "kick_off_time"),
        shared("Referee", "referee"),
        shared("Attendance", "attendance"),
        Entry::Sided {
            home: "HomeTeam".to_string(),
            away: "AwayTeam".to_string(),
            team: "team".to_string(),
            opponent: "opponent".to_string(),
        },
        Entry::Sided {
            home: "FTHG".to_string(),
            away: "FTAG".to_string(),
            team: "full_time_team_goals".to_string(),
            opponent: "full_time_opponent_goals".to_string(),
        },
        Entry::Sided {
            home: "HTHG".to_string(),
            away: "HTAG".to_string(),
            team: "half_time_team_goals".to_string(),
            opponent: "half_time_opponent_goals".to_string(),
        },
        sided("HS", "AS", "shots"),
        sided("HST", "AST", "shots_on_target"),
        sided("HHW", "AHW", "hit_woodwork"),
        sided("HC", "AC", "corners"),
        sided("HF", "AF", "fouls_committed"),
        sided("HFKC", "AFKC", "free_kicks_conceded"),
        sided("HO", "AO", "offsides"),
        sided("HY", "AY", "yellow_cards"),
        sided("HR", "AR", "red_cards"),
        sided("HBP", "ABP", "booking_points"),
    ];

    for (code, name) in MATCH_ODDS_PREFIXES {
        entries.push(Entry::Sided {
            home: format!("{code}H"),
            away: format!("{code}A"),
            team: format!("{name}_team_win_odds"),
            opponent: format!("{name}_opponent_win_odds"),
        });
        entries.push(shared(&format!("{code}D"), &format!("{name}_draw_odds")));
    }

    for (code, name) in GOAL_MARKET_PREFIXES {
        entries.push(shared(
            &format!("{code}>2.5"),
            &format!("{name}_over_2_5_goals_odds"),
        ));
        entries.push(shared(
            &format!("{code}<2.5"),
            &format!("{name}_under_2_5_goals_odds"),
        ));
        entries.push(Entry::Sided {
            home: format!("{code}AHH"),
            away: format!("{code}AHA"),
            team: format!("{name}_asian_handicap_team_odds"),
            opponent: format!("{name}_asian_handicap_opponent_odds"),
        });
    }

    entries
}

impl ColumnMappings {
    /// Tables for the football-data.co.uk match files.
    pub fn football_data() -> Self {
        let mut forward = ColumnMapping::default();
        let mut reverse = ColumnMapping::default();
        for entry in football_data_entries() {
            match entry {
                Entry::Shared(code, name) => {
                    forward.insert(code.clone(), name.clone());
                    reverse.insert(code, name);
                }
                Entry::Sided {
                    home,
                    away,
                    team,
                    opponent,
                } => {
                    forward.insert(home.clone(), team.clone());
                    forward.insert(away.clone(), opponent.clone());
                    reverse.insert(home, opponent);
                    reverse.insert(away, team);
                }
            }
        }
        let drop = DROPPED_CODES.iter().map(|c| c.to_string()).collect();
        Self {
            forward,
            reverse,
            drop,
        }
    }

    /// Loads tables from JSON: `{"forward": {..}, "reverse": {..}, "drop": [..]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mappings = serde_json::from_str::<Self>(&raw)
            .map_err(|e| PipelineError::parse(path.display().to_string(), e.to_string()))?;
        mappings.validate()?;
        Ok(mappings)
    }

    /// The override file when one is given, the built-in tables otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => {
                let mappings = Self::football_data();
                mappings.validate()?;
                Ok(mappings)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.forward.codes() != self.reverse.codes() {
            let diff = self
                .forward
                .codes()
                .symmetric_difference(&self.reverse.codes())
                .map(|c| c.to_string())
                .collect::<Vec<_>>();
            return Err(PipelineError::Mapping(format!(
                "forward and reverse tables map different codes: {diff:?}"
            )));
        }
        for (label, table) in [("forward", &self.forward), ("reverse", &self.reverse)] {
            let mut seen = HashSet::new();
            for (code, name) in table.iter() {
                if !seen.insert(name) {
                    return Err(PipelineError::Mapping(format!(
                        "{label} table maps more than one code to {name:?} (at {code:?})"
                    )));
                }
                if DERIVED_COLUMNS.contains(&name) {
                    return Err(PipelineError::Mapping(format!(
                        "{label} table maps {code:?} onto derived column {name:?}"
                    )));
                }
            }
        }
        if self.forward.names() != self.reverse.names() {
            return Err(PipelineError::Mapping(
                "forward and reverse tables produce different column names".to_string(),
            ));
        }
        if let Some(code) = self.drop.iter().find(|c| self.forward.get(c).is_some()) {
            return Err(PipelineError::Mapping(format!(
                "{code:?} is both mapped and dropped"
            )));
        }
        Ok(())
    }

    pub fn is_dropped(&self, code: &str) -> bool {
        self.drop.contains(code)
    }
}
