use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::{PipelineError, Result};

/// String-celled table; an empty cell is a missing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MatchTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Parses CSV text with a header row. `origin` names the source in errors.
    pub fn from_csv_str(raw: &str, origin: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(raw.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| PipelineError::parse(origin, format!("header row: {e}")))?
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                let h = if idx == 0 {
                    h.trim_start_matches('\u{feff}')
                } else {
                    h
                };
                h.trim().to_string()
            })
            .collect::<Vec<_>>();

        let width = headers.len();
        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record
                .map_err(|e| PipelineError::parse(origin, format!("record {}: {e}", idx + 1)))?;
            let mut row = record
                .iter()
                .take(width)
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_csv_str(&raw, &path.display().to_string())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let mut wtr = WriterBuilder::new()
            .from_path(path)
            .map_err(|e| csv_write_error(path, e))?;
        wtr.write_record(&self.headers)
            .map_err(|e| csv_write_error(path, e))?;
        for row in &self.rows {
            wtr.write_record(row).map_err(|e| csv_write_error(path, e))?;
        }
        wtr.flush().map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx)).map(String::as_str)
    }

    /// Names from `required` that are not columns of this table.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Row-wise union aligned by column name. Columns only present in `other`
    /// are appended after the existing ones; absent cells are left empty.
    pub fn append(&mut self, other: MatchTable) {
        if self.headers.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mut positions = self
            .headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.clone(), idx))
            .collect::<HashMap<_, _>>();
        let mut mapping = Vec::with_capacity(other.headers.len());
        for header in &other.headers {
            let idx = match positions.get(header) {
                Some(idx) => *idx,
                None => {
                    let idx = self.headers.len();
                    self.headers.push(header.clone());
                    positions.insert(header.clone(), idx);
                    idx
                }
            };
            mapping.push(idx);
        }

        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        for row in other.rows {
            let mut aligned = vec![String::new(); width];
            for (cell, idx) in row.into_iter().zip(&mapping) {
                aligned[*idx] = cell;
            }
            self.rows.push(aligned);
        }
    }

    /// Drops rows where any of `columns` is empty or absent. Returns the count removed.
    pub fn drop_rows_missing(&mut self, columns: &[&str]) -> usize {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Vec<_>>();
        let before = self.rows.len();
        self.rows.retain(|row| {
            indices.iter().all(|idx| {
                idx.and_then(|i| row.get(i))
                    .is_some_and(|cell| !cell.trim().is_empty())
            })
        });
        before - self.rows.len()
    }
}

fn csv_write_error(path: &Path, err: csv::Error) -> PipelineError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => PipelineError::io(path, source),
        other => PipelineError::parse(
            path.display().to_string(),
            format!("csv write failed: {other:?}"),
        ),
    }
}
