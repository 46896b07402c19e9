use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::error::VizError;

/// Which update scheme a log was written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Bayes,
    Ema,
}

impl LogMode {
    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            LogMode::Bayes => &["key", "value", "reward"],
            LogMode::Ema => &["key", "value"],
        }
    }
}

/// One logged row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: String,
    pub value: String,
    pub reward: Option<f64>,
    /// `None` when the cell was present but not numeric.
    pub new_prior: Option<f64>,
    pub mode: String,
    pub timestamp: String,
    /// Position of the row in the whole log.
    pub global_iter: u64,
    /// Occurrence count of the row's key up to this row.
    pub key_iter: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTable {
    pub rows: Vec<Observation>,
}

impl LogTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Distinct keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn with_mode(self, mode: &str) -> LogTable {
        LogTable {
            rows: self.rows.into_iter().filter(|row| row.mode == mode).collect(),
        }
    }

    /// Reorders rows by timestamp and renumbers both iteration counters.
    pub fn sorted_by_timestamp(self) -> LogTable {
        let stamps: Vec<&str> = self.rows.iter().map(|row| row.timestamp.as_str()).collect();
        let order = timestamp_order(&stamps);
        let mut slots: Vec<Option<Observation>> = self.rows.into_iter().map(Some).collect();
        LogTable::numbered(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    fn numbered(mut rows: Vec<Observation>) -> LogTable {
        let mut per_key: HashMap<String, u64> = HashMap::new();
        for (i, row) in rows.iter_mut().enumerate() {
            row.global_iter = i as u64;
            let count = per_key.entry(row.key.clone()).or_insert(0);
            row.key_iter = *count;
            *count += 1;
        }
        LogTable { rows }
    }

    pub fn max_global_iter(&self) -> Option<u64> {
        self.rows.iter().map(|row| row.global_iter).max()
    }

    /// Rows of `key` grouped by value. Values keep their first-seen order and
    /// rows keep log order within a value.
    pub fn values_for<'a>(&'a self, key: &str) -> Vec<(&'a str, Vec<&'a Observation>)> {
        let mut groups: Vec<(&str, Vec<&Observation>)> = Vec::new();
        for row in self.rows.iter().filter(|row| row.key == key) {
            match groups.iter_mut().find(|(value, _)| *value == row.value) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((row.value.as_str(), vec![row])),
            }
        }
        groups
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRow {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    reward: Option<String>,
    #[serde(default)]
    new_prior: Option<String>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

struct RawLog {
    columns: Vec<String>,
    rows: Vec<RawRow>,
}

/// Loads a log for `mode`, rows in file order.
///
/// A missing or malformed file is logged and yields an empty table. A file
/// that reads fine but lacks a required column is a [`VizError::Schema`].
pub fn read_log(path: &Path, mode: LogMode, delimiter: u8) -> Result<LogTable, VizError> {
    match try_read_log(path, mode, delimiter) {
        Err(err @ VizError::MissingFileOrParse { .. }) => {
            log::warn!("{}", err);
            Ok(LogTable::default())
        }
        other => other,
    }
}

/// Like [`read_log`], but a missing or malformed file is a
/// [`VizError::MissingFileOrParse`].
pub fn try_read_log(path: &Path, mode: LogMode, delimiter: u8) -> Result<LogTable, VizError> {
    let raw = read_raw(path, delimiter)?;
    check_schema(&raw.columns, mode)?;
    let table = normalize(raw, mode);
    log::debug!("{}: {} observations", path.display(), table.len());
    Ok(table)
}

fn read_raw(path: &Path, delimiter: u8) -> Result<RawLog, VizError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(false)
        .from_path(path)
        .map_err(|err| VizError::load(path, err))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| VizError::load(path, err))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    reader.set_headers(csv::StringRecord::from(columns.clone()));

    let rows = reader
        .deserialize::<RawRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| VizError::load(path, err))?;

    Ok(RawLog { columns, rows })
}

fn check_schema(columns: &[String], mode: LogMode) -> Result<(), VizError> {
    let required = mode.required_columns();
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|name| !columns.iter().any(|c| c == name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(VizError::Schema {
            required: required.to_vec(),
            missing,
        })
    }
}

fn normalize(raw: RawLog, mode: LogMode) -> LogTable {
    let has_column = |name: &str| raw.columns.iter().any(|c| c == name);
    let has_new_prior = has_column("new_prior");
    let has_mode = has_column("mode");
    let has_timestamp = has_column("timestamp");

    let mut rows = Vec::with_capacity(raw.rows.len());
    for (line, row) in raw.rows.into_iter().enumerate() {
        let (Some(key), Some(value)) = (row.key, row.value) else {
            log::warn!("row {}: missing key or value, skipped", line + 1);
            continue;
        };

        // an empty reward cell is kept and counts as a failure
        let reward_cell = row.reward.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let reward = reward_cell.and_then(parse_number);
        if mode == LogMode::Bayes && reward_cell.is_some() && reward.is_none() {
            log::warn!("row {}: reward {:?} is not numeric, skipped", line + 1, row.reward);
            continue;
        }

        let new_prior = if has_new_prior {
            row.new_prior.as_deref().and_then(parse_number)
        } else {
            Some(0.0)
        };
        let mode_name = if has_mode {
            row.mode.unwrap_or_default().trim().to_string()
        } else {
            "ema".to_string()
        };
        let timestamp = if has_timestamp {
            row.timestamp.unwrap_or_default()
        } else {
            rows.len().to_string()
        };

        rows.push(Observation {
            key,
            value,
            reward,
            new_prior,
            mode: mode_name,
            timestamp,
            global_iter: 0,
            key_iter: 0,
        });
    }

    LogTable::numbered(rows)
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Stable sort permutation for a timestamp column. The whole column is
/// compared numerically if every cell is a number, chronologically if every
/// cell is a datetime, and as text otherwise.
fn timestamp_order(stamps: &[&str]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..stamps.len()).collect();
    if let Some(numbers) = stamps.iter().map(|s| parse_number(s)).collect::<Option<Vec<_>>>() {
        order.sort_by(|&a, &b| numbers[a].total_cmp(&numbers[b]));
    } else if let Some(times) = stamps.iter().map(|s| parse_datetime(s)).collect::<Option<Vec<_>>>() {
        order.sort_by_key(|&i| times[i]);
    } else {
        order.sort_by(|&a, &b| stamps[a].cmp(stamps[b]));
    }
    order
}
