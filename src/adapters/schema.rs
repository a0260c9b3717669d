//! Schema resolution
//!
//! Turns loosely-typed input rows into typed observations at the boundary.
//! Column names are normalized, each logical field is looked up among a list
//! of candidate columns, and cells are parsed leniently: numbers may be
//! strings with a decimal comma or a trailing `%`, dates may use several
//! layouts or be recovered from the name of the source file.
//!
//! A missing required column fails the whole table. A bad cell only drops
//! its row (unparseable date, empty or invalid code) or becomes missing
//! (numbers).

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Granularity, InstrumentDirectory, Observation};
use crate::ports::RawRecord;

const CODE: &[&str] = &["CODE_ISIN", "ISIN"];
const DAILY_DATE: &[&str] = &["DATE"];
const WEEKLY_DATE: &[&str] = &["WEEK_DATE", "DATE"];
const SOURCE_FILE: &str = "SOURCE_FILE";
const VALUE: &[&str] = &["VL"];
const DAY_RETURN: &[&str] = &["1_JOUR"];
const WEEK_RETURN: &[&str] = &["1_SEMAINE"];
const NAME: &[&str] = &["OPCVM"];
const COMPANY: &[&str] = &["SOCIETE_DE_GESTION"];
const NO_COLUMNS: &[&str] = &[];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Schema error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("table '{table}': missing required field '{field}' (looked for {candidates:?})")]
    MissingField {
        table: String,
        field: &'static str,
        candidates: Vec<&'static str>,
    },

    #[error("invalid code pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Uppercase, trim, spaces to underscores, accented E folded
pub fn normalize_column(name: &str) -> String {
    name.trim()
        .to_uppercase()
        .replace(' ', "_")
        .replace(['É', 'È', 'Ê'], "E")
}

/// Lenient numeric cell parsing; non-finite and empty cells are `None`
pub fn parse_number(cell: &Value) -> Option<f64> {
    let x = match cell {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .replace(',', ".")
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    x.is_finite().then_some(x)
}

pub fn parse_date(cell: &Value) -> Option<NaiveDate> {
    let Value::String(s) = cell else {
        return None;
    };
    let s = s.trim();
    // drop a trailing time component
    let day = s.split(['T', ' ']).next().unwrap_or(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

fn source_file_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d{2})[-_/](\d{2})[-_/](\d{4})").ok())
        .as_ref()
}

/// Day-first date embedded in a file name, e.g. `perf_hebdo_07-03-2025.xlsx`
pub fn date_from_source_file(name: &str) -> Option<NaiveDate> {
    let caps = source_file_pattern()?.captures(name)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn text(cell: &Value) -> Option<String> {
    let s = match cell {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Typed observations for one feed
#[derive(Debug, Clone, Default)]
pub struct ResolvedFeed {
    pub observations: Vec<Observation>,
    pub directory: InstrumentDirectory,
    /// Rows dropped for an unparseable date or an empty/invalid code
    pub dropped_rows: usize,
}

#[derive(Debug, Clone)]
struct Columns {
    code: &'static str,
    date: Option<&'static str>,
    source_file: bool,
    value: Option<&'static str>,
    period_return: Option<&'static str>,
    week_return: Option<&'static str>,
    name: Option<&'static str>,
    company: Option<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    code_pattern: Option<Regex>,
}

impl SchemaResolver {
    pub fn new(code_pattern: Option<&str>) -> Result<Self, SchemaError> {
        let code_pattern = code_pattern
            .map(|p| {
                Regex::new(p).map_err(|e| SchemaError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self { code_pattern })
    }

    fn columns(
        &self,
        table: &str,
        present: &BTreeSet<String>,
        granularity: Granularity,
    ) -> Result<Columns, SchemaError> {
        let pick = |candidates: &[&'static str]| candidates.iter().copied().find(|c| present.contains(*c));
        let missing = |field: &'static str, candidates: &[&'static str]| SchemaError::MissingField {
            table: table.to_string(),
            field,
            candidates: candidates.to_vec(),
        };

        let code = pick(CODE).ok_or_else(|| missing("code", CODE))?;

        let date_candidates: &[&'static str] = match granularity {
            Granularity::Daily => DAILY_DATE,
            Granularity::Weekly => WEEKLY_DATE,
        };
        let date = pick(date_candidates);
        let source_file = present.contains(SOURCE_FILE);
        if date.is_none() && !source_file {
            let mut candidates = date_candidates.to_vec();
            candidates.push(SOURCE_FILE);
            return Err(missing("date", candidates.as_slice()));
        }

        let (period_candidates, week_candidates): (&[&'static str], &[&'static str]) = match granularity {
            Granularity::Daily => (DAY_RETURN, WEEK_RETURN),
            Granularity::Weekly => (WEEK_RETURN, NO_COLUMNS),
        };
        let value = pick(VALUE);
        let period_return = pick(period_candidates);
        if value.is_none() && period_return.is_none() {
            let mut candidates = VALUE.to_vec();
            candidates.extend_from_slice(period_candidates);
            return Err(missing("value or period return", candidates.as_slice()));
        }

        Ok(Columns {
            code,
            date,
            source_file,
            value,
            period_return,
            week_return: pick(week_candidates),
            name: pick(NAME),
            company: pick(COMPANY),
        })
    }

    fn valid_code(&self, code: &str) -> bool {
        self.code_pattern.as_ref().map_or(true, |re| re.is_match(code))
    }

    /// Resolve every row of a raw table into observations
    pub fn resolve(
        &self,
        table: &str,
        rows: &[RawRecord],
        granularity: Granularity,
    ) -> Result<ResolvedFeed, SchemaError> {
        let normalized: Vec<RawRecord> = rows
            .iter()
            .map(|row| row.iter().map(|(k, v)| (normalize_column(k), v.clone())).collect())
            .collect();
        let present: BTreeSet<String> = normalized.iter().flat_map(|r| r.keys().cloned()).collect();
        let cols = self.columns(table, &present, granularity)?;

        let mut feed = ResolvedFeed::default();
        for row in &normalized {
            let cell = |col: Option<&str>| col.and_then(|c| row.get(c));

            let code = match cell(Some(cols.code)).and_then(text).map(|c| c.to_uppercase()) {
                Some(c) if self.valid_code(&c) => c,
                _ => {
                    feed.dropped_rows += 1;
                    continue;
                }
            };
            let date = cell(cols.date).and_then(parse_date).or_else(|| {
                cols.source_file
                    .then(|| row.get(SOURCE_FILE).and_then(text))
                    .flatten()
                    .and_then(|name| date_from_source_file(&name))
            });
            let Some(date) = date else {
                feed.dropped_rows += 1;
                continue;
            };

            let name = cell(cols.name).and_then(text);
            let company = cell(cols.company).and_then(text).map(|c| c.to_uppercase());
            feed.directory.upsert(&code, name.as_deref(), company.as_deref());

            feed.observations.push(Observation {
                code,
                date,
                value: cell(cols.value).and_then(parse_number),
                period_return_pct: cell(cols.period_return).and_then(parse_number),
                week_return_pct: cell(cols.week_return).and_then(parse_number),
            });
        }

        if feed.dropped_rows > 0 {
            tracing::warn!(
                "table '{}': dropped {} of {} rows (unparseable date or invalid code)",
                table,
                feed.dropped_rows,
                rows.len()
            );
        }
        tracing::info!(
            "table '{}': resolved {} {} observations for {} instruments",
            table,
            feed.observations.len(),
            granularity,
            feed.directory.len()
        );
        Ok(feed)
    }
}
