//! Instruments and raw observations
//!
//! An instrument is a fund identified by its code (ISIN-like). Observations
//! are one row per (instrument, date) at a given granularity.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sampling granularity of an observation stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Daily => write!(f, "daily"),
            Granularity::Weekly => write!(f, "weekly"),
        }
    }
}

/// A tradeable fund
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique instrument code
    pub code: String,
    /// Display name of the fund
    pub name: Option<String>,
    /// Issuing management company
    pub company: Option<String>,
}

impl Instrument {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            company: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Fill attributes that are still unknown. Known attributes are kept.
    pub fn enrich(&mut self, name: Option<&str>, company: Option<&str>) {
        if self.name.is_none() {
            self.name = non_empty(name);
        }
        if self.company.is_none() {
            self.company = non_empty(company);
        }
    }

    pub fn company_matches(&self, pattern: &str) -> bool {
        company_contains(self.company.as_deref(), pattern)
    }
}

/// Case-insensitive substring match on a company attribute; unknown never matches
pub fn company_contains(company: Option<&str>, pattern: &str) -> bool {
    let pattern = pattern.to_uppercase();
    company
        .map(|c| c.to_uppercase().contains(&pattern))
        .unwrap_or(false)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Instrument lookup keyed by code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentDirectory {
    instruments: BTreeMap<String, Instrument>,
}

impl InstrumentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument or enrich the existing entry
    pub fn upsert(&mut self, code: &str, name: Option<&str>, company: Option<&str>) {
        self.instruments
            .entry(code.to_string())
            .or_insert_with(|| Instrument::new(code))
            .enrich(name, company);
    }

    /// Merge another directory in without overwriting known attributes
    pub fn merge(&mut self, other: &InstrumentDirectory) {
        for inst in other.iter() {
            self.upsert(&inst.code, inst.name.as_deref(), inst.company.as_deref());
        }
    }

    pub fn get(&self, code: &str) -> Option<&Instrument> {
        self.instruments.get(code)
    }

    pub fn name_of(&self, code: &str) -> Option<String> {
        self.get(code).and_then(|i| i.name.clone())
    }

    pub fn company_of(&self, code: &str) -> Option<String> {
        self.get(code).and_then(|i| i.company.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// One performance observation for an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub code: String,
    pub date: NaiveDate,
    /// Net asset value
    pub value: Option<f64>,
    /// Reported return over the observation period, in percent
    pub period_return_pct: Option<f64>,
    /// Reported one-week performance, in percent (daily feeds only)
    pub week_return_pct: Option<f64>,
}

impl Observation {
    pub fn new(code: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            code: code.into(),
            date,
            value: None,
            period_return_pct: None,
            week_return_pct: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_period_return(mut self, pct: f64) -> Self {
        self.period_return_pct = Some(pct);
        self
    }

    pub fn with_week_return(mut self, pct: f64) -> Self {
        self.week_return_pct = Some(pct);
        self
    }
}

/// Sort by (code, date) and drop duplicate keys keeping the last written row.
///
/// Returns the cleaned observations and the number of duplicates removed.
pub fn sort_and_dedup(mut observations: Vec<Observation>) -> (Vec<Observation>, usize) {
    // stable sort keeps input order among equal keys, so the last one wins below
    observations.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));

    let before = observations.len();
    let mut out: Vec<Observation> = Vec::with_capacity(before);
    for obs in observations {
        match out.last_mut() {
            Some(last) if last.code == obs.code && last.date == obs.date => *last = obs,
            _ => out.push(obs),
        }
    }
    let removed = before - out.len();
    (out, removed)
}

/// Split a slice sorted by code into contiguous per-instrument partitions
pub fn partition_by_code<T, F>(rows: &[T], code_of: F) -> Vec<&[T]>
where
    F: Fn(&T) -> &str,
{
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        if i == rows.len() || code_of(&rows[i]) != code_of(&rows[start]) {
            if i > start {
                parts.push(&rows[start..i]);
            }
            start = i;
        }
    }
    parts
}
