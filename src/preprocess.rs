//! Query preprocessing
//!
//! Pure text transforms applied before a query reaches the validator:
//! symbolic date-token substitution and row-limit injection. Neither
//! transform can fail; at worst the query passes through unchanged.

use chrono::{Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::config::DEFAULT_ROW_LIMIT;

/// Symbolic date tokens and their offset in days from today.
pub const DATE_TOKENS: &[(&str, i64)] = &[
    ("{{TODAY}}", 0),
    ("{{DATE_MINUS_30_DAYS}}", 30),
    ("{{DATE_MINUS_90_DAYS}}", 90),
    ("{{DATE_MINUS_6_MONTHS}}", 182),
    ("{{DATE_MINUS_1_YEAR}}", 365),
    ("{{DATE_MINUS_2_YEARS}}", 730),
    ("{{DATE_MINUS_3_YEARS}}", 1095),
    ("{{DATE_MINUS_5_YEARS}}", 1825),
    ("{{DATE_MINUS_7_YEARS}}", 2555),
    ("{{DATE_MINUS_10_YEARS}}", 3650),
];

lazy_static! {
    static ref BRACKETED_TOKEN: Regex = Regex::new(r"\{\{.*?\}\}").unwrap();
    static ref LIMIT_CLAUSE: Regex = Regex::new(r"(?i)\bLIMIT\b").unwrap();
}

/// Preprocessed query plus warnings about tokens that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub query: String,
    pub warnings: Vec<String>,
}

/// Replace every known `{{...}}` date token with the ISO date computed from
/// `today`. Unrecognized tokens are left intact and reported.
pub fn substitute_dates(query: &str, today: NaiveDate) -> (String, Vec<String>) {
    let mut out = query.to_string();

    for (token, offset_days) in DATE_TOKENS {
        if out.contains(token) {
            let date = today - Duration::days(*offset_days);
            out = out.replace(token, &date.format("%Y-%m-%d").to_string());
        }
    }

    let warnings: Vec<String> = BRACKETED_TOKEN
        .find_iter(&out)
        .map(|m| format!("unresolved template variable: {}", m.as_str()))
        .collect();
    for w in &warnings {
        warn!("{}", w);
    }

    (out, warnings)
}

/// Append a `LIMIT` clause when the query has none. Multi-statement queries
/// get the clause on the last non-empty statement only, preserving trailing
/// empty statements.
pub fn apply_row_limit(query: &str, limit: u64) -> String {
    if LIMIT_CLAUSE.is_match(query) {
        return query.to_string();
    }

    if query.contains(';') {
        let mut statements: Vec<String> = query.split(';').map(|s| s.to_string()).collect();
        if let Some(last) = statements.iter().rposition(|s| !s.trim().is_empty()) {
            statements[last] = format!("{} LIMIT {}", statements[last], limit);
            return statements.join(";");
        }
    }

    format!("{} LIMIT {}", query, limit)
}

/// Strip comments and escape sequences that the query service rejects.
pub fn sanitize(query: &str) -> String {
    let mut lines = Vec::new();
    for line in query.lines() {
        let line = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    lines
        .join("\n")
        .replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
        .trim()
        .to_string()
}

/// Full preprocessing pass: date substitution, then row-limit injection.
pub fn preprocess(query: &str, today: NaiveDate, limit: u64) -> Preprocessed {
    let (substituted, warnings) = substitute_dates(query, today);
    let query = apply_row_limit(&substituted, limit);
    Preprocessed { query, warnings }
}

/// Preprocess with the default row limit and the current date.
pub fn preprocess_now(query: &str) -> Preprocessed {
    preprocess(query, chrono::Local::now().date_naive(), DEFAULT_ROW_LIMIT)
}
