//! Reading the shared whitelist file.
//!
//! The control plane writes one `method,path,query,servers` row per line.
//! Its writer may leave quotes, brackets, padding and a trailing NUL around
//! fields; those are stripped before a row is interpreted.

use std::io;
use std::path::{Path, PathBuf};

use crate::domain::key::{normalize_query, KeyError, RequestKey};
use crate::whitelist::permitted::PermittedServers;

/// Characters removed from every field.
const STRIPPED: &[char] = &['[', ']', ' ', '"', '\0', '\r', '\t'];

/// Number of columns in a well-formed row.
const COLUMNS: usize = 4;

/// The whitelist file could not be read.
#[derive(Debug, thiserror::Error)]
#[error("failed to read whitelist file {path:?}: {source}")]
pub struct SourceError {
    /// File that was being read.
    pub path: PathBuf,
    /// Underlying I/O failure.
    #[source]
    pub source: io::Error,
}

/// One well-formed row of the whitelist file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistRow {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query without its leading `?`, or `None` for requests without one.
    pub query: Option<String>,
    /// Servers allowed to handle the request.
    pub servers: PermittedServers,
}

impl WhitelistRow {
    /// Build a row from already-clean parts.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        query: Option<&str>,
        servers: PermittedServers,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: query.map(str::to_string),
            servers,
        }
    }

    /// The canonical key this row is stored under.
    pub fn key(&self, max_len: usize) -> Result<RequestKey, KeyError> {
        RequestKey::from_parts(&self.method, &self.path, self.query.as_deref(), max_len)
    }
}

/// Why a line was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// The line did not have exactly four columns.
    ColumnCount(usize),
    /// The method column was empty.
    MissingMethod,
    /// The path column was empty.
    MissingPath,
    /// The servers column held no tokens.
    MissingServers,
}

/// A skipped line and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedRow {
    /// One-based line number.
    pub line: usize,
    /// What was wrong with it.
    pub reason: MalformedReason,
}

/// Everything found in one read of the file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    /// Rows that can be inserted.
    pub rows: Vec<WhitelistRow>,
    /// Lines that were skipped.
    pub malformed: Vec<MalformedRow>,
}

/// Read the whole whitelist file.
pub async fn read_whitelist(path: &Path) -> Result<String, SourceError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError {
            path: path.to_path_buf(),
            source,
        })
}

/// Split file contents into rows, skipping blank and malformed lines.
pub fn parse_whitelist(text: &str) -> ParsedSource {
    let mut parsed = ParsedSource::default();

    for (index, line) in text.lines().enumerate() {
        if line.trim_matches(STRIPPED).is_empty() {
            continue;
        }
        match parse_row(line) {
            Ok(row) => parsed.rows.push(row),
            Err(reason) => parsed.malformed.push(MalformedRow {
                line: index + 1,
                reason,
            }),
        }
    }

    parsed
}

fn parse_row(line: &str) -> Result<WhitelistRow, MalformedReason> {
    let fields: Vec<String> = line.split(',').map(clean_field).collect();
    let [method, path, query, servers] = <[String; COLUMNS]>::try_from(fields)
        .map_err(|fields| MalformedReason::ColumnCount(fields.len()))?;

    if method.is_empty() {
        return Err(MalformedReason::MissingMethod);
    }
    if path.is_empty() {
        return Err(MalformedReason::MissingPath);
    }
    let servers = PermittedServers::parse(&servers).ok_or(MalformedReason::MissingServers)?;

    Ok(WhitelistRow {
        query: normalize_query(&query).map(str::to_string),
        method,
        path,
        servers,
    })
}

fn clean_field(field: &str) -> String {
    field.chars().filter(|c| !STRIPPED.contains(c)).collect()
}
