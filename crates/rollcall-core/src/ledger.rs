//! Date-partitioned attendance ledger.
//!
//! One CSV file per calendar day, `Attendance_DD-MM-YYYY.csv`, starting with
//! a `NAME,TIME` header and holding at most one row per name. Marking holds
//! an exclusive lock on the day file for the whole read-check-append, and the
//! header and row go out in a single write. A write that fails part-way is
//! cut back to the previous length before the lock is released.

use crate::lock::FileLock;
use crate::types::normalize_name;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const LEDGER_HEADER: &str = "NAME,TIME";
pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";
const FILE_PREFIX: &str = "Attendance_";
const FILE_EXTENSION: &str = "csv";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("name must be non-empty and contain no control characters")]
    InvalidName,
    #[error("malformed ledger {path} line {line}: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// How an existing row is recognized as the same person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    /// The NAME field equals the name.
    #[default]
    Exact,
    /// Any line of the file contains the name as a substring.
    ///
    /// Kept for compatibility with ledgers written by older tooling. It is
    /// known to be wrong: once "Anna" has a row, "Ann" looks already
    /// present, and names like "NAME" collide with the header row.
    Substring,
}

impl FromStr for MatchRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "substring" => Ok(Self::Substring),
            other => Err(format!("unknown ledger match rule {other:?} (expected exact or substring)")),
        }
    }
}

/// Result of a mark request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
}

/// One data row of a day's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub time: NaiveTime,
}

/// Handle to the ledger directory.
pub struct AttendanceLedger {
    dir: PathBuf,
    rule: MatchRule,
}

impl AttendanceLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rule: MatchRule::default(),
        }
    }

    pub fn with_match_rule(mut self, rule: MatchRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn match_rule(&self) -> MatchRule {
        self.rule
    }

    /// Ledger file for a calendar date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{FILE_PREFIX}{}.{FILE_EXTENSION}",
            date.format(DATE_FORMAT)
        ))
    }

    /// Mark `name` present now, in local time.
    pub fn mark(&self, name: &str) -> Result<MarkOutcome, LedgerError> {
        self.mark_at(name, Local::now().naive_local())
    }

    /// Mark `name` present at `at`; the date selects the ledger file.
    pub fn mark_at(&self, name: &str, at: NaiveDateTime) -> Result<MarkOutcome, LedgerError> {
        let name = normalize_name(name).ok_or(LedgerError::InvalidName)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(at.date());

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let mut lock = FileLock::acquire(file)?;

        let mut existing = String::new();
        lock.file_mut().read_to_string(&mut existing)?;

        if self.contains(&existing, &name, &path)? {
            tracing::info!(name = %name, path = %path.display(), "attendance already marked");
            return Ok(MarkOutcome::AlreadyMarked);
        }

        let blank = existing.trim().is_empty();
        let mut chunk = String::new();
        if blank {
            chunk.push_str(LEDGER_HEADER);
            chunk.push('\n');
        } else if !existing.ends_with('\n') {
            chunk.push('\n');
        }
        chunk.push_str(&quote_field(&name));
        chunk.push(',');
        chunk.push_str(&at.time().format(TIME_FORMAT).to_string());
        chunk.push('\n');

        // Whitespace-only day files are rewritten from the header.
        let prev_len = if blank {
            lock.file().set_len(0)?;
            0
        } else {
            lock.file().metadata()?.len()
        };
        append_or_rollback(lock.file_mut(), chunk.as_bytes(), prev_len)?;

        tracing::info!(
            name = %name,
            time = %at.time().format(TIME_FORMAT),
            path = %path.display(),
            "attendance marked"
        );
        Ok(MarkOutcome::Marked)
    }

    /// All rows recorded for `date`; empty when no ledger exists for that day.
    pub fn records(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        parse_ledger(&content, &path)
    }

    fn contains(&self, existing: &str, name: &str, path: &Path) -> Result<bool, LedgerError> {
        match self.rule {
            MatchRule::Substring => Ok(existing.lines().any(|line| line.contains(name))),
            MatchRule::Exact => {
                if existing.trim().is_empty() {
                    return Ok(false);
                }
                Ok(parse_ledger(existing, path)?.iter().any(|r| r.name == name))
            }
        }
    }
}

/// Output the ledger appends to: a file that can be synced and cut back.
trait LedgerSink: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LedgerSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append `bytes` durably, or cut the output back to `prev_len` so a torn
/// row never survives a failed write.
fn append_or_rollback(out: &mut impl LedgerSink, bytes: &[u8], prev_len: u64) -> io::Result<()> {
    let written = out.write_all(bytes).and_then(|()| out.sync());
    if let Err(err) = written {
        if let Err(rollback) = out.truncate(prev_len) {
            tracing::error!(error = %rollback, prev_len, "failed to roll back partial ledger append");
        }
        return Err(err);
    }
    Ok(())
}

fn parse_ledger(content: &str, path: &Path) -> Result<Vec<AttendanceRecord>, LedgerError> {
    let malformed = |line: usize, reason: String| LedgerError::Malformed {
        path: path.display().to_string(),
        line,
        reason,
    };

    let mut lines = content.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == LEDGER_HEADER => {}
        Some((_, other)) => return Err(malformed(1, format!("expected header {LEDGER_HEADER:?}, got {other:?}"))),
        None => return Ok(Vec::new()),
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(line).map_err(|reason| malformed(idx + 1, reason))?;
        let [name, time] = <[String; 2]>::try_from(fields)
            .map_err(|f| malformed(idx + 1, format!("expected 2 fields, got {}", f.len())))?;
        let time = NaiveTime::parse_from_str(time.trim(), TIME_FORMAT)
            .map_err(|e| malformed(idx + 1, format!("bad time {time:?}: {e}")))?;
        records.push(AttendanceRecord { name, time });
    }
    Ok(records)
}

/// Quote a CSV field when it contains a delimiter or quote.
fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split one CSV line into unquoted fields.
fn split_record(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }
    if quoted {
        return Err("unterminated quoted field".into());
    }
    fields.push(field);
    Ok(fields)
}
