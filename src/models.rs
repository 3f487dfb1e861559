use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    L100,
    L200,
    L300,
    L400,
}

impl Level {
    pub fn value(self) -> u16 {
        match self {
            Level::L100 => 100,
            Level::L200 => 200,
            Level::L300 => 300,
            Level::L400 => 400,
        }
    }
}

impl TryFrom<i64> for Level {
    type Error = RecordError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(Level::L100),
            200 => Ok(Level::L200),
            300 => Ok(Level::L300),
            400 => Ok(Level::L400),
            _ => Err(RecordError::LevelOutOfSet),
        }
    }
}

impl FromStr for Level {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|_| RecordError::LevelNotNumber)?;
        Level::try_from(value)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.value())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    #[default]
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Inactive => "Inactive",
        }
    }
}

impl FromStr for Status {
    type Err = RecordError;

    /// Accepts any casing and yields the canonical variant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            _ => Err(RecordError::StatusInvalid),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry. Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub programme: String,
    pub level: Level,
    pub gpa: f64,
    pub email: String,
    pub phone: String,
    pub date_added: NaiveDate,
    pub status: Status,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub keyword: Option<String>,
    pub programme: Option<String>,
    pub level: Option<Level>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub row_number: usize,
    pub student_id: String,
    pub error_message: String,
    pub raw_row: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub total_rows: usize,
    pub imported: usize,
    pub skipped: usize,
    pub duplicates: usize,
    #[serde(skip)]
    pub ledger: Vec<LedgerEntry>,
    pub ledger_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgrammeSummary {
    pub programme: String,
    pub count: usize,
    pub avg_gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub rank: usize,
    pub student_id: String,
    pub full_name: String,
    pub programme: String,
    pub level: Level,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaBand {
    pub label: &'static str,
    pub count: usize,
}
