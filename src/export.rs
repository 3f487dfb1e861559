use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::csv_codec::CsvSink;
use crate::models::{LedgerEntry, Student};
use crate::report::{self, TOP_PERFORMER_LIMIT};
use crate::risk;
use crate::store::{SettingsStore, StudentStore};

pub const ROSTER_HEADER: [&str; 9] = [
    "student_id",
    "full_name",
    "programme",
    "level",
    "gpa",
    "email",
    "phone",
    "date_added",
    "status",
];
pub const TOP_PERFORMERS_HEADER: [&str; 6] =
    ["rank", "student_id", "full_name", "programme", "level", "gpa"];
pub const LEDGER_HEADER: [&str; 4] = ["row_number", "student_id", "error_message", "raw_row"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportKind {
    /// Every student with all fields
    Roster,
    /// Ten highest GPAs across the whole roster
    Top,
    /// Students below the configured at-risk threshold
    AtRisk,
}

/// A fresh path under `dir`: `<prefix>_<YYYYMMDD_HHMMSS>_<8 hex>.csv`.
pub fn output_path(dir: &Path, prefix: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create data directory {}", dir.display()))?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(dir.join(format!("{prefix}_{stamp}_{}.csv", &suffix[..8])))
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("could not create {}", path.display()))?;
    let mut sink = CsvSink::new(file, header)?;
    for row in rows {
        sink.row(row)?;
    }
    sink.finish()
        .with_context(|| format!("could not write {}", path.display()))?;
    Ok(())
}

pub fn export_roster(dir: &Path, students: &[Student]) -> anyhow::Result<PathBuf> {
    let path = output_path(dir, "students_full")?;
    write_csv(&path, &ROSTER_HEADER, students)?;
    Ok(path)
}

pub fn export_top_performers(dir: &Path, students: &[Student]) -> anyhow::Result<PathBuf> {
    let top = report::top_performers(students, None, None, TOP_PERFORMER_LIMIT);
    let path = output_path(dir, "top_performers")?;
    write_csv(&path, &TOP_PERFORMERS_HEADER, &top)?;
    Ok(path)
}

pub fn export_at_risk(dir: &Path, students: &[Student], threshold: f64) -> anyhow::Result<PathBuf> {
    let flagged = risk::at_risk(students, threshold);
    let prefix = format!("at_risk_threshold_{}", risk::threshold_label(threshold));
    let path = output_path(dir, &prefix)?;
    write_csv(&path, &ROSTER_HEADER, &flagged)?;
    Ok(path)
}

pub fn write_ledger(dir: &Path, entries: &[LedgerEntry]) -> anyhow::Result<PathBuf> {
    let path = output_path(dir, "import_error_report")?;
    write_csv(&path, &LEDGER_HEADER, entries)?;
    Ok(path)
}

/// Takes one roster snapshot and writes the requested report shape.
pub async fn run_export(
    kind: ExportKind,
    dir: &Path,
    students: &dyn StudentStore,
    settings: &dyn SettingsStore,
) -> anyhow::Result<PathBuf> {
    let roster = students
        .find_all()
        .await
        .context("failed to load the roster")?;

    let path = match kind {
        ExportKind::Roster => export_roster(dir, &roster)?,
        ExportKind::Top => export_top_performers(dir, &roster)?,
        ExportKind::AtRisk => {
            let threshold = settings.at_risk_threshold().await?;
            export_at_risk(dir, &roster, threshold)?
        }
    };

    info!(?kind, rows = roster.len(), path = %path.display(), "export written");
    Ok(path)
}
