use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::csv_codec::decode_row;
use crate::error::StoreError;
use crate::export;
use crate::models::{ImportOutcome, LedgerEntry};
use crate::service::StudentService;
use crate::store::StudentStore;
use crate::validate::{self, RawRecord};

const MIN_COLUMNS: usize = 8;

fn looks_like_header(cols: &[String]) -> bool {
    cols.first().is_some_and(|first| {
        let first = first.to_lowercase();
        first.contains("student") || first.contains("id")
    })
}

fn column(cols: &[String], idx: usize) -> &str {
    cols.get(idx).map(|c| c.trim()).unwrap_or("")
}

/// State for a single import invocation. `known` starts as the stored ids
/// and grows with every row persisted during this run.
struct ImportRun<'a> {
    students: StudentService<'a>,
    known: HashSet<String>,
    today: NaiveDate,
    outcome: ImportOutcome,
}

impl<'a> ImportRun<'a> {
    fn reject(&mut self, row_number: usize, student_id: &str, reason: String, raw: &str) {
        debug!(row_number, student_id, %reason, "row skipped");
        self.outcome.skipped += 1;
        self.outcome.ledger.push(LedgerEntry {
            row_number,
            student_id: student_id.to_string(),
            error_message: reason,
            raw_row: raw.to_string(),
        });
    }

    async fn process(&mut self, row_number: usize, line: &str, cols: &[String]) {
        if cols.len() < MIN_COLUMNS {
            self.reject(row_number, "", "Not enough columns".to_string(), line);
            return;
        }

        let raw = RawRecord {
            student_id: column(cols, 0),
            full_name: column(cols, 1),
            programme: column(cols, 2),
            level: column(cols, 3),
            gpa: column(cols, 4),
            email: column(cols, 5),
            phone: column(cols, 6),
            date_added: column(cols, 7),
            status: column(cols, 8),
        };

        let student = match validate::validate_row(&raw, self.today) {
            Ok(student) => student,
            Err(err) => {
                self.reject(row_number, raw.student_id, err.to_string(), line);
                return;
            }
        };

        if self.known.contains(&student.student_id) {
            self.outcome.duplicates += 1;
            self.reject(
                row_number,
                &student.student_id,
                "Duplicate student ID".to_string(),
                line,
            );
            return;
        }

        match self.students.add(&student).await {
            Ok(()) => {
                self.outcome.imported += 1;
                self.known.insert(student.student_id);
            }
            Err(err) => {
                warn!(row_number, student_id = %student.student_id, error = %err, "store rejected row");
                self.reject(row_number, &student.student_id, err.to_string(), line);
            }
        }
    }
}

/// Imports every non-blank line of `text`. Row problems end up in the ledger;
/// only failing to load the existing ids aborts the run.
pub async fn import_text(
    store: &dyn StudentStore,
    text: &str,
    today: NaiveDate,
) -> Result<ImportOutcome, StoreError> {
    let known = store
        .find_all()
        .await?
        .into_iter()
        .map(|s| s.student_id)
        .collect();

    let mut run = ImportRun {
        students: StudentService::new(store),
        known,
        today,
        outcome: ImportOutcome::default(),
    };

    let mut first_line = true;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let cols = decode_row(line);
        if first_line {
            first_line = false;
            if looks_like_header(&cols) {
                continue;
            }
        }

        run.outcome.total_rows += 1;
        let row_number = run.outcome.total_rows;
        run.process(row_number, line, &cols).await;
    }

    Ok(run.outcome)
}

/// Reads `source`, imports it and writes the error ledger into `ledger_dir`
/// when at least one row failed.
pub async fn import_file(
    store: &dyn StudentStore,
    source: &Path,
    ledger_dir: &Path,
    today: NaiveDate,
) -> anyhow::Result<ImportOutcome> {
    let text = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read CSV file {}", source.display()))?;

    let mut outcome = import_text(store, &text, today)
        .await
        .context("failed to load existing students")?;

    if !outcome.ledger.is_empty() {
        let path = export::write_ledger(ledger_dir, &outcome.ledger)
            .context("failed to write import error report")?;
        outcome.ledger_path = Some(path);
    }

    info!(
        source = %source.display(),
        total = outcome.total_rows,
        imported = outcome.imported,
        skipped = outcome.skipped,
        duplicates = outcome.duplicates,
        "import finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, Status, Student};
    use crate::store::memory::MemoryStore;

    const HEADER: &str = "student_id,full_name,programme,level,gpa,email,phone,date_added,status";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn row(id: &str) -> String {
        format!("{id},Jane Doe,CompSci,100,3.80,jane@x.com,1234567890,2024-01-01,Active")
    }

    fn existing(id: &str) -> Student {
        Student {
            student_id: id.to_string(),
            full_name: "Already Here".to_string(),
            programme: "CompSci".to_string(),
            level: Level::L400,
            gpa: 2.2,
            email: "here@x.com".to_string(),
            phone: "0987654321".to_string(),
            date_added: NaiveDate::from_ymd_opt(2023, 5, 5).unwrap(),
            status: Status::Active,
        }
    }

    #[tokio::test]
    async fn malformed_row_is_ledgered_not_fatal() {
        let store = MemoryStore::new();
        let text = format!(
            "{HEADER}\n{}\nBAD,,CompSci,900,9.9,noemail,123,notadate,Maybe\n",
            row("S0001")
        );

        let outcome = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(outcome.total_rows, 2);
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(outcome.ledger.len(), 1);

        let entry = &outcome.ledger[0];
        assert_eq!(entry.row_number, 2);
        assert_eq!(entry.student_id, "BAD");
        assert_eq!(entry.error_message, "Student ID must be 4 to 20 characters");
        assert_eq!(entry.raw_row, "BAD,,CompSci,900,9.9,noemail,123,notadate,Maybe");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicates_are_counted_against_store_and_run() {
        let store = MemoryStore::with_students(vec![existing("S0001")]);
        let text = [row("S0001"), row("S0002"), row("S0002")].join("\n");

        let outcome = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(outcome.total_rows, 3);
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.duplicates, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.imported + outcome.skipped, outcome.total_rows);
        assert!(outcome
            .ledger
            .iter()
            .all(|e| e.error_message == "Duplicate student ID"));
        assert_eq!(
            outcome.ledger.iter().map(|e| e.row_number).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[tokio::test]
    async fn reimporting_the_same_file_imports_nothing() {
        let store = MemoryStore::new();
        let text = format!("{HEADER}\n{}\n{}\n{}\n", row("S0001"), row("S0002"), row("S0003"));

        let first = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(first.imported, 3);

        let second = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(second.total_rows, 3);
    }

    #[tokio::test]
    async fn short_rows_report_missing_columns() {
        let store = MemoryStore::new();
        let outcome = import_text(&store, "S0009,Ama Owusu,CompSci,100", today())
            .await
            .unwrap();

        assert_eq!(outcome.total_rows, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.ledger[0].error_message, "Not enough columns");
        assert_eq!(outcome.ledger[0].student_id, "");
    }

    #[tokio::test]
    async fn store_rejection_is_recorded_and_the_run_continues() {
        let store = MemoryStore::new().rejecting(&["S0002"]);
        let text = [row("S0001"), row("S0002"), row("S0003")].join("\n");

        let outcome = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(outcome.ledger[0].student_id, "S0002");
        assert_eq!(outcome.ledger[0].error_message, "S0002 already exists");
    }

    #[tokio::test]
    async fn optional_columns_default_and_quotes_are_honoured() {
        let store = MemoryStore::new();
        let text = "\n  \nS0010,\"Mensah, Kofi\",Nursing, 200 ,2.5,k@m.org,0201234567,\n";

        let outcome = import_text(&store, text, today()).await.unwrap();
        assert_eq!(outcome.total_rows, 1);
        assert_eq!(outcome.imported, 1);

        let stored = store.find_all().await.unwrap();
        assert_eq!(stored[0].full_name, "Mensah, Kofi");
        assert_eq!(stored[0].level, Level::L200);
        assert_eq!(stored[0].date_added, today());
        assert_eq!(stored[0].status, Status::Active);
    }

    #[tokio::test]
    async fn header_is_only_detected_on_the_first_line() {
        let store = MemoryStore::new();
        let text = format!("{}\n{HEADER}\n", row("S0001"));

        let outcome = import_text(&store, &text, today()).await.unwrap();
        assert_eq!(outcome.total_rows, 2);
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn unreadable_source_is_a_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let missing = dir.path().join("missing.csv");

        let err = import_file(&store, &missing, dir.path(), today())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read CSV file"));
    }

    #[tokio::test]
    async fn ledger_file_only_written_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let clean = dir.path().join("clean.csv");
        std::fs::write(&clean, format!("{HEADER}\n{}\n", row("S0001"))).unwrap();
        let outcome = import_file(&store, &clean, dir.path(), today()).await.unwrap();
        assert!(outcome.ledger_path.is_none());

        let dirty = dir.path().join("dirty.csv");
        std::fs::write(&dirty, format!("{HEADER}\n{}\n", row("S0001"))).unwrap();
        let outcome = import_file(&store, &dirty, dir.path(), today()).await.unwrap();
        let ledger = outcome.ledger_path.expect("ledger written");
        let text = std::fs::read_to_string(ledger).unwrap();
        assert_eq!(
            text,
            format!(
                "row_number,student_id,error_message,raw_row\n1,S0001,Duplicate student ID,\"{}\"\n",
                row("S0001")
            )
        );
    }
}
