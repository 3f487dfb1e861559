use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

mod config;
mod csv_codec;
mod db;
mod error;
mod export;
mod import;
mod models;
mod report;
mod risk;
mod service;
mod store;
mod validate;

use config::Config;
use db::PgStore;
use export::ExportKind;
use models::{Level, SearchFilter, Status, Student};
use service::{SettingsService, StudentService};

#[derive(Parser)]
#[command(name = "roster-records")]
#[command(about = "Student roster records: CSV import/export and GPA reporting", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write a CSV report into the data directory
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
    },
    /// Rank students by GPA
    Top {
        #[arg(long)]
        programme: Option<String>,
        #[arg(long)]
        level: Option<Level>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List students below the at-risk threshold
    AtRisk {
        /// Overrides the stored threshold for this listing only
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Count students per GPA band
    Distribution,
    /// Count and average GPA per programme
    #[command(name = "programmes-summary")]
    ProgrammeSummary,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Manage individual students
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Show or change the at-risk GPA threshold
    Threshold {
        #[command(subcommand)]
        command: ThresholdCommands,
    },
    /// Manage the known programme list
    Programme {
        #[command(subcommand)]
        command: ProgrammeCommands,
    },
}

#[derive(Subcommand)]
enum StudentCommands {
    Add(StudentArgs),
    /// Replace every field except the identifier
    Update(StudentArgs),
    Delete {
        student_id: String,
    },
    Search {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        programme: Option<String>,
        #[arg(long)]
        level: Option<Level>,
        #[arg(long)]
        status: Option<Status>,
        /// Print matches as CSV rows with a header
        #[arg(long)]
        csv: bool,
    },
}

#[derive(Subcommand)]
enum ThresholdCommands {
    Get,
    Set { value: f64 },
}

#[derive(Subcommand)]
enum ProgrammeCommands {
    List,
    Add { name: String },
    Rename { old_name: String, new_name: String },
    Remove { name: String },
}

#[derive(Args)]
struct StudentArgs {
    student_id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    programme: String,
    #[arg(long)]
    level: Level,
    #[arg(long)]
    gpa: f64,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    /// Defaults to today
    #[arg(long)]
    date_added: Option<NaiveDate>,
    #[arg(long, default_value = "Active")]
    status: Status,
}

impl StudentArgs {
    fn into_student(self, today: NaiveDate) -> Student {
        Student {
            student_id: self.student_id,
            full_name: self.name,
            programme: self.programme,
            level: self.level,
            gpa: self.gpa,
            email: self.email,
            phone: self.phone,
            date_added: self.date_added.unwrap_or(today),
            status: self.status,
        }
    }
}

fn emit<T: Serialize>(json: bool, data: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        println!("{}", text(data));
    }
    Ok(())
}

fn student_line(student: &Student) -> String {
    format!(
        "- {} {} ({}, level {}) GPA {:.2} [{}]",
        student.student_id,
        student.full_name,
        student.programme,
        student.level,
        student.gpa,
        student.status
    )
}

fn student_fields(student: &Student) -> [String; 9] {
    [
        student.student_id.clone(),
        student.full_name.clone(),
        student.programme.clone(),
        student.level.to_string(),
        format!("{:?}", student.gpa),
        student.email.clone(),
        student.phone.clone(),
        student.date_added.to_string(),
        student.status.to_string(),
    ]
}

fn student_lines(students: &[Student], empty: &str) -> String {
    if students.is_empty() {
        return empty.to_string();
    }
    students
        .iter()
        .map(student_line)
        .collect::<Vec<_>>()
        .join("\n")
}

async fn warn_unknown_programme(settings: &SettingsService<'_>, programme: &str) -> anyhow::Result<()> {
    if !settings.is_known_programme(programme).await? {
        warn!(programme, "programme is not in the known programme list");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.config.init_logging();

    let pool = cli.config.connect().await?;
    let store = PgStore::new(pool.clone());
    let json = cli.config.json;
    let data_dir = cli.config.data_dir.clone();
    let today = Local::now().date_naive();

    let students = StudentService::new(&store);
    let settings = SettingsService::new(&store);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let import_store = store.clone();
            let outcome = tokio::spawn(async move {
                import::import_file(&import_store, &csv, &data_dir, today).await
            })
            .await
            .context("import task failed")??;

            emit(json, &outcome, |o| {
                let mut line = format!(
                    "Imported {} of {} rows ({} skipped, {} duplicates).",
                    o.imported, o.total_rows, o.skipped, o.duplicates
                );
                if let Some(path) = &o.ledger_path {
                    line.push_str(&format!("\nError report written to {}.", path.display()));
                }
                line
            })?;
        }
        Commands::Export { kind } => {
            let path = export::run_export(kind, &data_dir, &store, &store).await?;
            emit(json, &path, |p| format!("Export written to {}.", p.display()))?;
        }
        Commands::Top {
            programme,
            level,
            limit,
        } => {
            let roster = students.all().await?;
            let top = report::top_performers(&roster, programme.as_deref(), level, limit);
            emit(json, &top, |entries| {
                if entries.is_empty() {
                    return "No students match.".to_string();
                }
                entries
                    .iter()
                    .map(|e| {
                        format!(
                            "{}. {} {} ({}, level {}) GPA {:.2}",
                            e.rank, e.student_id, e.full_name, e.programme, e.level, e.gpa
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::AtRisk { threshold } => {
            let threshold = match threshold {
                Some(value) if !risk::threshold_in_range(value) => {
                    anyhow::bail!("threshold must be between 0.0 and 4.0")
                }
                Some(value) => value,
                None => settings.threshold().await?,
            };
            let roster = students.all().await?;
            let flagged = risk::at_risk(&roster, threshold);
            emit(json, &flagged, |s| {
                student_lines(s, "No students below the threshold.")
            })?;
        }
        Commands::Distribution => {
            let roster = students.all().await?;
            let bands = report::gpa_distribution(&roster);
            emit(json, &bands, |bands| {
                bands
                    .iter()
                    .map(|b| format!("{}: {}", b.label, b.count))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::ProgrammeSummary => {
            let roster = students.all().await?;
            let summary = report::programme_summary(&roster);
            emit(json, &summary, |rows| {
                if rows.is_empty() {
                    return "No students on the roster.".to_string();
                }
                rows.iter()
                    .map(|r| format!("{}: {} students, avg GPA {:.2}", r.programme, r.count, r.avg_gpa))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Report { out } => {
            let report = report::build_digest(&store, &store).await?;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Student { command } => match command {
            StudentCommands::Add(args) => {
                let student = args.into_student(today);
                warn_unknown_programme(&settings, &student.programme).await?;
                students.add(&student).await?;
                println!("Student {} added.", student.student_id);
            }
            StudentCommands::Update(args) => {
                let student = args.into_student(today);
                warn_unknown_programme(&settings, &student.programme).await?;
                students.update(&student).await?;
                println!("Student {} updated.", student.student_id);
            }
            StudentCommands::Delete { student_id } => {
                students.delete(&student_id).await?;
                println!("Student {student_id} deleted.");
            }
            StudentCommands::Search {
                keyword,
                programme,
                level,
                status,
                csv,
            } => {
                let filter = SearchFilter {
                    keyword,
                    programme,
                    level,
                    status,
                };
                let found = students.search(&filter).await?;
                if csv {
                    print!("{}", csv_codec::encode_row(&export::ROSTER_HEADER)?);
                    for student in &found {
                        print!("{}", csv_codec::encode_row(&student_fields(student))?);
                    }
                } else {
                    emit(json, &found, |s| student_lines(s, "No students match."))?;
                }
            }
        },
        Commands::Threshold { command } => match command {
            ThresholdCommands::Get => {
                let value = settings.threshold().await?;
                emit(json, &value, |v| format!("At-risk threshold: {v:.2}"))?;
            }
            ThresholdCommands::Set { value } => {
                settings.set_threshold(value).await?;
                println!("At-risk threshold set to {value:.2}.");
            }
        },
        Commands::Programme { command } => match command {
            ProgrammeCommands::List => {
                let names = settings.programmes().await?;
                emit(json, &names, |names| {
                    if names.is_empty() {
                        "No programmes configured.".to_string()
                    } else {
                        names.join("\n")
                    }
                })?;
            }
            ProgrammeCommands::Add { name } => {
                let added = settings.add_programme(&name).await?;
                println!("Programme {added} added.");
            }
            ProgrammeCommands::Rename { old_name, new_name } => {
                let renamed = settings.rename_programme(&old_name, &new_name).await?;
                println!("Programme {old_name} renamed to {renamed}.");
            }
            ProgrammeCommands::Remove { name } => {
                settings.delete_programme(&name).await?;
                println!("Programme {name} removed.");
            }
        },
    }

    Ok(())
}
