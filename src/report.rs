use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write;

use crate::error::StoreError;
use crate::models::{GpaBand, Level, ProgrammeSummary, Student, TopPerformer};
use crate::risk;
use crate::store::{SettingsStore, StudentStore};

pub const TOP_PERFORMER_LIMIT: usize = 10;

/// Upper bounds are exclusive except for the last band, which tops out at 4.0.
const GPA_BANDS: [(&str, f64); 5] = [
    ("0.0-0.9", 1.0),
    ("1.0-1.9", 2.0),
    ("2.0-2.9", 3.0),
    ("3.0-3.4", 3.5),
    ("3.5-4.0", f64::INFINITY),
];

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

pub fn average_gpa(students: &[Student]) -> f64 {
    if students.is_empty() {
        return 0.0;
    }
    students.iter().map(|s| s.gpa).sum::<f64>() / students.len() as f64
}

/// Highest GPA first, ties broken by name ignoring case. Blank programme means
/// no programme filter.
pub fn top_performers(
    students: &[Student],
    programme: Option<&str>,
    level: Option<Level>,
    limit: usize,
) -> Vec<TopPerformer> {
    let programme = programme
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase);

    let mut ranked: Vec<&Student> = students
        .iter()
        .filter(|s| {
            programme
                .as_deref()
                .map_or(true, |p| s.programme.to_lowercase() == p)
        })
        .filter(|s| level.map_or(true, |l| s.level == l))
        .collect();

    ranked.sort_by(|a, b| {
        b.gpa
            .partial_cmp(&a.gpa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| cmp_ignore_case(&a.full_name, &b.full_name))
    });

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, s)| TopPerformer {
            rank: idx + 1,
            student_id: s.student_id.clone(),
            full_name: s.full_name.clone(),
            programme: s.programme.clone(),
            level: s.level,
            gpa: s.gpa,
        })
        .collect()
}

/// All five bands, in order, even when empty.
pub fn gpa_distribution(students: &[Student]) -> Vec<GpaBand> {
    let mut bands: Vec<GpaBand> = GPA_BANDS
        .iter()
        .map(|(label, _)| GpaBand {
            label: *label,
            count: 0,
        })
        .collect();

    for student in students {
        if let Some(idx) = GPA_BANDS.iter().position(|(_, upper)| student.gpa < *upper) {
            bands[idx].count += 1;
        }
    }

    bands
}

pub fn programme_summary(students: &[Student]) -> Vec<ProgrammeSummary> {
    let mut groups: HashMap<&str, (usize, f64)> = HashMap::new();

    for student in students {
        let entry = groups.entry(student.programme.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += student.gpa;
    }

    let mut summaries: Vec<ProgrammeSummary> = groups
        .into_iter()
        .map(|(programme, (count, total_gpa))| ProgrammeSummary {
            programme: programme.to_string(),
            count,
            avg_gpa: total_gpa / count as f64,
        })
        .collect();

    summaries.sort_by(|a, b| {
        cmp_ignore_case(&a.programme, &b.programme).then_with(|| a.programme.cmp(&b.programme))
    });
    summaries
}

/// Fetches one snapshot of the roster and renders every aggregation as markdown.
pub async fn build_digest(
    students: &dyn StudentStore,
    settings: &dyn SettingsStore,
) -> Result<String, StoreError> {
    let roster = students.find_all().await?;
    let threshold = settings.at_risk_threshold().await?;
    Ok(build_report(&roster, threshold))
}

pub fn build_report(students: &[Student], threshold: f64) -> String {
    let summaries = programme_summary(students);
    let bands = gpa_distribution(students);
    let top = top_performers(students, None, None, TOP_PERFORMER_LIMIT);
    let flagged = risk::at_risk(students, threshold);

    let mut output = String::new();

    let _ = writeln!(output, "# Student Roster Report");
    let _ = writeln!(
        output,
        "{} students, average GPA {:.2}",
        students.len(),
        average_gpa(students)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Programmes");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg GPA {:.2})",
                summary.programme, summary.count, summary.avg_gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## GPA Distribution");
    for band in bands.iter() {
        let _ = writeln!(output, "- {}: {}", band.label, band.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");

    if top.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for entry in top.iter() {
            let _ = writeln!(
                output,
                "{}. {} ({}, {} level {}) GPA {:.2}",
                entry.rank,
                entry.full_name,
                entry.student_id,
                entry.programme,
                entry.level,
                entry.gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Students (GPA below {threshold:.2})");

    if flagged.is_empty() {
        let _ = writeln!(output, "No students below the threshold.");
    } else {
        for student in flagged.iter() {
            let _ = writeln!(
                output,
                "- {} ({}, {}) GPA {:.2}",
                student.full_name, student.student_id, student.programme, student.gpa
            );
        }
    }

    output
}
