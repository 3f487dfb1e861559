use crate::models::Student;

/// Students strictly below `threshold`, lowest GPA first.
pub fn at_risk(students: &[Student], threshold: f64) -> Vec<Student> {
    let mut flagged: Vec<Student> = students
        .iter()
        .filter(|student| student.gpa < threshold)
        .cloned()
        .collect();
    flagged.sort_by(|a, b| a.gpa.partial_cmp(&b.gpa).unwrap_or(std::cmp::Ordering::Equal));
    flagged
}

pub fn threshold_in_range(value: f64) -> bool {
    (0.0..=4.0).contains(&value)
}

/// File-name safe rendering, `2.0` becomes `2_0`.
pub fn threshold_label(value: f64) -> String {
    format!("{value:?}").replace('.', "_")
}
