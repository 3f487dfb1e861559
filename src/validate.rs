use chrono::NaiveDate;

use crate::error::RecordError;
use crate::models::{Level, Status, Student};

/// Raw column text for one candidate row, already trimmed. Blank `date_added`
/// and `status` mean the column was absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRecord<'a> {
    pub student_id: &'a str,
    pub full_name: &'a str,
    pub programme: &'a str,
    pub level: &'a str,
    pub gpa: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub date_added: &'a str,
    pub status: &'a str,
}

/// Checks every rule in order and builds the typed record. The first failing
/// rule wins.
pub fn validate_row(raw: &RawRecord<'_>, today: NaiveDate) -> Result<Student, RecordError> {
    check_id(raw.student_id)?;
    check_name(raw.full_name)?;
    check_programme(raw.programme)?;
    let level: Level = raw.level.parse()?;
    let gpa = parse_gpa(raw.gpa)?;
    check_email(raw.email)?;
    check_phone(raw.phone)?;
    let date_added = if raw.date_added.trim().is_empty() {
        today
    } else {
        parse_date(raw.date_added)?
    };
    let status = if raw.status.trim().is_empty() {
        Status::default()
    } else {
        raw.status.parse()?
    };

    Ok(Student {
        student_id: raw.student_id.to_string(),
        full_name: raw.full_name.to_string(),
        programme: raw.programme.to_string(),
        level,
        gpa,
        email: raw.email.to_string(),
        phone: raw.phone.to_string(),
        date_added,
        status,
    })
}

/// Rules for an already typed record (manual add and edit). Level, date and
/// status are guaranteed by their types.
pub fn validate_student(student: &Student) -> Result<(), RecordError> {
    check_id(&student.student_id)?;
    check_name(&student.full_name)?;
    check_programme(&student.programme)?;
    check_gpa(student.gpa)?;
    check_email(&student.email)?;
    check_phone(&student.phone)
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn check_id(id: &str) -> Result<(), RecordError> {
    if is_blank(id) {
        return Err(RecordError::IdRequired);
    }
    let len = id.chars().count();
    if !(4..=20).contains(&len) {
        return Err(RecordError::IdLength);
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RecordError::IdCharset);
    }
    Ok(())
}

pub fn check_name(name: &str) -> Result<(), RecordError> {
    if is_blank(name) {
        return Err(RecordError::NameRequired);
    }
    let len = name.chars().count();
    if !(2..=60).contains(&len) {
        return Err(RecordError::NameLength);
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        return Err(RecordError::NameDigits);
    }
    Ok(())
}

pub fn check_programme(programme: &str) -> Result<(), RecordError> {
    if is_blank(programme) {
        return Err(RecordError::ProgrammeRequired);
    }
    Ok(())
}

fn parse_gpa(value: &str) -> Result<f64, RecordError> {
    let gpa: f64 = value.parse().map_err(|_| RecordError::GpaNotNumber)?;
    if !gpa.is_finite() {
        return Err(RecordError::GpaNotNumber);
    }
    check_gpa(gpa)?;
    // folds -0.0 into 0.0
    Ok(gpa + 0.0)
}

pub fn check_gpa(gpa: f64) -> Result<(), RecordError> {
    if gpa.is_nan() || !(0.0..=4.0).contains(&gpa) {
        return Err(RecordError::GpaOutOfRange);
    }
    Ok(())
}

pub fn check_email(email: &str) -> Result<(), RecordError> {
    if is_blank(email) {
        return Err(RecordError::EmailRequired);
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(RecordError::EmailFormat);
    }
    Ok(())
}

pub fn check_phone(phone: &str) -> Result<(), RecordError> {
    if is_blank(phone) {
        return Err(RecordError::PhoneRequired);
    }
    if phone.len() != 10 || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecordError::PhoneFormat);
    }
    Ok(())
}

fn parse_date(value: &str) -> Result<NaiveDate, RecordError> {
    // chrono tolerates unpadded fields, the file format does not
    let shape_ok = value.len() == 10
        && value.bytes().enumerate().all(|(idx, b)| match idx {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(RecordError::DateFormat);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| RecordError::DateFormat)
}
