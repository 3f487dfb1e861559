use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::models::{Level, SearchFilter, Status, Student};
use crate::store::{SettingsStore, StudentStore, DEFAULT_AT_RISK_THRESHOLD};

const STUDENT_COLUMNS: &str =
    "student_id, full_name, programme, level, gpa, email, phone, date_added, status";
const THRESHOLD_KEY: &str = "at_risk_threshold";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed roster and settings.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    let student_id: String = row.try_get("student_id")?;
    let level: i32 = row.try_get("level")?;
    let level = Level::try_from(i64::from(level))
        .map_err(|err| StoreError::Corrupt(format!("{student_id}: {err}")))?;
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<Status>()
        .map_err(|err| StoreError::Corrupt(format!("{student_id}: {err}")))?;

    Ok(Student {
        full_name: row.try_get("full_name")?,
        programme: row.try_get("programme")?,
        level,
        gpa: row.try_get("gpa")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        date_added: row.try_get("date_added")?,
        status,
        student_id,
    })
}

/// `%`, `_` and a backslash match literally in the resulting ILIKE pattern.
fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn conflict_or(err: sqlx::Error, student_id: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());
    if unique {
        StoreError::Conflict(student_id.to_string())
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn find_all(&self) -> Result<Vec<Student>, StoreError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM roster.students ORDER BY student_id");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(student_from_row).collect()
    }

    async fn exists_by_id(&self, student_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM roster.students WHERE student_id = $1 LIMIT 1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn save(&self, student: &Student) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roster.students
            (student_id, full_name, programme, level, gpa, email, phone, date_added, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.full_name)
        .bind(&student.programme)
        .bind(i32::from(student.level.value()))
        .bind(student.gpa)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.date_added)
        .bind(student.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_or(err, &student.student_id))?;
        Ok(())
    }

    async fn update(&self, student: &Student) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roster.students
            SET full_name = $2, programme = $3, level = $4, gpa = $5,
                email = $6, phone = $7, date_added = $8, status = $9
            WHERE student_id = $1
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.full_name)
        .bind(&student.programme)
        .bind(i32::from(student.level.value()))
        .bind(student.gpa)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.date_added)
        .bind(student.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(student.student_id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, student_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM roster.students WHERE student_id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(student_id.to_string()));
        }
        Ok(())
    }

    async fn search(&self, filter: &SearchFilter) -> Result<Vec<Student>, StoreError> {
        let keyword = filter
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let programme = filter
            .programme
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut query = format!("SELECT {STUDENT_COLUMNS} FROM roster.students WHERE 1 = 1");
        let mut param = 0;
        if keyword.is_some() {
            param += 1;
            query.push_str(&format!(
                " AND (student_id ILIKE ${param} OR full_name ILIKE ${param})"
            ));
        }
        if programme.is_some() {
            param += 1;
            query.push_str(&format!(" AND programme = ${param}"));
        }
        if filter.level.is_some() {
            param += 1;
            query.push_str(&format!(" AND level = ${param}"));
        }
        if filter.status.is_some() {
            param += 1;
            query.push_str(&format!(" AND status = ${param}"));
        }
        query.push_str(" ORDER BY student_id");

        let mut rows = sqlx::query(&query);
        if let Some(value) = keyword {
            rows = rows.bind(contains_pattern(value));
        }
        if let Some(value) = programme {
            rows = rows.bind(value);
        }
        if let Some(level) = filter.level {
            rows = rows.bind(i32::from(level.value()));
        }
        if let Some(status) = filter.status {
            rows = rows.bind(status.as_str());
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(student_from_row).collect()
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn at_risk_threshold(&self) -> Result<f64, StoreError> {
        let row = sqlx::query("SELECT value FROM roster.settings WHERE key = $1")
            .bind(THRESHOLD_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let value = match row {
            Some(row) => row.try_get::<String, _>("value")?.parse::<f64>().ok(),
            None => None,
        };
        Ok(value.unwrap_or(DEFAULT_AT_RISK_THRESHOLD))
    }

    async fn set_at_risk_threshold(&self, value: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roster.settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(THRESHOLD_KEY)
        .bind(format!("{value:?}"))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn programmes(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM roster.programmes ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("name").map_err(StoreError::from))
            .collect()
    }

    async fn add_programme(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO roster.programmes (name) VALUES ($1)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|err| conflict_or(err, name))?;
        Ok(())
    }

    async fn rename_programme(&self, old_name: &str, new_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE roster.programmes SET name = $1 WHERE name = $2")
            .bind(new_name)
            .bind(old_name)
            .execute(&self.pool)
            .await
            .map_err(|err| conflict_or(err, new_name))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(old_name.to_string()));
        }
        Ok(())
    }

    async fn delete_programme(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM roster.programmes WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn programme_exists(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM roster.programmes WHERE lower(name) = lower($1) LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_wildcards_are_escaped() {
        assert_eq!(contains_pattern("doe"), "%doe%");
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }
}
