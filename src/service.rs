use tracing::{debug, info};

use crate::error::{ServiceError, SettingsError, StoreError};
use crate::models::{SearchFilter, Student};
use crate::store::{SettingsStore, StudentStore};
use crate::validate;

/// Roster mutations that go through the shared validation rules.
pub struct StudentService<'a> {
    store: &'a dyn StudentStore,
}

impl<'a> StudentService<'a> {
    pub fn new(store: &'a dyn StudentStore) -> Self {
        Self { store }
    }

    pub async fn add(&self, student: &Student) -> Result<(), ServiceError> {
        validate::validate_student(student)?;
        if self.store.exists_by_id(&student.student_id).await? {
            return Err(ServiceError::DuplicateId);
        }
        self.store.save(student).await?;
        debug!(student_id = %student.student_id, "student added");
        Ok(())
    }

    /// The identifier selects the row and is never rewritten.
    pub async fn update(&self, student: &Student) -> Result<(), ServiceError> {
        validate::validate_student(student)?;
        self.store.update(student).await?;
        debug!(student_id = %student.student_id, "student updated");
        Ok(())
    }

    pub async fn delete(&self, student_id: &str) -> Result<(), ServiceError> {
        self.store.delete(student_id).await?;
        info!(student_id, "student deleted");
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<Student>, StoreError> {
        self.store.find_all().await
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<Student>, StoreError> {
        self.store.search(filter).await
    }
}

pub struct SettingsService<'a> {
    store: &'a dyn SettingsStore,
}

impl<'a> SettingsService<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self { store }
    }

    pub async fn threshold(&self) -> Result<f64, StoreError> {
        self.store.at_risk_threshold().await
    }

    pub async fn set_threshold(&self, value: f64) -> Result<(), SettingsError> {
        if !crate::risk::threshold_in_range(value) {
            return Err(SettingsError::ThresholdOutOfRange);
        }
        self.store.set_at_risk_threshold(value).await?;
        info!(threshold = value, "at-risk threshold updated");
        Ok(())
    }

    pub async fn programmes(&self) -> Result<Vec<String>, StoreError> {
        self.store.programmes().await
    }

    pub async fn add_programme(&self, name: &str) -> Result<String, SettingsError> {
        let cleaned = name.trim();
        if cleaned.is_empty() {
            return Err(SettingsError::ProgrammeRequired);
        }
        if self.store.programme_exists(cleaned).await? {
            return Err(SettingsError::ProgrammeExists);
        }
        self.store.add_programme(cleaned).await?;
        Ok(cleaned.to_string())
    }

    /// Renaming to a case variant of the same programme is allowed.
    pub async fn rename_programme(
        &self,
        old_name: &str,
        new_name: &str,
    ) -> Result<String, SettingsError> {
        let cleaned = new_name.trim();
        if cleaned.is_empty() {
            return Err(SettingsError::ProgrammeRequired);
        }
        let same_programme = old_name.to_lowercase() == cleaned.to_lowercase();
        if !same_programme && self.store.programme_exists(cleaned).await? {
            return Err(SettingsError::ProgrammeExists);
        }
        self.store.rename_programme(old_name, cleaned).await?;
        Ok(cleaned.to_string())
    }

    pub async fn delete_programme(&self, name: &str) -> Result<(), SettingsError> {
        self.store.delete_programme(name).await?;
        Ok(())
    }

    pub async fn is_known_programme(&self, name: &str) -> Result<bool, StoreError> {
        self.store.programme_exists(name.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::RecordError;
    use crate::models::{Level, Status};
    use crate::store::memory::MemoryStore;

    fn student(id: &str, name: &str) -> Student {
        Student {
            student_id: id.to_string(),
            full_name: name.to_string(),
            programme: "CompSci".to_string(),
            level: Level::L200,
            gpa: 3.1,
            email: "someone@uni.edu".to_string(),
            phone: "0123456789".to_string(),
            date_added: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            status: Status::Active,
        }
    }

    #[tokio::test]
    async fn add_rejects_existing_identifier() {
        let store = MemoryStore::with_students(vec![student("S0001", "Jane Doe")]);
        let service = StudentService::new(&store);

        let err = service.add(&student("S0001", "Other Person")).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateId));
        assert_eq!(err.to_string(), "Student ID already exists. Use a different ID.");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn add_validates_before_touching_the_store() {
        let store = MemoryStore::new();
        let service = StudentService::new(&store);

        let mut bad = student("S0002", "Sam Smith");
        bad.email = "nowhere".to_string();
        let err = service.add(&bad).await.unwrap_err();
        assert!(matches!(err, ServiceError::Invalid(RecordError::EmailFormat)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn update_and_delete_round_trip_through_the_store() {
        let store = MemoryStore::with_students(vec![student("S0003", "Ada Obi")]);
        let service = StudentService::new(&store);

        let mut edited = student("S0003", "Ada Obi");
        edited.gpa = 3.9;
        edited.status = Status::Inactive;
        service.update(&edited).await.unwrap();
        assert_eq!(service.all().await.unwrap(), vec![edited]);

        service.delete("S0003").await.unwrap();
        assert!(service.all().await.unwrap().is_empty());
        assert!(matches!(
            service.delete("S0003").await,
            Err(ServiceError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn search_combines_filters() {
        let mut inactive = student("S0005", "Bola Ade");
        inactive.status = Status::Inactive;
        let store = MemoryStore::with_students(vec![
            student("S0004", "Ada Obi"),
            inactive,
            student("X0006", "Chidi Eze"),
        ]);
        let service = StudentService::new(&store);

        let filter = SearchFilter {
            keyword: Some("s00".to_string()),
            status: Some(Status::Active),
            ..SearchFilter::default()
        };
        let found = service.search(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, "S0004");
    }

    #[tokio::test]
    async fn threshold_must_stay_in_range() {
        let store = MemoryStore::new();
        let settings = SettingsService::new(&store);

        assert_eq!(settings.threshold().await.unwrap(), 2.0);
        assert!(matches!(
            settings.set_threshold(4.5).await,
            Err(SettingsError::ThresholdOutOfRange)
        ));
        assert_eq!(settings.threshold().await.unwrap(), 2.0);

        settings.set_threshold(2.5).await.unwrap();
        assert_eq!(settings.threshold().await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn programme_names_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        let settings = SettingsService::new(&store);

        assert_eq!(settings.add_programme("  CompSci ").await.unwrap(), "CompSci");
        assert!(matches!(
            settings.add_programme("compsci").await,
            Err(SettingsError::ProgrammeExists)
        ));
        assert!(matches!(
            settings.add_programme("   ").await,
            Err(SettingsError::ProgrammeRequired)
        ));

        settings.add_programme("Nursing").await.unwrap();
        assert!(matches!(
            settings.rename_programme("Nursing", "COMPSCI").await,
            Err(SettingsError::ProgrammeExists)
        ));
        assert_eq!(
            settings.rename_programme("CompSci", "Compsci").await.unwrap(),
            "Compsci"
        );
        assert!(settings.is_known_programme("compsci").await.unwrap());

        settings.delete_programme("Nursing").await.unwrap();
        assert_eq!(settings.programmes().await.unwrap(), vec!["Compsci".to_string()]);
    }
}
