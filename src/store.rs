use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{SearchFilter, Student};

pub const DEFAULT_AT_RISK_THRESHOLD: f64 = 2.0;

#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Student>, StoreError>;
    async fn exists_by_id(&self, student_id: &str) -> Result<bool, StoreError>;
    async fn save(&self, student: &Student) -> Result<(), StoreError>;
    async fn update(&self, student: &Student) -> Result<(), StoreError>;
    async fn delete(&self, student_id: &str) -> Result<(), StoreError>;
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<Student>, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Falls back to [`DEFAULT_AT_RISK_THRESHOLD`] when nothing is stored.
    async fn at_risk_threshold(&self) -> Result<f64, StoreError>;
    async fn set_at_risk_threshold(&self, value: f64) -> Result<(), StoreError>;
    async fn programmes(&self) -> Result<Vec<String>, StoreError>;
    async fn add_programme(&self, name: &str) -> Result<(), StoreError>;
    async fn rename_programme(&self, old_name: &str, new_name: &str) -> Result<(), StoreError>;
    async fn delete_programme(&self, name: &str) -> Result<(), StoreError>;
    /// Case-insensitive lookup.
    async fn programme_exists(&self, name: &str) -> Result<bool, StoreError>;
}
