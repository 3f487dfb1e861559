use thiserror::Error;

/// Field-level rule violations. The message is what lands in the import ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Student ID is required")]
    IdRequired,
    #[error("Student ID must be 4 to 20 characters")]
    IdLength,
    #[error("Student ID must contain letters and digits only")]
    IdCharset,
    #[error("Full name is required")]
    NameRequired,
    #[error("Full name must be 2 to 60 characters")]
    NameLength,
    #[error("Full name must not contain digits")]
    NameDigits,
    #[error("Programme is required")]
    ProgrammeRequired,
    #[error("Level must be a number (100, 200, 300, 400)")]
    LevelNotNumber,
    #[error("Level must be one of: 100, 200, 300, 400")]
    LevelOutOfSet,
    #[error("GPA must be a number between 0.0 and 4.0")]
    GpaNotNumber,
    #[error("GPA must be between 0.0 and 4.0")]
    GpaOutOfRange,
    #[error("Email is required")]
    EmailRequired,
    #[error("Email must contain an @ sign and a dot")]
    EmailFormat,
    #[error("Phone number is required")]
    PhoneRequired,
    #[error("Phone number must be 10 digits (digits only)")]
    PhoneFormat,
    #[error("Date added must be in format yyyy-MM-dd (example: 2026-02-23)")]
    DateFormat,
    #[error("Status must be Active or Inactive")]
    StatusInvalid,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(#[from] RecordError),
    #[error("Student ID already exists. Use a different ID.")]
    DuplicateId,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Threshold must be between 0.0 and 4.0.")]
    ThresholdOutOfRange,
    #[error("Programme name is required.")]
    ProgrammeRequired,
    #[error("Programme already exists.")]
    ProgrammeExists,
    #[error(transparent)]
    Store(#[from] StoreError),
}
