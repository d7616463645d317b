use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Deleting the row would orphan rows that reference it.
    #[error("{entity} {id} is still referenced and cannot be deleted")]
    Protected { entity: &'static str, id: i64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to load template {path}: {message}")]
    Template { path: String, message: String },

    #[error("Failed to write workbook: {0}")]
    Write(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
