use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {actor_id} may not {action}")]
    Forbidden { actor_id: String, action: String },

    #[error("Content generation failed: {0}")]
    GenerationFailed(#[from] GeneratorError),

    #[error("Delivery failed for {target}: {message}")]
    DeliveryFailed { target: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Build a validation error for a field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a not-found error for an entity id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Unique constraint violated: {message}")]
    UniqueViolation { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(sqlx::Error),
}

impl StorageError {
    /// Whether this is a unique violation on a constraint of `table`.
    pub fn is_unique_violation_on(&self, table: &str) -> bool {
        match self {
            StorageError::UniqueViolation { message } => message.contains(&format!("{}.", table)),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StorageError::UniqueViolation {
                    message: db_err.message().to_string(),
                };
            }
        }
        StorageError::Sqlx(err)
    }
}

/// Content generator errors
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generator unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for content generator operations
pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::not_found("visit", "v-1");
        assert_eq!(err.to_string(), "visit not found: v-1");

        let err = AppError::validation("visit", "visit is not completed");
        assert_eq!(
            err.to_string(),
            "Validation failed: visit - visit is not completed"
        );

        let err = AppError::Conflict {
            message: "report already exists".to_string(),
        };
        assert_eq!(err.to_string(), "Conflict: report already exists");

        let err = AppError::Forbidden {
            actor_id: "u-9".to_string(),
            action: "regenerate_report".to_string(),
        };
        assert_eq!(err.to_string(), "Forbidden: u-9 may not regenerate_report");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::UniqueViolation {
            message: "reports.visit_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unique constraint violated: reports.visit_id"
        );

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_unique_violation_table_match() {
        let err = StorageError::UniqueViolation {
            message: "UNIQUE constraint failed: special_notes.recipient_id, special_notes.note_type".to_string(),
        };
        assert!(err.is_unique_violation_on("special_notes"));
        assert!(!err.is_unique_violation_on("reports"));

        let err = StorageError::UniqueViolation {
            message: "UNIQUE constraint failed: reports.visit_id".to_string(),
        };
        assert!(err.is_unique_violation_on("reports"));

        let err = StorageError::Query {
            message: "reports.visit_id".to_string(),
        };
        assert!(!err.is_unique_violation_on("reports"));
    }

    #[test]
    fn test_generator_error_display() {
        let err = GeneratorError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Generator unavailable: server down (retries: 3)"
        );

        let err = GeneratorError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = GeneratorError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_generator_error_converts_to_generation_failed() {
        let err: AppError = GeneratorError::InvalidResponse {
            message: "no json".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::GenerationFailed(_)));
        assert!(err.to_string().contains("Content generation failed"));
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let err: AppError = StorageError::Query {
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
