use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("request {request_number}/{position_number} already exists")]
    DuplicateRequest {
        request_number: String,
        position_number: String,
    },
    #[error(
        "unsupported database schema version {found}; this binary supports up to {supported}. Please upgrade omis."
    )]
    UnsupportedSchemaVersion { supported: u32, found: u32 },
}

impl CoreError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
