use qeo_core::QeoError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("EXPLAIN failed: {0}")]
    Explain(String),

    #[error("Baseline cost measurement failed: {0}")]
    BaselineMeasurement(String),

    #[error("Catalog query failed: {0}")]
    Catalog(String),

    #[error(transparent)]
    Core(#[from] QeoError),
}
