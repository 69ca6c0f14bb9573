use thiserror::Error;

/// Closed error taxonomy for the scoring core (see spec §7).
///
/// Per-asset failures (`TransientProvider`, `RateLimited`,
/// `QuotaExhausted`, `AuthFailure`, `InsufficientData`, `Ineligible`) are
/// caught inside a job and counted on the run's `JobReport`; they never
/// propagate out of a run as an `AppError`. The remaining variants are
/// run-level or caller-visible (ad-hoc path).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("asset ineligible: {0}")]
    Ineligible(String),

    #[error("user daily quota exceeded")]
    QuotaExceeded,

    #[error("provider quota exhausted")]
    QuotaExhausted,

    #[error("provider auth failure: {0}")]
    AuthFailure(String),

    #[error("provider rate limited")]
    RateLimited,

    #[error("transient provider error: {0}")]
    TransientProvider(String),

    #[error("another publish is already in progress for this scope")]
    PublishConflict,

    #[error("job run {0} not found")]
    JobRunNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
