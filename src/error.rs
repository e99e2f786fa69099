use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Voucher has already been redeemed")]
    AlreadyRedeemed,

    #[error("Insufficient credit (balance: {balance})")]
    InsufficientCredit { balance: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for callers that render their own messages.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyRedeemed => "ALREADY_REDEEMED",
            AppError::InsufficientCredit { .. } => "INSUFFICIENT_CREDIT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Json(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller caused the failure (as opposed to infrastructure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::NotFound(_)
                | AppError::AlreadyRedeemed
                | AppError::InsufficientCredit { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
