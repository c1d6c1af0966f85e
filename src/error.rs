use crate::context::ContextError;
use thiserror::Error;

/// Appended to every timeout so the user knows what to check first.
pub const TIMEOUT_GUIDANCE: &str = "please ensure that you are using the migration cluster \
distribution and your migration configuration points to that cluster";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Remote(String),

    #[error("migration status not found")]
    StatusNotFound,

    #[error("Migration run not found: {0}")]
    RunNotFound(String),

    #[error("no data structures found to migrate")]
    NoDataStructures,

    #[error("{0}")]
    Migration(String),

    #[error("no migration in progress found")]
    NoMigrationInProgress,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("cancelled by user")]
    UserCancelled,

    #[error("{context}: {}", TIMEOUT_GUIDANCE)]
    Timeout { context: String },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("finalizing migration: {0}")]
    Finalize(Box<AppError>),

    #[error("{}", .0.join("\n"))]
    StagesFailed(Vec<String>),

    #[error("{pipeline}\n{finalize}")]
    WithFinalize {
        pipeline: Box<AppError>,
        finalize: Box<AppError>,
    },

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    pub fn context(self, context: impl Into<String>) -> Self {
        AppError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn timeout(context: impl Into<String>) -> Self {
        AppError::Timeout {
            context: context.into(),
        }
    }

    pub fn is_user_cancelled(&self) -> bool {
        match self {
            AppError::UserCancelled | AppError::Context(ContextError::Canceled) => true,
            AppError::WithContext { source, .. } | AppError::Finalize(source) => {
                source.is_user_cancelled()
            }
            AppError::WithFinalize { pipeline, .. } => pipeline.is_user_cancelled(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Timeout { .. } | AppError::Context(ContextError::DeadlineExceeded) => true,
            AppError::WithContext { source, .. } | AppError::Finalize(source) => source.is_timeout(),
            AppError::WithFinalize { pipeline, .. } => pipeline.is_timeout(),
            _ => false,
        }
    }
}

/// Formats the last line a command prints when it fails.
pub fn render_error_line(err: &AppError) -> String {
    if let AppError::WithFinalize { pipeline, finalize } = err {
        return format!(
            "{}\n{}",
            render_error_line(finalize),
            render_error_line(pipeline)
        );
    }
    if err.is_user_cancelled() {
        return "ERROR Cancelled".to_string();
    }
    let mut message = err.to_string();
    if let Some(first) = message.get(0..1) {
        let upper = first.to_ascii_uppercase();
        message.replace_range(0..1, &upper);
    }
    format!("ERROR {}", message)
}

pub type Result<T> = std::result::Result<T, AppError>;
