use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid plan file {path}: {source}")]
    Plan {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InvalidInput(_) | AppError::Plan { .. } => 2,
            _ => 1,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_exits_with_usage_code() {
        assert_eq!(AppError::InvalidInput("--shares must be > 0".into()).exit_code(), 2);
        let io = AppError::Output(std::io::Error::other("disk full"));
        assert_eq!(io.exit_code(), 1);
        assert_eq!(io.to_string(), "failed to write output: disk full");
    }
}
