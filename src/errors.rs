use procflow_core::ProcessError;
use thiserror::Error;

/// Errores de la aplicación demo.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    #[error("script error: {0}")]
    Script(String),
}
