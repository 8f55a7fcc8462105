//! Error types for the refactoring engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for engine operations.
///
/// Validation and resolution errors always surface before any mutation.
/// Execution (IO) errors can occur after an in-memory mutation has been made;
/// callers must treat the affected files as "state unknown" and force a
/// reload before retrying, since there is no rollback.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Could not resolve symbol '{name}' ({kind}) in {path}")]
    Resolution {
        name: String,
        kind: String,
        path: PathBuf,
    },

    #[error("All removal strategies failed for '{name}': {last_error}")]
    RemovalExhausted { name: String, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tree-sitter parse error for {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Tree-sitter query error: {0}")]
    Query(#[from] tree_sitter::QueryError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Verification failed: {0}")]
    Verification(String),
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
