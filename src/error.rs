use thiserror::Error;

/// Main error type for RAG Studio
#[derive(Error, Debug)]
pub enum RagstudioError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retrieval backend errors (search, query embedding)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Completion backend errors
    #[error("Completion error: {0}")]
    Completion(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Pipeline definition not found
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Pipeline config or benchmark request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation conflicts with one already in progress
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Query graph control-flow failure
    #[error("Graph execution error: {0}")]
    Graph(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for RagstudioError {
    fn from(err: serde_json::Error) -> Self {
        RagstudioError::Parse(err.to_string())
    }
}

/// Convenient Result type using RagstudioError
pub type Result<T> = std::result::Result<T, RagstudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagstudioError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_conflict_display() {
        let err = RagstudioError::Conflict("benchmark 'b1' is already running".to_string());
        assert_eq!(err.to_string(), "Conflict: benchmark 'b1' is already running");
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: RagstudioError = rusqlite_err.into();
        assert!(matches!(err, RagstudioError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RagstudioError = io_err.into();
        assert!(matches!(err, RagstudioError::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RagstudioError = json_err.into();
        assert!(matches!(err, RagstudioError::Parse(_)));
    }
}
