//! Error types for relief-router.
//!
//! Only hard failures live here. Insufficient supply and exhausted search
//! budgets are reported inside results (partial coverage, best-so-far plans).

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown node or edge identifier.
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing entity, e.g. `node "rc9"`.
        what: String,
    },

    /// No passable path between two nodes in the snapshot searched.
    #[error("No path from {origin} to {destination}")]
    Unreachable {
        origin: String,
        destination: String,
    },

    /// Malformed quantities, negative capacities, empty required fields.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
    },

    /// Both the supply and the demand sets were empty.
    #[error("Infeasible: {message}")]
    Infeasible {
        message: String,
    },

    /// IO error reading or writing a network definition.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error in a network definition or configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound { what: what.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unreachable(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        EngineError::Unreachable {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    pub fn infeasible(message: impl Into<String>) -> Self {
        EngineError::Infeasible {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("edge 12");
        assert!(err.to_string().contains("edge 12"));

        let err = EngineError::unreachable("rc1", "dz2");
        assert!(err.to_string().contains("rc1"));
        assert!(err.to_string().contains("dz2"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: EngineError = parse.into();
        assert!(matches!(err, EngineError::Json(_)));
    }
}
