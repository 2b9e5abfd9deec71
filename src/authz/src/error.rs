//! Error types for the field authorization engine

use thiserror::Error;

/// Field authorization errors
///
/// A denied field is *not* an error: it resolves to a substitute value or is
/// omitted. Errors are reserved for misconfigured schemas, rules that raise,
/// explicit access refusals and rejected input.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Schema misconfiguration, raised while building
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A rule explicitly refused access
    #[error("Access denied: {0}")]
    Access(String),

    /// Input rejected by the validation collaborator
    #[error("{0}")]
    Validation(String),

    /// A rule, prop or resolver failed while being evaluated
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthzError {
    /// Shorthand for an access refusal
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    /// Shorthand for a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether transport layers should report this as an authorization failure
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Access(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_error_kind() {
        let err = AuthzError::access("No access to set Item.price");
        assert!(err.is_access_denied());
        assert_eq!(err.to_string(), "Access denied: No access to set Item.price");

        let err = AuthzError::configuration("readRules is not specified");
        assert!(!err.is_access_denied());
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = AuthzError::Validation("\"c\" is required".to_string());
        assert_eq!(err.to_string(), "\"c\" is required");
    }

    #[test]
    fn test_serde_errors_convert() {
        fn parse(raw: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }

        let err = parse("{").unwrap_err();
        assert!(matches!(err, AuthzError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error: "));
    }
}
