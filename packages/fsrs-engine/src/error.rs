/// Errors raised at the engine's API boundary.
///
/// Every check happens before a computation starts, so a failed call leaves
/// nothing half-updated.
#[derive(Debug, thiserror::Error)]
pub enum FSRSError {
    #[error("invalid parameter vector: {0}")]
    InvalidParameterVector(String),
    #[error("desired retention must be in (0, 1], got {0}")]
    InvalidRetentionTarget(f64),
    #[error("invalid elapsed time: {0}")]
    InvalidElapsedTime(String),
    #[error("training set contains no items")]
    EmptyTrainingSet,
    #[error("invalid simulator config: {0}")]
    InvalidSimulatorConfig(String),
    #[error("invalid optimizer config: {0}")]
    InvalidOptimizerConfig(String),
    #[error("rating must be between 1 and 4, got {0}")]
    InvalidRating(u8),
    #[error("item must contain at least one review")]
    EmptyItem,
    #[error("invalid memory state: {0}")]
    InvalidMemoryState(String),
    #[error("invalid legacy scheduler state: {0}")]
    InvalidLegacyState(String),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FSRSError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FSRSError::InvalidRating(7).to_string(),
            "rating must be between 1 and 4, got 7"
        );
        assert_eq!(
            FSRSError::InvalidRetentionTarget(1.5).to_string(),
            "desired retention must be in (0, 1], got 1.5"
        );
    }

    #[test]
    fn test_config_error_from_json() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: FSRSError = err.into();
        assert!(matches!(err, FSRSError::Config(_)));
    }
}
