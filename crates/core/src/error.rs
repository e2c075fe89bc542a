#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Unknown job phase: {0}")]
    UnknownPhase(String),
}
