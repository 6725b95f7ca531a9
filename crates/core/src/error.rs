use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    #[error("phase cannot move backward from {from} to {to}")]
    BackwardTransition { from: String, to: String },
}
