use crate::types::ParticipantId;

/// Result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur while creating or interacting with an exchange
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("At least {required} participants are needed, got {actual}")]
    InsufficientParticipants { required: usize, actual: usize },

    #[error("Assignment invariant violated: {0}")]
    AssignmentInvariantViolation(String),

    #[error("Participant {0} has no assigned recipient")]
    NoAssignment(ParticipantId),

    #[error("This device is already bound to participant {bound_to}")]
    AlreadyBound { bound_to: ParticipantId },

    #[error("This device has not claimed participant {0}")]
    NotOwner(ParticipantId),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid organizer credential")]
    InvalidCredential,

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl ExchangeError {
    pub fn event_not_found(id: &str) -> Self {
        Self::NotFound(format!("Event {}", id))
    }

    pub fn participant_not_found(id: &str) -> Self {
        Self::NotFound(format!("Participant {}", id))
    }

    /// Stable machine-readable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientParticipants { .. } => "INSUFFICIENT_PARTICIPANTS",
            Self::AssignmentInvariantViolation(_) => "ASSIGNMENT_INVARIANT_VIOLATION",
            Self::NoAssignment(_) => "NO_ASSIGNMENT",
            Self::AlreadyBound { .. } => "ALREADY_BOUND",
            Self::NotOwner(_) => "NOT_OWNER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// User-facing errors that leave no state behind and can simply be retried
    /// with different input. Everything else aborts the operation and points
    /// at a data-integrity or infrastructure problem.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientParticipants { .. }
                | Self::AlreadyBound { .. }
                | Self::NotOwner(_)
                | Self::InvalidInput(_)
                | Self::InvalidCredential
        )
    }
}
