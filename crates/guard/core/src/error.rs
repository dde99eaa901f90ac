//! Common error infrastructure for guard-core.
//!
//! Behavior errors are never fatal to the frame loop: the state machine
//! surfaces invalid input as a value and leaves its state untouched, so the
//! host can skip movement for that frame and carry on.

/// Severity level of an error, used for categorization and recovery strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Temporary condition; the next frame may succeed.
    Recoverable,
    /// Invalid input that must be corrected by the caller.
    Validation,
    /// Unexpected internal inconsistency.
    Internal,
    /// The component cannot continue and must be rebuilt.
    Fatal,
}

impl ErrorSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }
}

/// Common trait for all guard-core errors.
pub trait GuardError: core::fmt::Display + core::fmt::Debug {
    fn severity(&self) -> ErrorSeverity;

    /// Stable identifier for metrics and tests.
    fn error_code(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// Errors reported by [`crate::StateMachine::update`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StateMachineError {
    #[error("awareness must be a finite non-negative number, got {value}")]
    InvalidAwareness { value: f32 },

    #[error("elapsed time must be finite and non-negative, got {dt_ms}ms")]
    InvalidElapsed { dt_ms: f32 },
}

impl GuardError for StateMachineError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAwareness { .. } => "STATE_INVALID_AWARENESS",
            Self::InvalidElapsed { .. } => "STATE_INVALID_ELAPSED",
        }
    }
}
