//! Unified error types for the lifeline engine.
//!
//! Content defects are caught once, when a protocol document is loaded
//! ([`ProtocolError`]).  At runtime the interpreter only ever reports
//! [`EngineError`], and the session controller recovers from those by
//! holding position.  Keyword misses and loop-cap exits are *not* errors:
//! they surface as `Ok(false)` and as events respectively.

use core::fmt;

use crate::protocol::StepId;

// ---------------------------------------------------------------------------
// Load-time protocol errors
// ---------------------------------------------------------------------------

/// A protocol document could not be turned into a runnable step graph.
#[derive(Debug)]
pub enum ProtocolError {
    /// The document is not valid JSON or does not match the schema.
    Parse(serde_json::Error),
    /// The document declares no steps at all.
    EmptyProtocol,
    /// Two steps share the same id.
    DuplicateStep(StepId),
    /// `initial_step_id` does not name a step.
    UnknownInitialStep(StepId),
    /// A step references a step id that is not in the graph.
    DanglingReference {
        step: StepId,
        edge: &'static str,
        target: StepId,
    },
    /// A step lacks an outgoing edge it needs to stay escapable.
    MissingFallbackEdge { step: StepId, edge: &'static str },
    /// A step's content is structurally unusable.
    InvalidStep { step: StepId, reason: &'static str },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "protocol document malformed: {e}"),
            Self::EmptyProtocol => write!(f, "protocol has no steps"),
            Self::DuplicateStep(id) => write!(f, "duplicate step id '{id}'"),
            Self::UnknownInitialStep(id) => write!(f, "initial step '{id}' does not exist"),
            Self::DanglingReference { step, edge, target } => {
                write!(f, "step '{step}': {edge} references unknown step '{target}'")
            }
            Self::MissingFallbackEdge { step, edge } => {
                write!(f, "step '{step}': missing required {edge}")
            }
            Self::InvalidStep { step, reason } => write!(f, "step '{step}': {reason}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Runtime interpreter errors
// ---------------------------------------------------------------------------

/// Errors the step interpreter can report while a session is running.
///
/// With a validated protocol neither variant is reachable through graph
/// edges; `UnknownStep` can still come from an explicit path selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A transition named a step that is not part of the loaded graph.
    UnknownStep(StepId),
    /// A step needed a fallback edge that the protocol does not define.
    MissingFallbackEdge { step: StepId, edge: &'static str },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStep(id) => write!(f, "unknown step '{id}'"),
            Self::MissingFallbackEdge { step, edge } => {
                write!(f, "step '{step}' has no {edge} to fall back on")
            }
        }
    }
}

impl std::error::Error for EngineError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating a [`SessionConfig`](crate::config::SessionConfig).
#[derive(Debug)]
pub enum ConfigError {
    /// The config document could not be parsed.
    Parse(serde_json::Error),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "config malformed: {e}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::ValidationFailed(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Interpreter-wide `Result` alias.
pub type Result<T> = core::result::Result<T, EngineError>;
