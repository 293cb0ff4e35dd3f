//! Error-kind taxonomy (spec §7) and contract-validation error types.

use std::fmt;

/// Tagged error classification shared by every component of the core.
///
/// This is a tag, not a type hierarchy: the recovery primitive, the bus, and
/// the broker all reason about the *kind* of failure rather than a
/// component-specific error enum, so that propagation policy (spec §7) is
/// decided in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    SessionTimeout,
    RateLimit,
    NetworkError,
    InputError,
    ProcessTimeout,
    ProcessCrashed,
    ValidationError,
    CircuitOpen,
    UnknownProject,
    TransportError,
    Unknown,
}

impl ErrorKind {
    /// Whether the recovery primitive should retry this kind by default.
    ///
    /// `SessionTimeout`, `InputError`, `ValidationError`, and `CircuitOpen`
    /// are excluded: they are either latching, caller-facing, or already a
    /// terminal decision made upstream of the retry loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::ProcessCrashed
                | ErrorKind::ProcessTimeout
                | ErrorKind::RateLimit
                | ErrorKind::Unknown
        )
    }

    pub fn is_latching(&self) -> bool {
        matches!(self, ErrorKind::SessionTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::SessionTimeout => "SessionTimeout",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::InputError => "InputError",
            ErrorKind::ProcessTimeout => "ProcessTimeout",
            ErrorKind::ProcessCrashed => "ProcessCrashed",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::CircuitOpen => "CircuitOpen",
            ErrorKind::UnknownProject => "UnknownProject",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}

/// Classify a raw error message using the non-recoverable signatures from
/// spec §4.E / §7: file-not-found, permission-denied, syntax errors, 4xx
/// authentication errors, and explicit "not found" text.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();

    if lower.contains("invalid api key")
        || lower.contains("please run /login")
        || lower.contains("api login failure")
        || lower.contains("authentication failed")
    {
        return ErrorKind::SessionTimeout;
    }
    if lower.contains("enoent")
        || lower.contains("no such file or directory")
        || lower.contains("eacces")
        || lower.contains("permission denied")
        || lower.contains("syntax error")
        || lower.contains("401 unauthorized")
        || lower.contains("403 forbidden")
        || lower.contains("404 not found")
        || lower.contains("not found")
    {
        return ErrorKind::InputError;
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return ErrorKind::ProcessTimeout;
    }
    if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
        return ErrorKind::NetworkError;
    }
    ErrorKind::Unknown
}

/// Contract artifact categories handled by the schema validation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    BusEnvelope,
    RequestEnvelope,
    ResponseEnvelope,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractKind::BusEnvelope => "bus-envelope",
            ContractKind::RequestEnvelope => "request-envelope",
            ContractKind::ResponseEnvelope => "response-envelope",
        };
        write!(f, "{}", label)
    }
}

/// Detailed validation failure emitted by the schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (instance: {}, schema: {})",
            self.message, self.instance_path, self.schema_path
        )
    }
}

/// Errors raised by the bus-boundary schema validator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContractError {
    #[error("{kind} envelope failed schema validation")]
    Validation {
        kind: ContractKind,
        issues: Vec<ValidationIssue>,
    },
    #[error("{kind} envelope version {found} is incompatible with expected major version {expected}")]
    VersionMismatch {
        kind: ContractKind,
        found: String,
        expected: String,
    },
}

impl ContractError {
    pub fn kind(&self) -> ContractKind {
        match self {
            ContractError::Validation { kind, .. } => *kind,
            ContractError::VersionMismatch { kind, .. } => *kind,
        }
    }

    /// The error-kind tag this maps to for propagation (spec §7: bus schema
    /// failures are `ValidationError` and are never reprocessed).
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::ValidationError
    }
}

/// The single error type threaded through recovery, bus, scheduler, and
/// broker internals (spec §9: "internal calls use statically typed
/// envelopes"). Carries the taxonomy tag plus a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a `CoreError` by classifying the message text (spec §4.E
    /// non-recoverable signatures).
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_message(&message);
        Self { kind, message }
    }
}

impl From<ContractError> for CoreError {
    fn from(err: ContractError) -> Self {
        CoreError::new(err.error_kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_session_timeout_case_insensitively() {
        assert_eq!(
            classify_message("Invalid API Key, please run /login"),
            ErrorKind::SessionTimeout
        );
    }

    #[test]
    fn classifies_input_errors_as_non_recoverable() {
        assert_eq!(classify_message("ENOENT: no such file or directory"), ErrorKind::InputError);
        assert!(!ErrorKind::InputError.is_recoverable());
    }

    #[test]
    fn unknown_defaults_to_recoverable() {
        assert!(ErrorKind::Unknown.is_recoverable());
    }
}
