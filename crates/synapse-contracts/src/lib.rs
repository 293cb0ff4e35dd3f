//! Shared wire contracts for the orchestration core.
//!
//! Provides the request/response envelope types, the error-kind taxonomy
//! used uniformly across the scheduler, broker, bus, and recovery primitive,
//! and JSON-Schema-backed validators for the bus boundary.

pub mod envelope;
pub mod error;
mod schema;

pub use envelope::{
    BusEnvelope, ModelPreference, Priority, RateLimitInfo, RequestContext, RequestEnvelope,
    ResponseEnvelope, ENVELOPE_VERSION,
};
pub use error::{ContractError, ContractKind, CoreError, ErrorKind, ValidationIssue, classify_message};
pub use schema::{
    validate_bus_envelope_value, validate_request_envelope_value, validate_response_envelope_value,
    versions_compatible,
};
