//! Compile-time-embedded JSON schemas and the runtime validator they back.
//!
//! Mirrors the teacher crate's `agent-agency-contracts::schema` module:
//! schemas are embedded with `include_str!` and compiled once behind
//! `once_cell::sync::Lazy`, so validation never touches the filesystem at
//! runtime.

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::debug;

use crate::error::{ContractError, ContractKind, ValidationIssue};

static BUS_ENVELOPE_SCHEMA_RAW: &str = include_str!("../../../docs/contracts/bus-envelope.schema.json");
static REQUEST_ENVELOPE_SCHEMA_RAW: &str = include_str!("../../../docs/contracts/request-envelope.schema.json");
static RESPONSE_ENVELOPE_SCHEMA_RAW: &str = include_str!("../../../docs/contracts/response-envelope.schema.json");

fn compile(kind: ContractKind, raw: &'static str) -> JSONSchema {
    let parsed: Value = serde_json::from_str(raw)
        .unwrap_or_else(|err| panic!("failed to parse {kind} schema embedded resource: {err}"));
    debug!(target: "contracts", %kind, "compiling contract schema");
    JSONSchema::compile(&parsed).unwrap_or_else(|err| panic!("failed to compile {kind} schema: {err}"))
}

static BUS_ENVELOPE_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile(ContractKind::BusEnvelope, BUS_ENVELOPE_SCHEMA_RAW));
static REQUEST_ENVELOPE_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile(ContractKind::RequestEnvelope, REQUEST_ENVELOPE_SCHEMA_RAW));
static RESPONSE_ENVELOPE_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile(ContractKind::ResponseEnvelope, RESPONSE_ENVELOPE_SCHEMA_RAW));

fn validate(kind: ContractKind, schema: &JSONSchema, value: &Value) -> Result<(), ContractError> {
    if let Err(errors) = schema.validate(value) {
        let issues: Vec<ValidationIssue> = errors
            .map(|e| ValidationIssue {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        return Err(ContractError::Validation { kind, issues });
    }
    Ok(())
}

pub fn validate_bus_envelope_value(value: &Value) -> Result<(), ContractError> {
    validate(ContractKind::BusEnvelope, &BUS_ENVELOPE_SCHEMA, value)
}

pub fn validate_request_envelope_value(value: &Value) -> Result<(), ContractError> {
    validate(ContractKind::RequestEnvelope, &REQUEST_ENVELOPE_SCHEMA, value)
}

pub fn validate_response_envelope_value(value: &Value) -> Result<(), ContractError> {
    validate(ContractKind::ResponseEnvelope, &RESPONSE_ENVELOPE_SCHEMA, value)
}

/// Major-version semver equality (spec §4.C: "version compatibility is major
/// version semver equality").
pub fn versions_compatible(a: &str, b: &str) -> bool {
    major_version(a).is_some() && major_version(a) == major_version(b)
}

fn major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_bus_envelope() {
        let value = json!({
            "id": "r-1",
            "type": "request",
            "version": "1.0.0",
            "timestamp": "2026-01-01T00:00:00Z",
            "payload": {}
        });
        assert!(validate_bus_envelope_value(&value).is_ok());
    }

    #[test]
    fn rejects_envelope_missing_required_field() {
        let value = json!({"id": "r-1", "type": "request"});
        let err = validate_bus_envelope_value(&value).unwrap_err();
        assert_eq!(err.kind(), ContractKind::BusEnvelope);
    }

    #[test]
    fn version_compatibility_checks_major_only() {
        assert!(versions_compatible("1.2.0", "1.9.3"));
        assert!(!versions_compatible("1.0.0", "2.0.0"));
        assert!(!versions_compatible("bogus", "1.0.0"));
    }
}
