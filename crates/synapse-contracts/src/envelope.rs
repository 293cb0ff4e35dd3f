//! Request/response envelopes and the bus wire envelope (spec §3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The envelope version this build emits and accepts (spec §4.C: "version
/// compatibility is major-version semver equality"). Every envelope the core
/// constructs carries this value; the bus boundary compares an inbound
/// envelope's major version against it.
pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Caller-expressed scheduling priority (spec §3 `context.priority`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// Base priority contribution used by the scheduler when a request
    /// carries a scheduling hint but no explicit numeric priority.
    pub fn base_value(&self) -> u8 {
        match self {
            Priority::High => 80,
            Priority::Normal => 50,
            Priority::Low => 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPreference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// The unit on the `requests` bus queue (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub request_id: String,
    pub from_agent: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preference: Option<ModelPreference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RequestEnvelope {
    pub fn priority(&self) -> Priority {
        self.context
            .as_ref()
            .and_then(|c| c.priority)
            .unwrap_or_default()
    }

    pub fn timeout_ms(&self, default_ms: u64) -> u64 {
        self.context
            .as_ref()
            .and_then(|c| c.timeout)
            .unwrap_or(default_ms)
    }

    pub fn project_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.project_id.as_deref())
    }
}

/// Rate-limit details echoed back on a `RateLimit`-classified response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub message: String,
    /// Epoch milliseconds after which the broker will resume dispatch.
    pub unlock_time: i64,
    /// Milliseconds remaining until `unlock_time`, captured at emit time.
    pub wait_time: i64,
}

/// The unit on the `responses:<agent>` bus queue (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn success(request_id: impl Into<String>, result: impl Into<String>, execution_time: u64, attempts: u32) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            result: Some(result.into()),
            error: None,
            execution_time,
            attempts,
            session_timeout: None,
            rate_limit_info: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(request_id: impl Into<String>, error: impl Into<String>, execution_time: u64, attempts: u32) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            execution_time,
            attempts,
            session_timeout: None,
            rate_limit_info: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_session_timeout(mut self) -> Self {
        self.session_timeout = Some(true);
        self
    }

    pub fn with_rate_limit_info(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit_info = Some(info);
        self
    }
}

/// Outer envelope carried on every named bus queue (spec §4.C schema).
///
/// `RequestEnvelope`/`ResponseEnvelope` are serialized into `payload`; the
/// bus validates only this outer shell plus, when it recognizes `type`, the
/// inner payload against the matching contract schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub envelope_type: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl BusEnvelope {
    pub fn new(
        id: impl Into<String>,
        envelope_type: impl Into<String>,
        version: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            envelope_type: envelope_type.into(),
            version: version.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn wrap_request(request: &RequestEnvelope, version: &str) -> serde_json::Result<Self> {
        Ok(Self::new(
            request.request_id.clone(),
            "request",
            version,
            serde_json::to_value(request)?,
        ))
    }

    pub fn wrap_response(response: &ResponseEnvelope, version: &str) -> serde_json::Result<Self> {
        Ok(Self::new(
            response.request_id.clone(),
            "response",
            version,
            serde_json::to_value(response)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips_wire_casing() {
        let json = serde_json::json!({
            "requestId": "r-1",
            "fromAgent": "issue-processor",
            "type": "code-review",
            "prompt": "review this diff",
            "context": {"timeout": 5000, "priority": "high", "projectId": "p-1"}
        });
        let req: RequestEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(req.request_id, "r-1");
        assert_eq!(req.priority(), Priority::High);
        assert_eq!(req.project_id(), Some("p-1"));
    }

    #[test]
    fn response_envelope_serializes_camel_case() {
        let resp = ResponseEnvelope::success("r-1", "ok", 120, 1);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["requestId"], "r-1");
        assert_eq!(value["executionTime"], 120);
    }
}
