//! The `Probe` trait (spec §4.D "Probe contract"), generalizing the
//! teacher's `HealthCheck` trait (`resilience::health_check`) from a single
//! binary-status check to a `{healthy, metrics, error}` report plus a
//! `heal()` remediation hook.

use std::collections::HashMap;

use async_trait::async_trait;
use synapse_contracts::CoreError;

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub healthy: bool,
    pub metrics: HashMap<String, f64>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn healthy(metrics: HashMap<String, f64>) -> Self {
        Self {
            healthy: true,
            metrics,
            error: None,
        }
    }

    pub fn unhealthy(metrics: HashMap<String, f64>, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            metrics,
            error: Some(error.into()),
        }
    }
}

/// `{ id, name, check() -> {healthy, metrics, error?}, heal(), enabled }`
/// (spec §4.D).
#[async_trait]
pub trait Probe: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn check(&self) -> ProbeReport;

    /// Attempt remediation. The monitor wraps every call in the recovery
    /// primitive with an emergency-healing fallback (spec §4.D "Healing
    /// control") — probes only need to implement the primary remediation.
    async fn heal(&self) -> Result<(), CoreError>;
}
