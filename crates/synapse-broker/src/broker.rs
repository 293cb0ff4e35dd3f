//! The broker's dispatch loop (spec §4.B): pop from the bus, gate on state,
//! acquire a concurrency slot, spawn the model process, classify its
//! output, and emit a response — wired the way the teacher's evaluators
//! wrap process execution in recovery, generalized to a long-running loop
//! instead of a one-shot call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use synapse_bus::{responses_queue, Bus, REQUESTS_QUEUE};
use synapse_contracts::{
    BusEnvelope, CoreError, ModelPreference, RateLimitInfo, RequestEnvelope, ResponseEnvelope, ENVELOPE_VERSION,
};
use synapse_recovery::{execute_with_recovery, CircuitBreakerRegistry, RecoveryPolicy, RetryStrategy};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::classify::{self, Outcome};
use crate::config::BrokerConfig;
use crate::prompt::{augment_prompt, build_argv, CONTINUATION_DIRECTIVE};
use crate::process;
use crate::scratch::ScratchDir;
use crate::state::{BrokerState, BrokerStateCell};
use crate::stats::{BrokerStats, BrokerStatsSnapshot};

pub struct Broker {
    config: BrokerConfig,
    state: BrokerStateCell,
    stats: BrokerStats,
    bus: Arc<dyn Bus>,
    breakers: CircuitBreakerRegistry,
    semaphore: Arc<Semaphore>,
}

impl Broker {
    pub fn new(config: BrokerConfig, bus: Arc<dyn Bus>) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let breakers =
            CircuitBreakerRegistry::new(config.circuit_breaker_threshold, config.circuit_breaker_cooldown);
        Arc::new(Self {
            breakers,
            semaphore,
            config,
            state: BrokerStateCell::new(),
            stats: BrokerStats::default(),
            bus,
        })
    }

    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> BrokerState {
        self.state.get()
    }

    /// Observable control surface (spec §6): return to `running` from a
    /// latched `session_timeout`.
    pub fn reset_session(&self) {
        self.state.reset_session();
    }

    /// Stop accepting new dispatches; in-flight requests finish or are
    /// killed by their own timeout.
    pub fn shutdown(&self) {
        self.state.set_shutting_down();
    }

    /// Drive the dispatch loop until [`Broker::shutdown`] is called. The
    /// concurrency permit is acquired *before* the pop, so an envelope stays
    /// on the `requests` queue (and counts toward `queue_depth`) for as long
    /// as the broker is at its concurrency cap, rather than being drained
    /// into a pile of tasks parked on the semaphore (spec §5: "the broker
    /// applies backpressure by leaving envelopes on the request queue while
    /// at concurrency cap"). Each popped envelope is handled on its own task
    /// so a slow request never blocks the next `pop` (spec §4.B step 1: "If
    /// none, loop").
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.state.is_shutting_down() {
                break;
            }
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            match self.bus.pop(REQUESTS_QUEUE, Duration::from_secs(1)).await {
                Ok(Some(envelope)) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.handle_envelope(envelope, permit).await });
                }
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "bus pop failed");
                }
            }
        }
    }

    async fn handle_envelope(self: Arc<Self>, envelope: BusEnvelope, permit: OwnedSemaphorePermit) {
        let request: RequestEnvelope = match serde_json::from_value(envelope.payload.clone()) {
            Ok(request) => request,
            Err(err) => {
                self.reject_invalid_envelope(&envelope.payload, &err);
                return;
            }
        };

        if self.state.is_session_timeout() {
            self.stats.record_session_timeout();
            let response = ResponseEnvelope::failure(request.request_id.clone(), "broker is latched in session_timeout", 0, 0)
                .with_session_timeout();
            self.emit_response(&request.from_agent, response).await;
            return;
        }

        if let Some(until_ms) = self.state.rate_limit_gate() {
            let wait_ms = (until_ms - Utc::now().timestamp_millis()).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        let response = self.dispatch(&request).await;
        drop(permit);
        self.emit_response(&request.from_agent, response).await;
    }

    /// An envelope that failed to deserialize into a `RequestEnvelope` is
    /// dropped (spec §4.C "Schema validation"): a `validation_error`
    /// response is written to the sender's response queue if the raw
    /// payload names one, otherwise the error is only logged, since there
    /// is nowhere to deliver it.
    fn reject_invalid_envelope(self: &Arc<Self>, payload: &serde_json::Value, parse_error: &serde_json::Error) {
        let from_agent = payload.get("fromAgent").and_then(|v| v.as_str());
        let request_id = payload.get("requestId").and_then(|v| v.as_str()).unwrap_or("unknown");

        match from_agent {
            Some(from_agent) => {
                tracing::warn!(error = %parse_error, from_agent, request_id, "request envelope failed validation, notifying sender");
                let response = ResponseEnvelope::failure(
                    request_id.to_string(),
                    format!("validation_error: {parse_error}"),
                    0,
                    0,
                );
                let this = Arc::clone(self);
                let from_agent = from_agent.to_string();
                tokio::spawn(async move { this.emit_response(&from_agent, response).await });
            }
            None => {
                tracing::warn!(error = %parse_error, request_id, "request envelope failed validation, no fromAgent to notify, dropping");
            }
        }
    }

    async fn emit_response(&self, from_agent: &str, response: ResponseEnvelope) {
        match BusEnvelope::wrap_response(&response, ENVELOPE_VERSION) {
            Ok(envelope) => {
                if let Err(err) = self.bus.enqueue(&responses_queue(from_agent), envelope).await {
                    tracing::warn!(error = %err, from_agent, "failed to enqueue response");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize response envelope"),
        }
    }

    /// One full dispatch (spec §4.B steps 5-10): materialize scratch,
    /// spawn-classify (with the Execute-error continuation sub-protocol
    /// looping up to `max_retries`), unconditional scratch cleanup.
    async fn dispatch(self: &Arc<Self>, request: &RequestEnvelope) -> ResponseEnvelope {
        let timeout = Duration::from_millis(request.timeout_ms(self.config.default_timeout.as_millis() as u64));
        let include_files = request.include_files.clone().unwrap_or_default();

        let (scratch, materialized) =
            match ScratchDir::materialize(&self.config.scratch_root, &request.request_id, &include_files).await {
                Ok(value) => value,
                Err(err) => {
                    self.stats.record_failure();
                    return ResponseEnvelope::failure(request.request_id.clone(), err.to_string(), 0, 0);
                }
            };

        let model_preference = request.model_preference.clone().or_else(|| {
            (self.config.default_model.is_some() || self.config.default_fallback_model.is_some()).then(|| ModelPreference {
                primary: self.config.default_model.clone(),
                fallback: self.config.default_fallback_model.clone(),
            })
        });

        let base_prompt = match &request.system_prompt {
            Some(system_prompt) => format!("{system_prompt}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };

        let start = Instant::now();
        let mut stdin_text = augment_prompt(&base_prompt);
        let mut continuation = false;
        let mut total_attempts = 0u32;

        let response = loop {
            let argv = build_argv(&materialized, model_preference.as_ref(), continuation);
            let (outcome, attempts) = self.spawn_classified(&argv, &stdin_text, timeout).await;
            total_attempts += attempts;

            match outcome {
                Err(error) => {
                    self.stats.record_failure();
                    break ResponseEnvelope::failure(
                        request.request_id.clone(),
                        error.message,
                        start.elapsed().as_millis() as u64,
                        total_attempts,
                    );
                }
                Ok(Outcome::Success(text)) => {
                    self.stats.record_success();
                    break ResponseEnvelope::success(
                        request.request_id.clone(),
                        text,
                        start.elapsed().as_millis() as u64,
                        total_attempts,
                    );
                }
                Ok(Outcome::SessionTimeout) => {
                    self.state.set_session_timeout();
                    self.stats.record_session_timeout();
                    break ResponseEnvelope::failure(
                        request.request_id.clone(),
                        "session timeout detected in model output",
                        start.elapsed().as_millis() as u64,
                        total_attempts,
                    )
                    .with_session_timeout();
                }
                Ok(Outcome::RateLimit { message, epoch_seconds }) => {
                    let until_ms = epoch_seconds * 1000 + self.config.rate_limit_grace_ms;
                    self.state.set_rate_limited(until_ms);
                    self.stats.record_rate_limit();
                    self.stats.record_failure();
                    let wait_time = (until_ms - Utc::now().timestamp_millis()).max(0);
                    let info = RateLimitInfo {
                        message,
                        unlock_time: until_ms,
                        wait_time,
                    };
                    break ResponseEnvelope::failure(
                        request.request_id.clone(),
                        "rate limited",
                        start.elapsed().as_millis() as u64,
                        total_attempts,
                    )
                    .with_rate_limit_info(info);
                }
                Ok(Outcome::ExecuteError) => {
                    if total_attempts >= self.config.max_retries {
                        self.stats.record_failure();
                        break ResponseEnvelope::failure(
                            request.request_id.clone(),
                            "execute error: continuation sub-protocol exhausted",
                            start.elapsed().as_millis() as u64,
                            total_attempts,
                        );
                    }
                    continuation = true;
                    stdin_text = CONTINUATION_DIRECTIVE.to_string();
                }
                Ok(Outcome::Failure(error)) => {
                    self.stats.record_failure();
                    break ResponseEnvelope::failure(
                        request.request_id.clone(),
                        error,
                        start.elapsed().as_millis() as u64,
                        total_attempts,
                    );
                }
            }
        };

        scratch.cleanup().await;
        response
    }

    /// Spawn-and-classify wrapped in the recovery primitive (spec §7:
    /// `ProcessCrashed`/`ProcessTimeout`/`NetworkError`/`Unknown` are
    /// retried by the recovery primitive; the broker's own circuit breaker
    /// is keyed per broker instance since the spec does not key it by
    /// request).
    async fn spawn_classified(
        &self,
        argv: &[String],
        stdin_text: &str,
        timeout: Duration,
    ) -> (Result<Outcome, CoreError>, u32) {
        let policy = RecoveryPolicy::<Outcome> {
            max_retries: self.config.max_retries,
            strategy: RetryStrategy::ExponentialBackoff,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.2,
            circuit_breaker: true,
            backoff_multiplier: 2.0,
            fallback: None,
        };

        let command = self.config.command.clone();
        let argv = argv.to_vec();
        let stdin_text = stdin_text.to_string();
        let kill_grace = self.config.kill_grace;

        let (result, report) = execute_with_recovery("broker:dispatch", &self.breakers, None, &policy, || {
            let command = command.clone();
            let argv = argv.clone();
            let stdin_text = stdin_text.clone();
            async move {
                match process::spawn_and_capture(&command, &argv, &stdin_text, timeout, kill_grace).await {
                    Ok(outcome) => Ok(classify::classify(&outcome.stdout, &outcome.stderr, outcome.exit_success)),
                    Err(err) => Err(CoreError::from(err)),
                }
            }
        })
        .await;

        (result, report.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_bus::memory::MemoryBus;
    use synapse_bus::responses_queue;

    fn test_broker() -> Arc<Broker> {
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
        Broker::new(BrokerConfig::default(), bus)
    }

    #[tokio::test]
    async fn malformed_envelope_with_from_agent_gets_a_validation_error_response() {
        let broker = test_broker();
        let payload = serde_json::json!({
            "requestId": "r-1",
            "fromAgent": "issue-processor"
            // missing required `type`/`prompt` fields
        });
        let envelope = BusEnvelope::new("r-1", "request", ENVELOPE_VERSION, payload);

        let permit = broker.semaphore.clone().acquire_owned().await.unwrap();
        Arc::clone(&broker).handle_envelope(envelope, permit).await;
        // emit_response runs on its own spawned task; give it a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let response = broker
            .bus
            .pop(&responses_queue("issue-processor"), Duration::from_millis(100))
            .await
            .unwrap()
            .expect("a validation_error response should have been written");
        let parsed: ResponseEnvelope = serde_json::from_value(response.payload).unwrap();
        assert!(!parsed.success);
        assert!(parsed.error.unwrap().starts_with("validation_error"));
    }

    #[tokio::test]
    async fn malformed_envelope_without_from_agent_is_dropped_silently() {
        let broker = test_broker();
        let payload = serde_json::json!({"requestId": "r-2"});
        let envelope = BusEnvelope::new("r-2", "request", ENVELOPE_VERSION, payload);

        let permit = broker.semaphore.clone().acquire_owned().await.unwrap();
        Arc::clone(&broker).handle_envelope(envelope, permit).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(broker.bus.snapshot().await.len(), 0);
    }

    #[tokio::test]
    async fn session_timeout_state_fails_fast_without_spawning_a_child() {
        let broker = test_broker();
        broker.state.set_session_timeout();

        let payload = serde_json::json!({
            "requestId": "r-3",
            "fromAgent": "issue-processor",
            "type": "code-review",
            "prompt": "do the thing"
        });
        let envelope = BusEnvelope::new("r-3", "request", ENVELOPE_VERSION, payload);

        let permit = broker.semaphore.clone().acquire_owned().await.unwrap();
        Arc::clone(&broker).handle_envelope(envelope, permit).await;

        let response = broker
            .bus
            .pop(&responses_queue("issue-processor"), Duration::from_millis(100))
            .await
            .unwrap()
            .expect("a session_timeout response should have been written");
        let parsed: ResponseEnvelope = serde_json::from_value(response.payload).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.session_timeout, Some(true));
        assert_eq!(broker.stats().session_timeouts, 1);
    }
}
