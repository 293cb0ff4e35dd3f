//! Error-pattern learning (spec §4.E, §3 "Error-pattern record").
//!
//! Observational only, as spec.md is explicit: patterns bias nothing in this
//! crate's retry decisions, they are exported for the monitor's reporting
//! (spec §4.D "top-5 error patterns").

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a raw error message into a signature: numbers become `NUMBER`,
/// quoted strings become `STRING`, and whitespace is collapsed.
pub fn normalize_signature(message: &str) -> String {
    let step1 = QUOTED_RE.replace_all(message, "STRING");
    let step2 = NUMBER_RE.replace_all(&step1, "NUMBER");
    WHITESPACE_RE.replace_all(&step2, " ").trim().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPatternRecord {
    pub signature: String,
    pub occurrences: u64,
    pub operations: HashSet<String>,
    pub last_seen: DateTime<Utc>,
    pub avg_attempts_to_recover: f64,
}

/// Bounded store of observed error patterns, keyed by normalized signature.
/// Evicts the least-recently-seen pattern once `capacity` is exceeded (spec
/// §3: "error-patterns are bounded (eviction on count)").
pub struct ErrorPatternStore {
    capacity: usize,
    patterns: RwLock<HashMap<String, ErrorPatternRecord>>,
}

impl ErrorPatternStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_failure(&self, operation_id: &str, message: &str, attempts_to_recover: Option<u32>) {
        let signature = normalize_signature(message);
        let mut patterns = self.patterns.write().unwrap();

        if let Some(existing) = patterns.get_mut(&signature) {
            existing.occurrences += 1;
            existing.operations.insert(operation_id.to_string());
            existing.last_seen = Utc::now();
            if let Some(attempts) = attempts_to_recover {
                let n = existing.occurrences as f64;
                existing.avg_attempts_to_recover =
                    (existing.avg_attempts_to_recover * (n - 1.0) + attempts as f64) / n;
            }
            return;
        }

        if patterns.len() >= self.capacity {
            if let Some(oldest_key) = patterns
                .iter()
                .min_by_key(|(_, v)| v.last_seen)
                .map(|(k, _)| k.clone())
            {
                patterns.remove(&oldest_key);
            }
        }

        let mut operations = HashSet::new();
        operations.insert(operation_id.to_string());
        patterns.insert(
            signature.clone(),
            ErrorPatternRecord {
                signature,
                occurrences: 1,
                operations,
                last_seen: Utc::now(),
                avg_attempts_to_recover: attempts_to_recover.unwrap_or(0) as f64,
            },
        );
    }

    pub fn top_n(&self, n: usize) -> Vec<ErrorPatternRecord> {
        let patterns = self.patterns.read().unwrap();
        let mut all: Vec<ErrorPatternRecord> = patterns.values().cloned().collect();
        all.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        all.truncate(n);
        all
    }

    pub fn len(&self) -> usize {
        self.patterns.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_numbers_and_quoted_strings() {
        let sig = normalize_signature("failed to open 'file42.txt' after 3 attempts");
        assert_eq!(sig, "failed to open STRING after NUMBER attempts");
    }

    #[test]
    fn records_accumulate_occurrences_per_signature() {
        let store = ErrorPatternStore::new(10);
        store.record_failure("op_a", "connection reset after 1 try", Some(2));
        store.record_failure("op_b", "connection reset after 9 tries", Some(4));
        assert_eq!(store.len(), 1);
        let top = store.top_n(1);
        assert_eq!(top[0].occurrences, 2);
        assert_eq!(top[0].avg_attempts_to_recover, 3.0);
        assert_eq!(top[0].operations.len(), 2);
    }

    #[test]
    fn evicts_oldest_pattern_once_capacity_exceeded() {
        let store = ErrorPatternStore::new(1);
        store.record_failure("op_a", "error 1", None);
        store.record_failure("op_a", "error 2", None);
        assert_eq!(store.len(), 1);
    }
}
