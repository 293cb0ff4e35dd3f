//! Scheduler domain types (spec §3: "Scheduler task", "Project record").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CPU/memory usage or quota, in the scheduler's own units (cores, MiB).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
}

impl ResourceUsage {
    pub fn fits_within(&self, other: &ResourceUsage) -> bool {
        self.cpu <= other.cpu && self.memory <= other.memory
    }

    pub fn saturating_add(&self, other: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            cpu: self.cpu + other.cpu,
            memory: self.memory + other.memory,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub enqueued_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub running_count: u64,
}

/// `{ id, name, path, base_priority, weight, resource_quota, statistics,
/// registered_at, last_activity }` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    /// Doubles as `project_priority_bonus(project_id)` in the effective-
    /// priority formula (spec §4.A) — the data model names no separate
    /// bonus field, so this project-level base priority is the bonus term.
    pub base_priority: f64,
    pub weight: f64,
    pub resource_quota: ResourceUsage,
    pub statistics: ProjectStatistics,
    pub registered_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            base_priority: 0.0,
            weight: 1.0,
            resource_quota: ResourceUsage { cpu: 4.0, memory: 4096.0 },
            statistics: ProjectStatistics::default(),
            registered_at: now,
            last_activity: now,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_base_priority(mut self, base_priority: f64) -> Self {
        self.base_priority = base_priority;
        self
    }

    pub fn with_resource_quota(mut self, quota: ResourceUsage) -> Self {
        self.resource_quota = quota;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// `{ task_id, project_id, issue_number?, priority, effective_priority,
/// enqueued_at, deadline?, started_at?, metadata }` (spec §3).
///
/// Carries a `reservation` beyond the literal data model table: the
/// resource-quota gate (spec §4.A) needs a per-task cpu/memory cost to add
/// against the project's quota, and the spec names no field for it. Callers
/// that don't care default to [`ResourceUsage::default`] (see
/// `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerTask {
    pub task_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    pub priority: f64,
    pub effective_priority: f64,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub reservation: ResourceUsage,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub state: TaskState,
}

impl SchedulerTask {
    pub fn new(task_id: impl Into<String>, project_id: impl Into<String>, priority: f64) -> Self {
        Self {
            task_id: task_id.into(),
            project_id: project_id.into(),
            issue_number: None,
            priority: priority.clamp(0.0, 100.0),
            effective_priority: priority.clamp(0.0, 100.0),
            enqueued_at: Utc::now(),
            deadline: None,
            started_at: None,
            reservation: ResourceUsage::default(),
            metadata: serde_json::Map::new(),
            state: TaskState::Queued,
        }
    }

    pub fn with_reservation(mut self, reservation: ResourceUsage) -> Self {
        self.reservation = reservation;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthBucket {
    Healthy,
    Warning,
    Critical,
}

/// Health scoring (spec §4.A: "exported, not used internally").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHealth {
    pub project_id: String,
    pub score: f64,
    pub bucket: HealthBucket,
}

impl ProjectHealth {
    pub fn bucket_for(score: f64) -> HealthBucket {
        if score >= 80.0 {
            HealthBucket::Healthy
        } else if score >= 60.0 {
            HealthBucket::Warning
        } else {
            HealthBucket::Critical
        }
    }
}

/// Full-state snapshot for dashboards (spec §4.A `snapshot()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub projects: Vec<ProjectRecord>,
    pub queued: Vec<SchedulerTask>,
    pub running: Vec<SchedulerTask>,
    pub health: Vec<ProjectHealth>,
    pub tokens: HashMap<String, f64>,
}
