//! The scheduler engine (spec §4.A): multi-project priority queue with
//! fair-share tokens, resource quotas, and aging.
//!
//! Selection is synchronous on a single logical thread holding the queue
//! lock (spec §5), so this crate holds all mutable state behind one
//! [`std::sync::Mutex`] rather than reaching for `tokio::sync` primitives —
//! there is no suspension point inside `next()`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::types::{
    HealthBucket, ProjectHealth, ProjectRecord, ResourceUsage, SchedulerSnapshot, SchedulerTask,
    TaskState,
};

const WAIT_HISTORY_CAPACITY: usize = 256;
/// Float-equality tolerance when comparing effective priorities (both sides
/// are sums of discrete aging steps, so exact ties are the common case, but
/// floating point adds defensive slack).
const PRIORITY_EPSILON: f64 = 1e-9;

struct Inner {
    projects: HashMap<String, ProjectRecord>,
    tasks: HashMap<String, SchedulerTask>,
    queued: Vec<String>,
    running: HashMap<String, SchedulerTask>,
    running_usage: HashMap<String, ResourceUsage>,
    completed: HashMap<String, SchedulerTask>,
    failed: HashMap<String, SchedulerTask>,
    tokens: HashMap<String, f64>,
    wait_history: VecDeque<StdDuration>,
}

/// Queue-health signal independent of per-project health scoring (spec
/// §4.A "health scoring (exported, not used internally)" is the same
/// surface this enriches; grounded on
/// `parallel-workers::learning::queue_health::QueueHealth`).
#[derive(Debug, Clone)]
pub struct QueueHealthSnapshot {
    pub depth: usize,
    pub average_wait_ms: f64,
    pub samples: usize,
}

/// Multi-project priority scheduler (spec §4.A).
pub struct Scheduler {
    config: SchedulerConfig,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                projects: HashMap::new(),
                tasks: HashMap::new(),
                queued: Vec::new(),
                running: HashMap::new(),
                running_usage: HashMap::new(),
                completed: HashMap::new(),
                failed: HashMap::new(),
                tokens: HashMap::new(),
                wait_history: VecDeque::new(),
            }),
        }
    }

    /// `register_project` — idempotent on id (spec §4.A): a project already
    /// registered is left unchanged rather than overwritten (see
    /// `DESIGN.md`; the spec does not say which of the two records should
    /// win, so this crate picks "first registration wins").
    pub fn register_project(&self, project: ProjectRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.projects.entry(project.id.clone()).or_insert(project);
    }

    /// Mutate an existing project's configuration in place (spec §6
    /// "update project config"). No-op on an unknown project id.
    pub fn update_project<F>(&self, project_id: &str, f: F)
    where
        F: FnOnce(&mut ProjectRecord),
    {
        let mut inner = self.inner.lock().unwrap();
        if let Some(project) = inner.projects.get_mut(project_id) {
            f(project);
            project.last_activity = Utc::now();
        }
    }

    pub fn project(&self, project_id: &str) -> Option<ProjectRecord> {
        self.inner.lock().unwrap().projects.get(project_id).cloned()
    }

    /// `enqueue(task)` — validates the project exists, computes the initial
    /// `effective_priority`, and inserts into the queued set (spec §4.A).
    pub fn enqueue(&self, mut task: SchedulerTask) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock().unwrap();
        let project = inner
            .projects
            .get(&task.project_id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownProject(task.project_id.clone()))?;

        task.effective_priority = Self::effective_priority_at(&self.config, &task, &project, Utc::now());
        task.state = TaskState::Queued;
        let task_id = task.task_id.clone();
        let project_id = task.project_id.clone();
        inner.tasks.insert(task_id.clone(), task);
        inner.queued.push(task_id);

        if let Some(project) = inner.projects.get_mut(&project_id) {
            project.statistics.enqueued_count += 1;
            project.last_activity = Utc::now();
        }
        Ok(())
    }

    /// `next()` — returns the highest-ranking eligible task, or `None` if
    /// nothing is eligible right now (never fails, spec §4.A).
    pub fn next(&self) -> Option<SchedulerTask> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        // Every scheduling pass replenishes each registered project's
        // fair-share tokens by its weight, bounded by `max_burst` (spec
        // §4.A "Fair-share token scheme").
        let max_burst = self.config.max_burst;
        let project_ids: Vec<String> = inner.projects.keys().cloned().collect();
        for project_id in &project_ids {
            let weight = inner.projects.get(project_id).map(|p| p.weight).unwrap_or(1.0);
            let entry = inner.tokens.entry(project_id.clone()).or_insert(0.0);
            *entry = (*entry + weight).min(max_burst);
        }

        let global_usage = Self::sum_usage(inner.running_usage.values());
        let global_limit = ResourceUsage {
            cpu: self.config.global_cpu_limit,
            memory: self.config.global_memory_limit,
        };

        let mut best: Option<(usize, f64)> = None; // (queued index, effective_priority)
        for (idx, task_id) in inner.queued.iter().enumerate() {
            let task = match inner.tasks.get(task_id) {
                Some(t) => t,
                None => continue,
            };
            let project = match inner.projects.get(&task.project_id) {
                Some(p) => p,
                None => continue,
            };

            let project_usage = inner
                .running_usage
                .get(&task.project_id)
                .copied()
                .unwrap_or_default();
            if !project_usage.saturating_add(&task.reservation).fits_within(&project.resource_quota) {
                continue;
            }
            if !global_usage.saturating_add(&task.reservation).fits_within(&global_limit) {
                continue;
            }

            let effective = Self::effective_priority_at(&self.config, task, project, now);
            best = Some(match best {
                None => (idx, effective),
                Some((best_idx, best_effective)) => {
                    let incumbent_id = &inner.queued[best_idx];
                    if Self::is_better(task_id, effective, incumbent_id, best_effective, &inner.tasks, &inner.tokens) {
                        (idx, effective)
                    } else {
                        (best_idx, best_effective)
                    }
                }
            });
        }

        let (winner_idx, _) = best?;
        let task_id = inner.queued.remove(winner_idx);

        let wait = inner
            .tasks
            .get(&task_id)
            .map(|t| now.signed_duration_since(t.enqueued_at))
            .and_then(|d| d.to_std().ok())
            .unwrap_or_default();
        if inner.wait_history.len() >= WAIT_HISTORY_CAPACITY {
            inner.wait_history.pop_front();
        }
        inner.wait_history.push_back(wait);

        let task = {
            let entry = inner.tasks.get_mut(&task_id).expect("queued task must exist");
            entry.state = TaskState::Running;
            entry.started_at = Some(now);
            entry.clone()
        };

        if let Some(balance) = inner.tokens.get_mut(&task.project_id) {
            *balance -= 1.0;
        }
        let usage = inner.running_usage.entry(task.project_id.clone()).or_default();
        *usage = usage.saturating_add(&task.reservation);
        if let Some(project) = inner.projects.get_mut(&task.project_id) {
            project.statistics.running_count += 1;
        }
        inner.running.insert(task_id, task.clone());

        Some(task)
    }

    /// `complete(task_id, result)` — removes from running, updates project
    /// statistics. No-op on an unknown task id (spec §4.A, idempotent).
    pub fn complete(&self, task_id: &str) {
        self.finish(task_id, true);
    }

    /// `fail(task_id, error)` — symmetric to [`Scheduler::complete`].
    pub fn fail(&self, task_id: &str) {
        self.finish(task_id, false);
    }

    fn finish(&self, task_id: &str, succeeded: bool) {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut task) = inner.running.remove(task_id) else {
            return;
        };
        task.state = if succeeded { TaskState::Completed } else { TaskState::Failed };

        if let Some(usage) = inner.running_usage.get_mut(&task.project_id) {
            usage.cpu = (usage.cpu - task.reservation.cpu).max(0.0);
            usage.memory = (usage.memory - task.reservation.memory).max(0.0);
        }
        if let Some(project) = inner.projects.get_mut(&task.project_id) {
            project.statistics.running_count = project.statistics.running_count.saturating_sub(1);
            if succeeded {
                project.statistics.completed_count += 1;
            } else {
                project.statistics.failed_count += 1;
            }
            project.last_activity = Utc::now();
        }

        if succeeded {
            inner.completed.insert(task_id.to_string(), task);
        } else {
            inner.failed.insert(task_id.to_string(), task);
        }
    }

    /// `snapshot()` — full state for dashboards (spec §4.A).
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let queued: Vec<SchedulerTask> = inner
            .queued
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .map(|task| {
                let mut task = task.clone();
                if let Some(project) = inner.projects.get(&task.project_id) {
                    task.effective_priority = Self::effective_priority_at(&self.config, &task, project, now);
                }
                task
            })
            .collect();

        let running: Vec<SchedulerTask> = inner.running.values().cloned().collect();
        let health = inner
            .projects
            .keys()
            .map(|id| self.health_for(&inner, id))
            .collect();

        SchedulerSnapshot {
            projects: inner.projects.values().cloned().collect(),
            queued,
            running,
            health,
            tokens: inner.tokens.clone(),
        }
    }

    pub fn queue_health(&self) -> QueueHealthSnapshot {
        let inner = self.inner.lock().unwrap();
        let samples = inner.wait_history.len();
        let average_wait_ms = if samples == 0 {
            0.0
        } else {
            inner.wait_history.iter().map(|d| d.as_millis() as f64).sum::<f64>() / samples as f64
        };
        QueueHealthSnapshot {
            depth: inner.queued.len(),
            average_wait_ms,
            samples,
        }
    }

    pub fn health(&self, project_id: &str) -> Option<ProjectHealth> {
        let inner = self.inner.lock().unwrap();
        if !inner.projects.contains_key(project_id) {
            return None;
        }
        Some(self.health_for(&inner, project_id))
    }

    fn health_for(&self, inner: &Inner, project_id: &str) -> ProjectHealth {
        let project = inner.projects.get(project_id).expect("project must exist");
        let backlog = inner.queued.iter().filter(|id| {
            inner.tasks.get(*id).map(|t| t.project_id == project_id).unwrap_or(false)
        }).count();
        let usage = inner.running_usage.get(project_id).copied().unwrap_or_default();

        let cpu_util = if project.resource_quota.cpu > 0.0 {
            usage.cpu / project.resource_quota.cpu
        } else {
            0.0
        };
        let memory_util = if project.resource_quota.memory > 0.0 {
            usage.memory / project.resource_quota.memory
        } else {
            0.0
        };
        let total_terminal = project.statistics.completed_count + project.statistics.failed_count;
        let failure_rate = if total_terminal > 0 {
            project.statistics.failed_count as f64 / total_terminal as f64
        } else {
            0.0
        };

        let score = (100.0
            - backlog as f64 * self.config.health_backlog_penalty_per_task
            - cpu_util.max(0.0) * self.config.health_cpu_penalty_scale
            - memory_util.max(0.0) * self.config.health_memory_penalty_scale
            - failure_rate * self.config.health_failure_rate_penalty_scale)
            .clamp(0.0, 100.0);

        ProjectHealth {
            project_id: project_id.to_string(),
            score,
            bucket: ProjectHealth::bucket_for(score),
        }
    }

    /// Effective-priority formula (spec §4.A step 1-2): `base_priority +
    /// age_boost + project_priority_bonus(project_id)`, where this crate
    /// treats `project.base_priority` as the project bonus term (see
    /// `DESIGN.md` — the data model names no separate bonus field).
    fn effective_priority_at(
        config: &SchedulerConfig,
        task: &SchedulerTask,
        project: &ProjectRecord,
        now: DateTime<Utc>,
    ) -> f64 {
        let elapsed_ms = now.signed_duration_since(task.enqueued_at).num_milliseconds().max(0) as f64;
        let interval_ms = config.aging_interval.as_millis().max(1) as f64;
        let steps = (elapsed_ms / interval_ms).floor();
        let age_boost = (steps * config.aging_increment).min(config.aging_cap).max(0.0);
        task.priority + age_boost + project.base_priority
    }

    fn sum_usage<'a>(values: impl Iterator<Item = &'a ResourceUsage>) -> ResourceUsage {
        values.fold(ResourceUsage::default(), |acc, v| acc.saturating_add(v))
    }

    /// Whether `candidate` should replace `incumbent` as the scheduling pass
    /// winner: higher effective priority wins outright; effective-priority
    /// ties are broken first by fair-share token balance (spec §4.A "Among
    /// eligible tasks ... choose the one whose project has the greatest
    /// positive token balance" — this crate resolves the literal reading as
    /// "break effective-priority ties by token balance", see `DESIGN.md`),
    /// then by earlier `enqueued_at`, then lexicographic `task_id` (spec
    /// §4.A tie-break order).
    fn is_better(
        candidate_id: &str,
        candidate_effective: f64,
        incumbent_id: &str,
        incumbent_effective: f64,
        tasks: &HashMap<String, SchedulerTask>,
        tokens: &HashMap<String, f64>,
    ) -> bool {
        if (candidate_effective - incumbent_effective).abs() > PRIORITY_EPSILON {
            return candidate_effective > incumbent_effective;
        }

        let candidate_task = &tasks[candidate_id];
        let incumbent_task = &tasks[incumbent_id];
        let candidate_tokens = tokens.get(&candidate_task.project_id).copied().unwrap_or(0.0);
        let incumbent_tokens = tokens.get(&incumbent_task.project_id).copied().unwrap_or(0.0);
        if (candidate_tokens - incumbent_tokens).abs() > PRIORITY_EPSILON {
            return candidate_tokens > incumbent_tokens;
        }

        if candidate_task.enqueued_at != incumbent_task.enqueued_at {
            return candidate_task.enqueued_at < incumbent_task.enqueued_at;
        }
        candidate_task.task_id < incumbent_task.task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceUsage;

    fn project(id: &str, weight: f64, base_priority: f64) -> ProjectRecord {
        ProjectRecord::new(id, id, "/tmp")
            .with_weight(weight)
            .with_base_priority(base_priority)
            .with_resource_quota(ResourceUsage { cpu: 2.0, memory: 4096.0 })
    }

    /// S1 — FIFO + priority (spec §8): T2 (priority 70) before T1/T3
    /// (priority 50 each, T1 enqueued first).
    #[test]
    fn s1_priority_then_fifo_within_one_project() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.register_project(project("P", 1.0, 0.0));

        scheduler.enqueue(SchedulerTask::new("T1", "P", 50.0)).unwrap();
        scheduler.enqueue(SchedulerTask::new("T2", "P", 70.0)).unwrap();
        scheduler.enqueue(SchedulerTask::new("T3", "P", 50.0)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| scheduler.next().map(|t| t.task_id)).collect();
        assert_eq!(order, vec!["T2", "T1", "T3"]);
    }

    #[test]
    fn enqueue_on_unknown_project_fails() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let err = scheduler.enqueue(SchedulerTask::new("T1", "ghost", 50.0)).unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownProject(_)));
    }

    #[test]
    fn next_on_empty_queue_returns_none_and_never_fails() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.register_project(project("P", 1.0, 0.0));
        assert!(scheduler.next().is_none());
    }

    #[test]
    fn complete_and_fail_are_idempotent_on_unknown_task() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.complete("ghost");
        scheduler.fail("ghost");
    }

    #[test]
    fn resource_quota_gate_defers_task_until_capacity_frees() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.register_project(
            project("P", 1.0, 0.0).with_resource_quota(ResourceUsage { cpu: 1.0, memory: 1024.0 }),
        );
        let big = SchedulerTask::new("big", "P", 50.0).with_reservation(ResourceUsage { cpu: 1.0, memory: 1024.0 });
        let small = SchedulerTask::new("small", "P", 40.0).with_reservation(ResourceUsage { cpu: 1.0, memory: 1024.0 });
        scheduler.enqueue(big).unwrap();
        scheduler.enqueue(small).unwrap();

        let first = scheduler.next().unwrap();
        assert_eq!(first.task_id, "big");
        // second task would exceed quota while `big` is running
        assert!(scheduler.next().is_none());

        scheduler.complete(&first.task_id);
        let second = scheduler.next().unwrap();
        assert_eq!(second.task_id, "small");
    }

    #[test]
    fn snapshot_reflects_queued_and_running_tasks() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.register_project(project("P", 1.0, 0.0));
        scheduler.enqueue(SchedulerTask::new("T1", "P", 50.0)).unwrap();
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.queued.len(), 1);
        scheduler.next();
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.queued.len(), 0);
        assert_eq!(snapshot.running.len(), 1);
    }

    #[test]
    fn register_project_is_idempotent() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.register_project(project("P", 1.0, 0.0));
        scheduler.register_project(project("P", 9.0, 99.0));
        assert_eq!(scheduler.project("P").unwrap().weight, 1.0);
    }
}
