//! Multi-project priority scheduler (spec §4.A): fair-share tokens, resource
//! quotas, aging, and per-project health scoring.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod types;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{QueueHealthSnapshot, Scheduler};
pub use types::{
    HealthBucket, ProjectHealth, ProjectRecord, ProjectStatistics, ResourceUsage,
    SchedulerSnapshot, SchedulerTask, TaskState,
};

#[cfg(test)]
mod scenario_tests {
    //! S2 from spec §8: aging overrides priority.

    use std::time::Duration;

    use chrono::Utc;

    use crate::config::SchedulerConfig;
    use crate::scheduler::Scheduler;
    use crate::types::{ProjectRecord, SchedulerTask};

    #[test]
    fn s2_aging_overrides_priority_after_thirty_seconds() {
        let config = SchedulerConfig {
            aging_interval: Duration::from_secs(10),
            aging_increment: 20.0,
            aging_cap: 60.0,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(config);
        scheduler.register_project(ProjectRecord::new("P", "P", "/tmp"));

        let mut low = SchedulerTask::new("T_low", "P", 10.0);
        low.enqueued_at = Utc::now() - chrono::Duration::seconds(30);
        scheduler.enqueue(low).unwrap();

        scheduler.enqueue(SchedulerTask::new("T_high", "P", 60.0)).unwrap();

        let snapshot = scheduler.snapshot();
        let low_snapshot = snapshot.queued.iter().find(|t| t.task_id == "T_low").unwrap();
        assert_eq!(low_snapshot.effective_priority, 70.0);

        let first = scheduler.next().unwrap();
        assert_eq!(first.task_id, "T_low");
    }
}
