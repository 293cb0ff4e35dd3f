//! Scheduler-local errors (spec §4.A "Failure semantics").

use synapse_contracts::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown project '{0}'")]
    UnknownProject(String),
    #[error("project '{0}' is already registered")]
    DuplicateProject(String),
}

impl From<SchedulerError> for CoreError {
    fn from(err: SchedulerError) -> Self {
        let kind = match &err {
            SchedulerError::UnknownProject(_) => ErrorKind::UnknownProject,
            SchedulerError::DuplicateProject(_) => ErrorKind::Unknown,
        };
        CoreError::new(kind, err.to_string())
    }
}
