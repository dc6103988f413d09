//! Pieces shared by the reservation and cancellation workflows.

use crate::driver::DriverError;
use log::{debug, info};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Why a workflow run stopped before reaching its goal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// The page never reached a recognizable state
    #[error("{0}")]
    Navigation(String),
    /// Date or party size rejected before anything was clicked
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("no availability")]
    NoAvailability,
    #[error("Form validation errors: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),
    /// The site answered with an error banner
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Timeout(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<DriverError> for WorkflowError {
    fn from(e: DriverError) -> Self {
        if e.is_timeout() {
            WorkflowError::Timeout(e.to_string())
        } else {
            WorkflowError::Unexpected(e.to_string())
        }
    }
}

/// Map a driver timeout to `reason`, anything else to `Unexpected`
pub(crate) fn on_timeout(reason: &str) -> impl FnOnce(DriverError) -> WorkflowError + '_ {
    move |e| {
        if e.is_timeout() {
            debug!("{}", e);
            WorkflowError::Timeout(reason.to_string())
        } else {
            WorkflowError::from(e)
        }
    }
}

/// Identity and clock of one workflow invocation. Every log line of the run carries its id.
#[derive(Debug)]
pub struct RunLog {
    id: String,
    started: Instant,
}

impl RunLog {
    pub fn new(kind: &str) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self { id: format!("{}-{}", kind, &uuid[..8]), started: Instant::now() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Tracks which state a workflow has reached
#[derive(Debug)]
pub struct StageTracker<S> {
    run_id: String,
    stage: S,
}

impl<S: Copy + fmt::Debug> StageTracker<S> {
    pub fn new(run: &RunLog, initial: S) -> Self {
        Self { run_id: run.id().to_string(), stage: initial }
    }

    pub fn advance(&mut self, next: S) {
        info!("[{}] {:?} -> {:?}", self.run_id, self.stage, next);
        self.stage = next;
    }

    pub fn stage(&self) -> S {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validation_errors_are_joined() {
        let err = WorkflowError::ValidationFailed(vec![
            "email: Please enter a valid email".to_string(),
            "last_name field cannot be modified.".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Form validation errors: email: Please enter a valid email, last_name field cannot be modified."
        );
    }

    #[test]
    fn test_on_timeout_only_rewrites_timeouts() {
        let timeout = DriverError::Timeout { selector: "//x".to_string(), timeout: Duration::ZERO };
        assert_eq!(
            on_timeout("Confirm button not clickable in time.")(timeout),
            WorkflowError::Timeout("Confirm button not clickable in time.".to_string())
        );

        let missing = DriverError::NotFound("//x".to_string());
        assert!(matches!(on_timeout("ignored")(missing), WorkflowError::Unexpected(_)));
    }

    #[test]
    fn test_run_ids_are_unique_and_prefixed() {
        let a = RunLog::new("reserve");
        let b = RunLog::new("reserve");
        assert!(a.id().starts_with("reserve-"));
        assert_eq!(a.id().len(), "reserve-".len() + 8);
        assert_ne!(a.id(), b.id());
    }
}
