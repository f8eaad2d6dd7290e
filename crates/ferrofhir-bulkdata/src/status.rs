//! Job status and the shared control handle.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Lifecycle status of one export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Starting => write!(f, "starting"),
            JobStatus::Started => write!(f, "started"),
            JobStatus::Stopping => write!(f, "stopping"),
            JobStatus::Stopped => write!(f, "stopped"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Shared handle for observing and steering a running job.
///
/// Cloned into every partition task; partitions poll it between chunks
/// (cooperative cancellation - no kill signal exists).
#[derive(Debug, Clone)]
pub struct JobControl {
    status: Arc<RwLock<JobStatus>>,
}

impl JobControl {
    /// Creates a handle in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(JobStatus::Starting)),
        }
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        *self.status.read().expect("poisoned lock")
    }

    /// Sets the status.
    pub fn set(&self, status: JobStatus) {
        *self.status.write().expect("poisoned lock") = status;
    }

    /// Requests a cooperative stop. Only a `Started` job transitions to
    /// `Stopping`; any other state is left unchanged.
    pub fn request_stop(&self) {
        let mut status = self.status.write().expect("poisoned lock");
        if *status == JobStatus::Started {
            *status = JobStatus::Stopping;
        }
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::Starting.to_string(), "starting");
        assert_eq!(JobStatus::Started.to_string(), "started");
        assert_eq!(JobStatus::Stopping.to_string(), "stopping");
        assert_eq!(JobStatus::Stopped.to_string(), "stopped");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_serialization() {
        let status = JobStatus::Started;
        let serialized = serde_json::to_string(&status).unwrap();
        assert_eq!(serialized, "\"started\"");

        let deserialized: JobStatus = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, status);
    }

    #[test]
    fn test_request_stop_only_from_started() {
        let control = JobControl::new();
        control.request_stop();
        assert_eq!(control.status(), JobStatus::Starting);

        control.set(JobStatus::Started);
        control.request_stop();
        assert_eq!(control.status(), JobStatus::Stopping);

        control.set(JobStatus::Completed);
        control.request_stop();
        assert_eq!(control.status(), JobStatus::Completed);
    }
}
