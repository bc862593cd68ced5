use async_trait::async_trait;
use crate::utils::{
    types::{Job, JobKind, JobOutcome},
    error::AgentResult,
};

/// Result of asking the controller for work
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    /// Nothing queued; not an error
    NoJobsAvailable,
    Job(Job),
}

/// RPC surface of the central controller.
///
/// Implementations authenticate every call themselves; callers only see
/// agent-level operations.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Announce that this agent is alive
    async fn heartbeat(&self) -> AgentResult<()>;

    /// Fetch at most one job among `supported_kinds`
    async fn get_job(&self, supported_kinds: &[JobKind]) -> AgentResult<JobPoll>;

    /// Report the outcome of a job
    async fn update_job(&self, job_id: &str, outcome: &JobOutcome) -> AgentResult<()>;
}
