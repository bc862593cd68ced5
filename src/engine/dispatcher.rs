use tracing::{Instrument, Span};
use crate::connectors::Connector;
use crate::utils::{
    types::{Job, JobKind, JobOutcome, Query},
    error::{AgentResult, DispatcherError},
};

/// Routes a fetched job to its handler and normalizes the result.
///
/// A job moves `RECEIVED -> HANDLING -> SUCCEEDED | FAILED` in one step; unknown
/// kinds go straight to `FAILED`. No error escapes `dispatch`: every failure
/// becomes a failed `JobOutcome` carrying the cause.
pub struct JobDispatcher {
    connector: Box<dyn Connector>,
    span: Span,
}

impl JobDispatcher {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self::with_span(connector, Span::none())
    }

    /// Create a dispatcher whose events are recorded under `span`
    pub fn with_span(connector: Box<dyn Connector>, span: Span) -> Self {
        Self { connector, span }
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Handle one job and report how it went
    pub async fn dispatch(&self, job: &Job) -> JobOutcome {
        let span = tracing::info_span!(parent: &self.span, "job", job_id = %job.id, kind = %job.kind);

        async {
            match self.handle(job).await {
                Ok(result_payload) => JobOutcome::success(result_payload),
                Err(e) => {
                    tracing::warn!(error = %e, "job handler failed");
                    JobOutcome::failure(e.job_message())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle(&self, job: &Job) -> AgentResult<String> {
        match &job.kind {
            JobKind::Ping => self.handle_ping().await,
            JobKind::DslQuery => self.handle_query(&job.payload).await,
            JobKind::FetchColumns | JobKind::SchemaRefresh => {
                Err(DispatcherError::NotImplemented(job.kind.to_string()).into())
            }
            JobKind::Unknown(kind) => Err(DispatcherError::UnknownJobKind(kind.clone()).into()),
        }
    }

    async fn handle_ping(&self) -> AgentResult<String> {
        self.connector.probe().await?;
        Ok(JobOutcome::EMPTY_RESULT.to_string())
    }

    async fn handle_query(&self, payload: &str) -> AgentResult<String> {
        let query = Query::parse(payload)?;
        let result = self.connector.run(&query).await?;

        tracing::info!(table = %query.table, row_count = result.row_count, "query finished");

        serde_json::to_string(&result)
            .map_err(|e| DispatcherError::Serialization(e.to_string()).into())
    }

    /// Release the connector; safe to call more than once
    pub async fn shutdown(&mut self) -> AgentResult<()> {
        self.connector.close().await
    }
}
