use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::{
    connectors::{create_connector, ConnectorInitConfig},
    engine::JobDispatcher,
    protocol::{ControllerClient, HttpControllerClient, JobPoll},
    utils::{
        config::{AgentConfig, ScheduleConfig},
        error::{AgentError, AgentResult},
        logging::agent_span,
        types::JobKind,
    },
};

/// Identity reported to the controller: `<hostname>.<uuid-v4>`, fresh on each start
pub fn generate_agent_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string());

    format!("{}.{}", host, Uuid::new_v4())
}

/// A running agent: one job loop and one heartbeat loop against one controller
pub struct Agent {
    agent_id: String,
    controller: Arc<dyn ControllerClient>,
    dispatcher: JobDispatcher,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    span: Span,
}

impl Agent {
    /// Connect the configured backend and controller client.
    ///
    /// Fails fast on bad configuration or an unreachable database; nothing is
    /// retried here.
    pub async fn from_config(config: &AgentConfig) -> AgentResult<Agent> {
        config.validate()?;

        let agent_id = generate_agent_id();
        let span = agent_span(&agent_id, &config.controller.connector_id);

        let mut connector = create_connector(config.database.backend);
        connector.connect(ConnectorInitConfig::from(&config.database))
            .instrument(span.clone())
            .await?;

        let controller = HttpControllerClient::new(&config.controller, &agent_id)?;

        AgentBuilder::new()
            .with_agent_id(&agent_id)
            .with_controller(Arc::new(controller))
            .with_dispatcher(JobDispatcher::with_span(connector, span.clone()))
            .with_schedule(&config.schedule)
            .with_span(span)
            .build()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Run both loops until `shutdown` fires, then release the backend
    pub async fn run(mut self, shutdown: CancellationToken) -> AgentResult<()> {
        let span = self.span.clone();

        async {
            tracing::info!(
                backend = %self.dispatcher.connector().get_connector_type(),
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                heartbeat_interval_ms = self.heartbeat_interval.as_millis() as u64,
                "agent started"
            );

            let heartbeat = tokio::spawn(
                heartbeat_loop(Arc::clone(&self.controller), self.heartbeat_interval, shutdown.clone())
                    .instrument(Span::current())
            );

            job_loop(self.controller.as_ref(), &self.dispatcher, self.poll_interval, &shutdown).await;

            if let Err(e) = heartbeat.await {
                tracing::error!(error = %e, "heartbeat task ended abnormally");
            }

            if let Err(e) = self.dispatcher.shutdown().await {
                tracing::warn!(error = %e, "failed to close backend");
            }

            tracing::info!("agent stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Send a heartbeat right away and then once per `period` until cancelled.
/// Failures are logged and the next tick tries again.
pub async fn heartbeat_loop(
    controller: Arc<dyn ControllerClient>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match controller.heartbeat().await {
                    Ok(()) => tracing::debug!("heartbeat sent"),
                    Err(e) => tracing::error!(error = %e, "heartbeat failed"),
                }
            }
        }
    }
}

/// Poll for one job per tick until cancelled. The first poll happens one full
/// period after start. A job in flight is dispatched and reported before
/// cancellation is observed.
pub async fn job_loop(
    controller: &dyn ControllerClient,
    dispatcher: &JobDispatcher,
    period: Duration,
    shutdown: &CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Cancellation wins over a tick that came due during a long dispatch
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = poll_once(controller, dispatcher).await {
                    tracing::error!(error = %e, "job cycle failed");
                }
            }
        }
    }
}

/// One fetch, dispatch, report cycle. Returns whether a job was handled.
///
/// A failed report is not retried and the job is not run again.
pub async fn poll_once(controller: &dyn ControllerClient, dispatcher: &JobDispatcher) -> AgentResult<bool> {
    let job = match controller.get_job(&JobKind::SUPPORTED).await? {
        JobPoll::NoJobsAvailable => {
            tracing::trace!("no job available");
            return Ok(false);
        }
        JobPoll::Job(job) => job,
    };

    tracing::info!(job_id = %job.id, kind = %job.kind, "job received");
    let outcome = dispatcher.dispatch(&job).await;
    tracing::info!(job_id = %job.id, kind = %job.kind, succeeded = outcome.succeeded, "job completed");

    controller.update_job(&job.id, &outcome).await?;
    Ok(true)
}

/// Builder for assembling an agent from its parts
pub struct AgentBuilder {
    agent_id: Option<String>,
    controller: Option<Arc<dyn ControllerClient>>,
    dispatcher: Option<JobDispatcher>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    span: Option<Span>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        let schedule = ScheduleConfig::default();
        Self {
            agent_id: None,
            controller: None,
            dispatcher: None,
            poll_interval: schedule.poll_period(),
            heartbeat_interval: schedule.heartbeat_period(),
            span: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn with_controller(mut self, controller: Arc<dyn ControllerClient>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: JobDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Take both intervals from configuration
    pub fn with_schedule(mut self, schedule: &ScheduleConfig) -> Self {
        self.poll_interval = schedule.poll_period();
        self.heartbeat_interval = schedule.heartbeat_period();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> AgentResult<Agent> {
        let controller = self.controller
            .ok_or_else(|| AgentError::Configuration("agent requires a controller client".to_string()))?;
        let dispatcher = self.dispatcher
            .ok_or_else(|| AgentError::Configuration("agent requires a job dispatcher".to_string()))?;

        if self.poll_interval.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(AgentError::Configuration("intervals must be greater than zero".to_string()));
        }

        Ok(Agent {
            agent_id: self.agent_id.unwrap_or_else(generate_agent_id),
            controller,
            dispatcher,
            poll_interval: self.poll_interval,
            heartbeat_interval: self.heartbeat_interval,
            span: self.span.unwrap_or_else(Span::none),
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
