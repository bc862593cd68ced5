use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::protocol::controller_trait::{ControllerClient, JobPoll};
use crate::utils::{
    config::ControllerConfig,
    types::{Job, JobKind, JobOutcome},
    error::{AgentError, AgentResult, TransportError},
};

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    agent_id: &'a str,
    connector_id: &'a str,
}

#[derive(Debug, Serialize)]
struct PollRequest<'a> {
    agent_id: &'a str,
    connector_id: &'a str,
    supported_kinds: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    has_job: bool,
    #[serde(default)]
    job: Option<WireJob>,
}

#[derive(Debug, Deserialize)]
struct WireJob {
    id: String,
    kind: JobKind,
    #[serde(default)]
    payload_json: String,
}

#[derive(Debug, Serialize)]
struct UpdateJobRequest<'a> {
    job_id: &'a str,
    agent_id: &'a str,
    success: bool,
    result_json: &'a str,
    error_message: &'a str,
}

/// Controller client speaking JSON over HTTP with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpControllerClient {
    client: Client,
    base_url: Url,
    auth_token: String,
    agent_id: String,
    connector_id: String,
}

impl HttpControllerClient {
    pub fn new(config: &ControllerConfig, agent_id: &str) -> AgentResult<Self> {
        let mut base_url = Url::parse(config.url.trim())
            .map_err(|e| AgentError::Configuration(format!("Invalid controller url: {}", e)))?;

        // join() replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| AgentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth_token: config.auth_token.clone(),
            agent_id: agent_id.to_string(),
            connector_id: config.connector_id.clone(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn endpoint(&self, path: &str) -> AgentResult<Url> {
        self.base_url.join(path)
            .map_err(|e| AgentError::Internal(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn job_endpoint(&self, job_id: &str) -> AgentResult<Url> {
        let mut url = self.endpoint("v1/jobs/")?;
        url.path_segments_mut()
            .map_err(|_| AgentError::Internal("controller url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(job_id);
        Ok(url)
    }

    /// POST `body` as JSON and fail on anything but a 2xx answer
    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> AgentResult<Response> {
        let response = self.client.post(url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            }.into());
        }

        Ok(response)
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn heartbeat(&self) -> AgentResult<()> {
        let request = HeartbeatRequest {
            agent_id: &self.agent_id,
            connector_id: &self.connector_id,
        };
        self.post(self.endpoint("v1/agents/heartbeat")?, &request).await?;
        Ok(())
    }

    async fn get_job(&self, supported_kinds: &[JobKind]) -> AgentResult<JobPoll> {
        let request = PollRequest {
            agent_id: &self.agent_id,
            connector_id: &self.connector_id,
            supported_kinds: supported_kinds.iter().map(JobKind::as_str).collect(),
        };

        let response: PollResponse = self.post(self.endpoint("v1/jobs/poll")?, &request).await?
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        into_job_poll(response)
    }

    async fn update_job(&self, job_id: &str, outcome: &JobOutcome) -> AgentResult<()> {
        let request = UpdateJobRequest {
            job_id,
            agent_id: &self.agent_id,
            success: outcome.succeeded,
            result_json: &outcome.result_payload,
            error_message: &outcome.error_message,
        };
        self.post(self.job_endpoint(job_id)?, &request).await?;
        Ok(())
    }
}

fn into_job_poll(response: PollResponse) -> AgentResult<JobPoll> {
    match (response.has_job, response.job) {
        (false, _) => Ok(JobPoll::NoJobsAvailable),
        (true, Some(job)) => Ok(JobPoll::Job(Job {
            id: job.id,
            kind: job.kind,
            payload: job.payload_json,
        })),
        (true, None) => Err(TransportError::InvalidResponse("has_job set without a job".to_string()).into()),
    }
}
