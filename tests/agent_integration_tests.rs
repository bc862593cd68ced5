use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sqlrunner_agent::{
    heartbeat_loop, job_loop, poll_once,
    AgentBuilder, AgentError, AgentResult, Connector, ConnectorInitConfig, ControllerClient,
    Job, JobDispatcher, JobKind, JobOutcome, JobPoll, MockConnector, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

/// Controller double that serves queued jobs and records every call
#[derive(Default)]
struct RecordingController {
    queue: Mutex<VecDeque<Job>>,
    polls: AtomicUsize,
    heartbeats: AtomicUsize,
    updates: Mutex<Vec<(String, JobOutcome)>>,
    advertised: Mutex<Vec<JobKind>>,
    fail_heartbeats: bool,
    fail_updates: bool,
    fail_polls: bool,
}

impl RecordingController {
    fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            queue: Mutex::new(jobs.into()),
            ..Default::default()
        }
    }

    fn updates(&self) -> Vec<(String, JobOutcome)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControllerClient for RecordingController {
    async fn heartbeat(&self) -> AgentResult<()> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        if self.fail_heartbeats {
            return Err(TransportError::RequestFailed("connection refused".to_string()).into());
        }
        Ok(())
    }

    async fn get_job(&self, supported_kinds: &[JobKind]) -> AgentResult<JobPoll> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        *self.advertised.lock().unwrap() = supported_kinds.to_vec();
        if self.fail_polls {
            return Err(TransportError::UnexpectedStatus { status: 503, body: "unavailable".to_string() }.into());
        }
        Ok(match self.queue.lock().unwrap().pop_front() {
            Some(job) => JobPoll::Job(job),
            None => JobPoll::NoJobsAvailable,
        })
    }

    async fn update_job(&self, job_id: &str, outcome: &JobOutcome) -> AgentResult<()> {
        self.updates.lock().unwrap().push((job_id.to_string(), outcome.clone()));
        if self.fail_updates {
            return Err(TransportError::RequestFailed("broken pipe".to_string()).into());
        }
        Ok(())
    }
}

async fn mock_dispatcher() -> JobDispatcher {
    let mut connector = MockConnector::with_delay(0);
    connector.connect(ConnectorInitConfig::new()).await.unwrap();
    JobDispatcher::new(Box::new(connector))
}

fn query_job(id: &str, payload: JsonValue) -> Job {
    Job::new(id, JobKind::DslQuery, &payload.to_string())
}

/// Wait until `check` holds, failing the test after a generous deadline
async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_no_job_available_reports_nothing() {
    let controller = RecordingController::default();
    let dispatcher = mock_dispatcher().await;

    let handled = assert_ok!(poll_once(&controller, &dispatcher).await);

    assert!(!handled);
    assert!(controller.updates().is_empty());
    assert_eq!(*controller.advertised.lock().unwrap(), JobKind::SUPPORTED.to_vec());
}

#[tokio::test]
async fn test_query_job_is_dispatched_and_reported() {
    let controller = RecordingController::with_jobs(vec![query_job("job-1", json!({
        "table": "users",
        "select": "name",
        "conditions": [{"column": "active", "type": "equal", "value": true}],
        "limit": 1
    }))]);
    let dispatcher = mock_dispatcher().await;

    assert!(assert_ok!(poll_once(&controller, &dispatcher).await));

    let updates = controller.updates();
    assert_eq!(updates.len(), 1);
    let (job_id, outcome) = &updates[0];
    assert_eq!(job_id, "job-1");
    assert!(outcome.succeeded);
    assert_eq!(
        serde_json::from_str::<JsonValue>(&outcome.result_payload).unwrap(),
        json!({"rows": [{"name": "Alice Johnson"}], "row_count": 1})
    );
}

#[tokio::test]
async fn test_unsupported_operator_fails_job_and_loop_survives() {
    let controller = RecordingController::with_jobs(vec![
        query_job("bad", json!({"table": "t", "conditions": [{"column": "c", "type": "bogus"}]})),
        Job::new("ping", JobKind::Ping, ""),
    ]);
    let dispatcher = mock_dispatcher().await;

    assert!(assert_ok!(poll_once(&controller, &dispatcher).await));
    assert!(assert_ok!(poll_once(&controller, &dispatcher).await));

    let updates = controller.updates();
    assert_eq!(updates[0].0, "bad");
    assert!(!updates[0].1.succeeded);
    assert_eq!(updates[0].1.result_payload, "{}");
    assert_eq!(updates[0].1.error_message, "unsupported condition type: bogus");

    assert_eq!(updates[1].0, "ping");
    assert!(updates[1].1.succeeded);
}

#[tokio::test]
async fn test_failed_report_is_not_retried() {
    let controller = RecordingController {
        fail_updates: true,
        ..RecordingController::with_jobs(vec![Job::new("j1", JobKind::Ping, "")])
    };
    let dispatcher = mock_dispatcher().await;

    match poll_once(&controller, &dispatcher).await {
        Err(AgentError::Transport(TransportError::RequestFailed(_))) => {}
        other => panic!("Expected transport failure, got {:?}", other),
    }

    // The job is gone from the queue and is not run again
    assert!(!assert_ok!(poll_once(&controller, &dispatcher).await));
    assert_eq!(controller.updates().len(), 1);
}

#[tokio::test]
async fn test_job_loop_keeps_polling_after_poll_failures() {
    let controller = RecordingController {
        fail_polls: true,
        ..Default::default()
    };
    let dispatcher = mock_dispatcher().await;
    let shutdown = CancellationToken::new();

    let stopper = shutdown.clone();
    let polls = async {
        eventually(|| controller.polls.load(Ordering::SeqCst) >= 3).await;
        stopper.cancel();
    };

    tokio::join!(
        job_loop(&controller, &dispatcher, Duration::from_millis(5), &shutdown),
        polls,
    );

    assert!(controller.updates().is_empty());
}

#[tokio::test]
async fn test_job_loop_processes_jobs_in_order_until_cancelled() {
    let controller = RecordingController::with_jobs(vec![
        Job::new("a", JobKind::Ping, ""),
        Job::new("b", JobKind::from("export".to_string()), "{}"),
        query_job("c", json!({"table": "products"})),
    ]);
    let dispatcher = mock_dispatcher().await;
    let shutdown = CancellationToken::new();

    let stopper = shutdown.clone();
    let watcher = async {
        eventually(|| controller.updates().len() == 3).await;
        stopper.cancel();
    };

    tokio::join!(
        job_loop(&controller, &dispatcher, Duration::from_millis(5), &shutdown),
        watcher,
    );

    let ids: Vec<String> = controller.updates().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let unknown = &controller.updates()[1].1;
    assert_eq!(unknown.error_message, "unhandled job kind: export");
}

#[tokio::test]
async fn test_job_loop_waits_one_period_before_first_poll() {
    let controller = RecordingController::with_jobs(vec![Job::new("early", JobKind::Ping, "")]);
    let dispatcher = mock_dispatcher().await;
    let shutdown = CancellationToken::new();

    let stopper = shutdown.clone();
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    };

    tokio::join!(
        job_loop(&controller, &dispatcher, Duration::from_secs(3600), &shutdown),
        canceller,
    );

    assert_eq!(controller.polls.load(Ordering::SeqCst), 0);
    assert!(controller.updates().is_empty());
}

#[tokio::test]
async fn test_cancel_during_dispatch_still_reports_job() {
    let controller = RecordingController::with_jobs(vec![
        query_job("slow", json!({"table": "users", "limit": 1})),
        Job::new("next", JobKind::Ping, ""),
    ]);
    let mut connector = MockConnector::with_delay(0).with_query_delay(Duration::from_millis(200));
    connector.connect(ConnectorInitConfig::new()).await.unwrap();
    let statements = connector.statements();
    let dispatcher = JobDispatcher::new(Box::new(connector));
    let shutdown = CancellationToken::new();

    let stopper = shutdown.clone();
    let canceller = async {
        // The statement is logged before the connector sleeps, so the job is mid-dispatch here
        eventually(|| !statements.lock().unwrap().is_empty()).await;
        assert!(controller.updates().is_empty());
        stopper.cancel();
    };

    tokio::join!(
        job_loop(&controller, &dispatcher, Duration::from_millis(5), &shutdown),
        canceller,
    );

    let updates = controller.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "slow");
    assert!(updates[0].1.succeeded);
    assert_eq!(controller.polls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.queue.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_heartbeat_fires_immediately() {
    let controller = Arc::new(RecordingController::default());
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(heartbeat_loop(
        controller.clone() as Arc<dyn ControllerClient>,
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    eventually(|| controller.heartbeats.load(Ordering::SeqCst) == 1).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_heartbeat_failures_do_not_stop_the_loop() {
    let controller = Arc::new(RecordingController {
        fail_heartbeats: true,
        ..Default::default()
    });
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(heartbeat_loop(
        controller.clone() as Arc<dyn ControllerClient>,
        Duration::from_millis(5),
        shutdown.clone(),
    ));

    eventually(|| controller.heartbeats.load(Ordering::SeqCst) >= 3).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_agent_runs_both_loops_and_stops_on_cancel() {
    let controller = Arc::new(RecordingController::with_jobs(vec![Job::new("p", JobKind::Ping, "")]));
    let agent = AgentBuilder::new()
        .with_agent_id("test-host.agent")
        .with_controller(controller.clone())
        .with_dispatcher(mock_dispatcher().await)
        .with_poll_interval(Duration::from_millis(5))
        .with_heartbeat_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    assert_eq!(agent.agent_id(), "test-host.agent");

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(agent.run(shutdown.clone()));

    eventually(|| controller.updates().len() == 1 && controller.heartbeats.load(Ordering::SeqCst) >= 1).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_ok!(result);
    assert!(controller.updates()[0].1.succeeded);
}
