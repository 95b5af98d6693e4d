//! End-to-end delivery tests against a local HTTP receiver.
//!
//! Each test runs the full path: registration lookup, filtering, shaping,
//! task persistence, queueing and signed HTTP delivery.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hookrelay::config::HookrelayConfig;
use hookrelay::models::{
    Commit, CommitAuthor, EventSubscription, PushPayload, RepositoryRef, UserRef,
};
use hookrelay::webhooks::{
    DELIVERY_HEADER, EVENT_HEADER, HUB_SIGNATURE_HEADER, SIGNATURE_HEADER, verify_signature,
};
use hookrelay::{
    EventSource, HookEventType, HookId, HookPayload, ProviderKind, Registration,
    RegistrationScope, WebhookService,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Received {
    path: &'static str,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Received {
    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

type Inbox = Arc<Mutex<Vec<Received>>>;

async fn accept(
    State(inbox): State<Inbox>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> StatusCode {
    inbox.lock().unwrap().push(Received {
        path: "/hook",
        headers,
        body: body.to_vec(),
    });
    StatusCode::OK
}

async fn reject(
    State(inbox): State<Inbox>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, &'static str) {
    inbox.lock().unwrap().push(Received {
        path: "/broken",
        headers,
        body: body.to_vec(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, "receiver exploded")
}

async fn receiver() -> (String, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = Router::new()
        .route("/hook", post(accept))
        .route("/broken", post(reject))
        .with_state(Arc::clone(&inbox));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), inbox)
}

fn repo() -> RepositoryRef {
    RepositoryRef {
        id: 7,
        owner_id: 3,
        name: "widgets".to_string(),
        full_name: "acme/widgets".to_string(),
        html_url: "https://git.example.com/acme/widgets".to_string(),
    }
}

fn push(branch: &str, commits: usize) -> HookPayload {
    let commit = Commit {
        id: "9f8e7d6c5b4a".to_string(),
        message: "Fix the frobnicator\n\nLonger body.".to_string(),
        url: "https://git.example.com/acme/widgets/commit/9f8e7d6c5b4a".to_string(),
        author: CommitAuthor {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        },
        timestamp: None,
    };
    HookPayload::Push(PushPayload {
        git_ref: format!("refs/heads/{branch}"),
        before: "0000".to_string(),
        after: "9f8e".to_string(),
        compare_url: String::new(),
        commits: vec![commit; commits],
        total_commits: commits,
        repository: repo(),
        pusher: UserRef::new(1, "alice"),
    })
}

fn push_registration(id: i64, url: String) -> Registration {
    Registration::new(id, url, RegistrationScope::Repository { repo_id: 7 })
        .with_events([HookEventType::Push].into_iter().collect::<EventSubscription>())
        .with_branch_filter("main")
        .with_secret("s3cret")
}

fn in_memory(registrations: Vec<Registration>) -> WebhookService {
    let config = registrations
        .into_iter()
        .fold(HookrelayConfig::new(), HookrelayConfig::with_registration);
    WebhookService::open(&config).unwrap()
}

async fn notify_and_drain(service: &WebhookService, payload: &HookPayload) -> Vec<hookrelay::TaskId> {
    let pool = service.start();
    let report = service
        .notify(&EventSource::repository(repo()), HookEventType::Push, payload)
        .await
        .unwrap();
    pool.drain().await;
    pool.shutdown().await;
    report.created
}

#[tokio::test]
async fn push_to_main_is_delivered_and_signed() {
    let (base, inbox) = receiver().await;
    let service = in_memory(vec![push_registration(1, format!("{base}/hook"))]);

    let created = notify_and_drain(&service, &push("main", 2)).await;
    assert_eq!(created.len(), 1);

    let task = service.task(created[0]).unwrap();
    assert!(task.delivered);
    assert!(task.succeeded);
    assert_eq!(task.status_code, Some(200));

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.body, task.payload);
    assert_eq!(request.header(EVENT_HEADER), "push");
    assert_eq!(request.header(DELIVERY_HEADER), task.id.to_string());
    assert!(verify_signature("s3cret", &request.body, request.header(SIGNATURE_HEADER)));
    assert!(request.header(HUB_SIGNATURE_HEADER).starts_with("sha256="));
    assert!(verify_signature("s3cret", &request.body, request.header(HUB_SIGNATURE_HEADER)));
}

#[tokio::test]
async fn push_to_filtered_branch_creates_no_task() {
    let (base, inbox) = receiver().await;
    let service = in_memory(vec![push_registration(1, format!("{base}/hook"))]);

    let created = notify_and_drain(&service, &push("feature/x", 2)).await;
    assert!(created.is_empty());
    assert!(service.tasks(HookId::new(1), 10).unwrap().is_empty());
    assert!(inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_receiver_does_not_affect_siblings() {
    let (base, inbox) = receiver().await;
    let service = in_memory(vec![
        push_registration(1, format!("{base}/broken")),
        push_registration(2, format!("{base}/hook")),
    ]);

    let created = notify_and_drain(&service, &push("main", 1)).await;
    assert_eq!(created.len(), 2);

    let broken = &service.tasks(HookId::new(1), 10).unwrap()[0];
    assert!(broken.delivered);
    assert!(!broken.succeeded);
    assert_eq!(broken.status_code, Some(500));
    assert_eq!(broken.response_snippet.as_deref(), Some("receiver exploded"));

    let healthy = &service.tasks(HookId::new(2), 10).unwrap()[0];
    assert!(healthy.succeeded);
    assert_eq!(inbox.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn zero_commit_push_only_reaches_native_receivers() {
    let (base, inbox) = receiver().await;
    let slack = push_registration(2, format!("{base}/hook"))
        .with_provider(ProviderKind::Slack)
        .with_meta(serde_json::json!({ "channel": "#builds" }));
    let service = in_memory(vec![push_registration(1, format!("{base}/hook")), slack]);

    let created = notify_and_drain(&service, &push("main", 0)).await;
    assert_eq!(created.len(), 1);
    assert_eq!(service.task(created[0]).unwrap().hook_id, HookId::new(1));
    assert_eq!(inbox.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn replay_delivers_identical_payload_again() {
    let (base, inbox) = receiver().await;
    let service = in_memory(vec![push_registration(1, format!("{base}/hook"))]);
    let created = notify_and_drain(&service, &push("main", 1)).await;

    let pool = service.start();
    let replay = service.replay(HookId::new(1), created[0]).await.unwrap();
    pool.drain().await;
    pool.shutdown().await;

    let task = service.task(replay).unwrap();
    assert!(task.succeeded);
    assert_eq!(task.replay_of, Some(created[0]));

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].body, received[1].body);
    assert_ne!(
        received[0].header(DELIVERY_HEADER),
        received[1].header(DELIVERY_HEADER)
    );
    assert!(received.iter().all(|r| r.path == "/hook"));
}

#[tokio::test]
async fn pending_tasks_survive_restart() {
    let (base, inbox) = receiver().await;
    let dir = tempfile::tempdir().unwrap();
    let config = HookrelayConfig::new()
        .with_data_dir(dir.path())
        .with_registration(push_registration(1, format!("{base}/hook")));

    let task_id = {
        let service = WebhookService::open(&config).unwrap();
        let report = service
            .notify(&EventSource::repository(repo()), HookEventType::Push, &push("main", 1))
            .await
            .unwrap();
        assert!(inbox.lock().unwrap().is_empty());
        report.created[0]
    };

    let service = WebhookService::open(&config).unwrap();
    assert!(!service.task(task_id).unwrap().delivered);
    assert_eq!(service.recover().await.unwrap(), 1);

    let pool = service.start();
    pool.drain().await;
    pool.shutdown().await;

    assert!(service.task(task_id).unwrap().succeeded);
    assert_eq!(inbox.lock().unwrap().len(), 1);
    assert_eq!(service.recover().await.unwrap(), 0);
}
