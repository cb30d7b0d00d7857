use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use jobgate_api::{Config, FormField, FormSpec, Service, StartupError};
use jobgate_core::JobId;
use jobgate_identity::{AccessToken, BotClient, MockProvider, MockProviderHandle, StaticSecrets};
use jobgate_infra::Database;
use jobgate_infra::jobs::{Job, JobAction, JobStatus, JobStore, SqliteJobStore, ValueMap};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use serde_json::Value;
use tokio::sync::Notify;

const COOKIE_NAME: &str = "jobgate-session";

/// Records every job it runs and checks the bot client against the provider.
#[derive(Clone, Default)]
struct RecordingAction {
    seen: Arc<Mutex<Vec<ValueMap>>>,
}

#[async_trait]
impl JobAction for RecordingAction {
    async fn run(&self, job: &Job, client: &BotClient) -> anyhow::Result<()> {
        let path = format!("/users/{}/tokens", client.username());
        let tokens: Vec<AccessToken> = client.get_json(&path).await?;
        if tokens.is_empty() {
            bail!("bot has no tokens");
        }
        if job.value_map.get("fail").map(String::as_str) == Some("on") {
            bail!("asked to fail");
        }
        self.seen.lock().unwrap().push(job.value_map.clone());
        Ok(())
    }
}

/// Holds every job until released.
#[derive(Default)]
struct GatedAction {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl JobAction for GatedAction {
    async fn run(&self, _job: &Job, _client: &BotClient) -> anyhow::Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

fn form() -> FormSpec {
    FormSpec::default()
        .field(FormField::text("repository", "Repository"))
        .field(FormField::checkbox("fail", "Fail this job"))
}

struct TestServer {
    service: Service,
    base_url: String,
    _provider: MockProviderHandle,
}

impl TestServer {
    async fn spawn(db_dir: &Path, action: impl JobAction + 'static) -> Self {
        let provider = MockProvider::new().spawn().await.unwrap();
        let mut service = service(db_dir, &provider.base_url())
            .with_form(form())
            .with_action(action);
        let addr = service.start().await.expect("service failed to start");

        Self {
            service,
            base_url: format!("http://{addr}"),
            _provider: provider,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Cookie header value for a fresh session.
    async fn login(&self, identity_token: &str) -> String {
        let session = self
            .service
            .sessions()
            .unwrap()
            .create_session(identity_token)
            .await
            .unwrap();
        format!("{COOKIE_NAME}={}", session.id)
    }
}

fn service(db_dir: &Path, provider_url: &str) -> Service {
    let config = Config {
        bind: "127.0.0.1:0".parse().unwrap(),
        db_path: db_dir.join("jobgate.db"),
        provider_url: provider_url.to_string(),
        workers: 2,
        poll_interval: Duration::from_millis(10),
        ..Config::default()
    };
    Service::new(config).with_secrets(StaticSecrets::new("testbot", "secret"))
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn submit(srv: &TestServer, cookie: &str, body: &'static str) -> String {
    let res = client()
        .post(srv.url("/"))
        .header(COOKIE, cookie)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "queued");
    body["job_id"].as_str().unwrap().to_string()
}

async fn wait_for_status(srv: &TestServer, cookie: &str, id: &str, status: &str) -> Value {
    for _ in 0..200 {
        let res = client()
            .get(srv.url(&format!("/log/{id}")))
            .header(COOKIE, cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        if body["status"] == status {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}");
}

#[tokio::test]
async fn missing_cookie_redirects_to_login() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;

    let res = client().get(srv.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "/login");
    srv.service.stop().await;
}

#[tokio::test]
async fn unknown_cookie_redirects_to_login() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;

    let res = client()
        .get(srv.url("/"))
        .header(COOKIE, format!("{COOKIE_NAME}=bad cookie"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "/login");
    srv.service.stop().await;
}

#[tokio::test]
async fn every_protected_route_redirects_without_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let unknown = format!("{COOKIE_NAME}=0191a5c4-7b2e-4c8a-9f00-000000000000");

    for cookie in [None, Some("theme=dark"), Some(unknown.as_str())] {
        for (method, path) in [
            (reqwest::Method::GET, "/"),
            (reqwest::Method::POST, "/"),
            (reqwest::Method::GET, "/log"),
            (reqwest::Method::GET, "/log/42"),
        ] {
            let mut req = client().request(method.clone(), srv.url(path));
            if let Some(cookie) = cookie {
                req = req.header(COOKIE, cookie);
            }
            let res = req.send().await.unwrap();
            assert_eq!(
                res.status(),
                StatusCode::FOUND,
                "{method} {path} with cookie {cookie:?}"
            );
        }
    }
    srv.service.stop().await;
}

#[tokio::test]
async fn public_routes_need_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;

    let res = client().get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client().get(srv.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["cookie"], COOKIE_NAME);
    srv.service.stop().await;
}

#[tokio::test]
async fn valid_session_reaches_form_and_unknown_job_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let cookie = srv.login("fake token").await;

    let res = client()
        .get(srv.url("/"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["fields"][0]["name"], "repository");
    assert_eq!(body["fields"][1]["kind"], "checkbox");

    // No body and no form content type: an empty submission.
    let res = client()
        .post(srv.url("/"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client()
        .get(srv.url("/log/42"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    srv.service.stop().await;
}

#[tokio::test]
async fn submitted_job_runs_with_the_bot_client() {
    let dir = tempfile::tempdir().unwrap();
    let action = RecordingAction::default();
    let mut srv = TestServer::spawn(dir.path(), action.clone()).await;
    let cookie = srv.login("fake token").await;

    let id = submit(&srv, &cookie, "repository=alpha%2Fbeta&note=x").await;
    let detail = wait_for_status(&srv, &cookie, &id, "succeeded").await;

    assert_eq!(detail["id"], id.as_str());
    assert_eq!(detail["values"]["repository"], "alpha/beta");
    assert_eq!(detail["values"]["note"], "x");
    assert!(detail.get("error").is_none());

    let seen = action.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get("repository").map(String::as_str), Some("alpha/beta"));

    let res = client()
        .get(srv.url("/log"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list: Value = res.json().await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    srv.service.stop().await;
}

#[tokio::test]
async fn failed_action_is_reported_on_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let cookie = srv.login("fake token").await;

    let id = submit(&srv, &cookie, "repository=alpha&fail=on").await;
    let detail = wait_for_status(&srv, &cookie, &id, "failed").await;

    assert_eq!(detail["error"], "asked to fail");

    // The service keeps working after a failed job.
    let next = submit(&srv, &cookie, "repository=beta").await;
    wait_for_status(&srv, &cookie, &next, "succeeded").await;
    srv.service.stop().await;
}

#[tokio::test]
async fn jobs_are_visible_only_to_their_owner() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let owner = srv.login("owner token").await;
    let other = srv.login("other token").await;

    let id = submit(&srv, &owner, "repository=alpha").await;

    let res = client()
        .get(srv.url(&format!("/log/{id}")))
        .header(COOKIE, &other)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client()
        .get(srv.url("/log"))
        .header(COOKIE, &other)
        .send()
        .await
        .unwrap();
    let list: Value = res.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());

    // A second session for the same identity owns the same jobs.
    let again = srv.login("owner token").await;
    let res = client()
        .get(srv.url(&format!("/log/{id}")))
        .header(COOKIE, &again)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    srv.service.stop().await;
}

#[tokio::test]
async fn sessions_and_jobs_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let cookie = srv.login("fake token").await;
    let id = submit(&srv, &cookie, "repository=alpha").await;
    wait_for_status(&srv, &cookie, &id, "succeeded").await;
    srv.service.stop().await;
    assert!(!srv.service.is_running());

    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;
    let detail = wait_for_status(&srv, &cookie, &id, "succeeded").await;
    assert_eq!(detail["values"]["repository"], "alpha");
    srv.service.stop().await;
}

#[tokio::test]
async fn stop_closes_listener_then_waits_for_running_job() {
    let dir = tempfile::tempdir().unwrap();
    let action = Arc::new(GatedAction::default());
    let mut srv = TestServer::spawn(dir.path(), action.clone()).await;
    let cookie = srv.login("fake token").await;
    let id = submit(&srv, &cookie, "repository=alpha").await;
    action.started.notified().await;

    let health = srv.url("/health");
    let release = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The listener is gone while the job is still running.
        assert!(client().get(&health).send().await.is_err());
        action.release.notify_one();
    };
    tokio::join!(srv.service.stop(), release);

    // The database was closed only after the job recorded its outcome.
    let db = Database::open(dir.path().join("jobgate.db")).await.unwrap();
    let job = SqliteJobStore::new(db.clone())
        .get(id.parse::<JobId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    db.close().await;
}

#[tokio::test]
async fn start_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut srv = TestServer::spawn(dir.path(), RecordingAction::default()).await;

    let addr = srv.service.start().await.unwrap();

    assert_eq!(Some(addr), srv.service.local_addr());
    assert_eq!(srv.base_url, format!("http://{addr}"));
    srv.service.stop().await;
    srv.service.stop().await;
}

#[tokio::test]
async fn startup_requires_form_and_action() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockProvider::new().spawn().await.unwrap();

    let mut no_form = service(dir.path(), &provider.base_url()).with_action(RecordingAction::default());
    assert!(matches!(no_form.start().await, Err(StartupError::MissingForm)));
    assert!(!no_form.is_running());

    let mut empty_form = service(dir.path(), &provider.base_url())
        .with_form(FormSpec::default())
        .with_action(RecordingAction::default());
    assert!(matches!(empty_form.start().await, Err(StartupError::InvalidForm(_))));

    let mut no_action = service(dir.path(), &provider.base_url()).with_form(form());
    assert!(matches!(no_action.start().await, Err(StartupError::MissingAction)));
    assert!(no_action.sessions().is_none());
}

#[tokio::test]
async fn rejected_bot_login_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MockProvider::new().reject_credentials().spawn().await.unwrap();

    let mut service = service(dir.path(), &provider.base_url())
        .with_form(form())
        .with_action(RecordingAction::default());

    assert!(matches!(service.start().await, Err(StartupError::Identity(_))));
    assert!(service.local_addr().is_none());
}
