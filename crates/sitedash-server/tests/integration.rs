use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use sitedash_core::build::{BuildStatus, NewBuild};
use sitedash_core::config::DashboardConfig;
use sitedash_core::runner::{CommandRunner, Invocation};
use sitedash_server::state::AppState;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Blocks the fake build step until released.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }

    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

/// Stands in for git and npm: clone creates the checkout, `npm run build`
/// writes `dist/index.html`.
#[derive(Default)]
struct FakeToolchain {
    fail_on: Option<&'static str>,
    gate: Option<Arc<Gate>>,
}

impl CommandRunner for FakeToolchain {
    fn run(&self, inv: &Invocation) -> sitedash_core::Result<i32> {
        let line = inv.display();
        if self.fail_on.is_some_and(|f| line.contains(f)) {
            return Ok(1);
        }
        if inv.args.first().map(String::as_str) == Some("clone") {
            std::fs::create_dir_all(inv.cwd.join("repo"))?;
        }
        if line.contains("run build") {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            let dist = inv.cwd.join("dist");
            std::fs::create_dir_all(&dist)?;
            std::fs::write(dist.join("index.html"), "<h1>school</h1>")?;
        }
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ALICE: &str = "alice-session";
const BOB: &str = "bob-session";

struct Harness {
    dir: TempDir,
    state: AppState,
    // Keeps the CMS mock alive for the test's duration.
    _cms: mockito::ServerGuard,
}

impl Harness {
    async fn new(runner: FakeToolchain) -> Self {
        Self::with_config(runner, |_| {}).await
    }

    async fn with_config(runner: FakeToolchain, adjust: impl FnOnce(&mut DashboardConfig)) -> Self {
        let mut cms = mockito::Server::new_async().await;
        for (session, name) in [(ALICE, "Alice Smith"), (BOB, "Bob Jones")] {
            cms.mock("GET", "/admin/")
                .match_header("cookie", format!("sessionid={session}").as_str())
                .with_status(200)
                .with_body(format!(
                    r#"<aside><h2 class="w-label-1 w-mt-0 w-mb-1">{name}</h2></aside>"#
                ))
                .create_async()
                .await;
        }

        let dir = TempDir::new().unwrap();
        let mut config = DashboardConfig {
            work_dir: dir.path().join("work"),
            repo_url: "https://git.example.org/school-site.git".into(),
            preview_path: Some(dir.path().join("www/preview")),
            production_path: Some(dir.path().join("www/production")),
            deploy_password: "let-me-ship".into(),
            cms_url: format!("{}/admin/", cms.url()),
            ..DashboardConfig::default()
        };
        adjust(&mut config);
        let state = AppState::open(config, Arc::new(runner)).unwrap();
        Self {
            dir,
            state,
            _cms: cms,
        }
    }

    fn app(&self) -> axum::Router {
        sitedash_server::build_router(self.state.clone())
    }

    /// A finished build with an artifact on disk.
    fn seed(&self, user: &str, status: BuildStatus) -> u64 {
        let id = self
            .state
            .db
            .create(&NewBuild::new("seeded", user), None)
            .unwrap()
            .id;
        let artifact = self.state.config.artifact_dir(id);
        std::fs::create_dir_all(&artifact).unwrap();
        std::fs::write(artifact.join("index.html"), format!("build {id}")).unwrap();
        self.state.db.set_status(id, status).unwrap();
        id
    }

    fn status(&self, id: u64) -> BuildStatus {
        self.state.db.get(id).unwrap().unwrap().status
    }

    fn served(&self, slot: &str) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join("www").join(slot).join("index.html")).ok()
    }

    async fn wait_finished(&self, id: u64) -> BuildStatus {
        for _ in 0..400 {
            let status = self.status(id);
            if status != BuildStatus::Working && !self.state.guard.is_running() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("build {id} did not finish");
    }
}

fn request(
    method: &str,
    uri: &str,
    session: Option<&str>,
    body: Option<serde_json::Value>,
) -> axum::http::Request<axum::body::Body> {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header("cookie", format!("sessionid={session}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    }
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(
    app: axum::Router,
    uri: &str,
    session: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request("GET", uri, session, None)).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    session: Option<&str>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(request("POST", uri, session, Some(body)))
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn me_requires_cms_session() {
    let h = Harness::new(FakeToolchain::default()).await;

    let (status, _) = get(h.app(), "/api/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(h.app(), "/api/me", Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = get(h.app(), "/api/me", Some(ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"], "Alice Smith");
    assert_eq!(json["building"], false);
}

#[tokio::test]
async fn index_redirects_by_identity() {
    let h = Harness::new(FakeToolchain::default()).await;

    let resp = h.app().oneshot(request("GET", "/", None, None)).await.unwrap();
    assert!(resp.status().is_redirection());
    let location = resp.headers()["location"].to_str().unwrap();
    assert!(location.ends_with("/admin/login/?next=/"), "{location}");

    let resp = h
        .app()
        .oneshot(request("GET", "/", Some(ALICE), None))
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(resp.headers()["location"], "/api/me");
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_build_is_noop() {
    let h = Harness::new(FakeToolchain::default()).await;

    let (status, json) =
        post_json(h.app(), "/api/builds", None, serde_json::json!({"message": "x"})).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.is_null());
    assert!(h.state.db.latest(10, None).unwrap().is_empty());
    assert!(h.state.db.audit_entries(10).unwrap().is_empty());
}

#[tokio::test]
async fn build_runs_in_background_and_finishes_inactive() {
    let h = Harness::new(FakeToolchain::default()).await;

    let (status, json) = post_json(
        h.app(),
        "/api/builds",
        Some(ALICE),
        serde_json::json!({"message": "rebuild"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"], "Alice Smith");
    assert_eq!(json["message"], "rebuild");
    let id = json["id"].as_u64().unwrap();

    assert_eq!(h.wait_finished(id).await, BuildStatus::Inactive);
    assert!(h.state.config.artifact_dir(id).join("index.html").exists());

    let (status, json) = get(h.app(), &format!("/api/builds/{id}"), Some(ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "inactive");

    let audit = h.state.db.audit_entries(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].values, vec![id.to_string()]);
}

#[tokio::test]
async fn second_build_while_running_is_noop() {
    let gate = Arc::new(Gate::default());
    let h = Harness::new(FakeToolchain {
        gate: Some(gate.clone()),
        ..FakeToolchain::default()
    })
    .await;

    let (_, first) = post_json(
        h.app(),
        "/api/builds",
        Some(ALICE),
        serde_json::json!({"message": "first"}),
    )
    .await;
    let (status, second) = post_json(
        h.app(),
        "/api/builds",
        Some(BOB),
        serde_json::json!({"message": "second"}),
    )
    .await;

    assert_eq!(first["status"], "working");
    assert_eq!(status, StatusCode::OK);
    assert!(second.is_null());
    let (_, me) = get(h.app(), "/api/me", Some(BOB)).await;
    assert_eq!(me["building"], true);

    gate.release();
    let id = first["id"].as_u64().unwrap();
    assert_eq!(h.wait_finished(id).await, BuildStatus::Inactive);
    assert_eq!(h.state.db.latest(10, None).unwrap().len(), 1);
    assert_eq!(h.state.db.audit_entries(10).unwrap().len(), 1);

    // The guard is free again once the job is done.
    let (_, third) = post_json(
        h.app(),
        "/api/builds",
        Some(BOB),
        serde_json::json!({"message": "third"}),
    )
    .await;
    assert!(third["id"].is_u64());
    h.wait_finished(third["id"].as_u64().unwrap()).await;
}

#[tokio::test]
async fn failing_build_ends_in_error() {
    let h = Harness::new(FakeToolchain {
        fail_on: Some("npm install"),
        ..FakeToolchain::default()
    })
    .await;

    let (_, json) = post_json(
        h.app(),
        "/api/builds",
        Some(ALICE),
        serde_json::json!({"message": "rebuild"}),
    )
    .await;
    let id = json["id"].as_u64().unwrap();

    assert_eq!(h.wait_finished(id).await, BuildStatus::Error);
    assert!(!h.state.config.artifact_dir(id).exists());
}

#[tokio::test]
async fn build_list_scopes() {
    let h = Harness::new(FakeToolchain::default()).await;
    h.seed("Alice Smith", BuildStatus::Inactive);
    h.seed("Bob Jones", BuildStatus::Inactive);
    h.seed("Alice Smith", BuildStatus::Error);

    let (_, mine) = get(h.app(), "/api/builds", Some(ALICE)).await;
    let ids: Vec<u64> = mine
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 1]);

    let (_, all) = get(h.app(), "/api/builds?scope=all", Some(ALICE)).await;
    assert_eq!(all.as_array().unwrap().len(), 3);
    assert_eq!(all[0]["id"], 3);

    let (status, anon) = get(h.app(), "/api/builds?scope=all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anon, serde_json::json!([]));
}

#[tokio::test]
async fn unknown_build_is_404() {
    let h = Harness::new(FakeToolchain::default()).await;
    let (status, json) = get(h.app(), "/api/builds/77", Some(ALICE)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("77"));
}

#[tokio::test]
async fn single_build_requires_identity() {
    let h = Harness::new(FakeToolchain::default()).await;
    let id = h.seed("Alice Smith", BuildStatus::Inactive);

    let (status, json) = get(h.app(), &format!("/api/builds/{id}"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json.get("user").is_none());

    let (status, json) = get(h.app(), &format!("/api/builds/{id}"), Some(BOB)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"], "Alice Smith");
}

// ---------------------------------------------------------------------------
// Deploys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preview_deploys_move_the_slot() {
    let h = Harness::new(FakeToolchain::default()).await;
    let x = h.seed("Alice Smith", BuildStatus::Inactive);
    let y = h.seed("Alice Smith", BuildStatus::Inactive);

    let (status, json) = post_json(
        h.app(),
        &format!("/api/builds/{x}/deploy/preview"),
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "activePreview");
    assert_eq!(h.served("preview"), Some(format!("build {x}")));

    let (status, _) = post_json(
        h.app(),
        &format!("/api/builds/{y}/deploy/preview"),
        Some(BOB),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status(x), BuildStatus::Inactive);
    assert_eq!(h.status(y), BuildStatus::ActivePreview);
    assert_eq!(h.served("preview"), Some(format!("build {y}")));

    let audit = h.state.db.audit_entries(1).unwrap();
    assert_eq!(audit[0].user, "Bob Jones");
    assert_eq!(audit[0].values, vec![y.to_string(), "preview".to_string()]);
}

#[tokio::test]
async fn preview_deploy_splits_active_both() {
    let h = Harness::new(FakeToolchain::default()).await;
    let five = h.seed("Alice Smith", BuildStatus::ActiveBoth);
    let seven = h.seed("Alice Smith", BuildStatus::Inactive);

    let (status, _) = post_json(
        h.app(),
        &format!("/api/builds/{seven}/deploy/preview"),
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status(five), BuildStatus::ActiveProduction);
    assert_eq!(h.status(seven), BuildStatus::ActivePreview);
}

#[tokio::test]
async fn preview_deploy_error_statuses() {
    let h = Harness::new(FakeToolchain::default()).await;
    let failed = h.seed("Alice Smith", BuildStatus::Error);
    let pruned = h.seed("Alice Smith", BuildStatus::Inactive);
    std::fs::remove_dir_all(h.state.config.artifact_dir(pruned)).unwrap();

    let (status, _) = post_json(
        h.app(),
        "/api/builds/1/deploy/preview",
        None,
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_json(
        h.app(),
        "/api/builds/99/deploy/preview",
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        h.app(),
        &format!("/api/builds/{failed}/deploy/preview"),
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.status(failed), BuildStatus::Error);

    let (status, json) = post_json(
        h.app(),
        &format!("/api/builds/{pruned}/deploy/preview"),
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "deploy failed");
    assert_eq!(h.status(pruned), BuildStatus::Inactive);
    assert_eq!(h.served("preview"), None);
}

#[tokio::test]
async fn production_deploy_is_password_gated() {
    let h = Harness::new(FakeToolchain::default()).await;
    let id = h.seed("Alice Smith", BuildStatus::ActivePreview);
    let uri = format!("/api/builds/{id}/deploy/production");

    let (_, json) = post_json(
        h.app(),
        &uri,
        None,
        serde_json::json!({"password": "let-me-ship"}),
    )
    .await;
    assert_eq!(json["deployed"], false);

    let (_, json) = post_json(
        h.app(),
        &uri,
        Some(ALICE),
        serde_json::json!({"password": "guess"}),
    )
    .await;
    assert_eq!(json["deployed"], false);
    assert_eq!(h.status(id), BuildStatus::ActivePreview);
    assert_eq!(h.served("production"), None);

    let (_, json) = post_json(
        h.app(),
        "/api/builds/99/deploy/production",
        Some(ALICE),
        serde_json::json!({"password": "let-me-ship"}),
    )
    .await;
    assert_eq!(json["deployed"], false);

    let (status, json) = post_json(
        h.app(),
        &uri,
        Some(ALICE),
        serde_json::json!({"password": "let-me-ship"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deployed"], true);
    assert_eq!(h.status(id), BuildStatus::ActiveBoth);
    assert_eq!(h.served("production"), Some(format!("build {id}")));
}

#[tokio::test]
async fn wrong_password_is_declined_before_target_setup() {
    let h = Harness::with_config(FakeToolchain::default(), |c| c.production_path = None).await;
    let id = h.seed("Alice Smith", BuildStatus::Inactive);
    let uri = format!("/api/builds/{id}/deploy/production");

    let (status, json) = post_json(
        h.app(),
        &uri,
        Some(ALICE),
        serde_json::json!({"password": "guess"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deployed"], false);

    let (status, _) = post_json(
        h.app(),
        &uri,
        Some(ALICE),
        serde_json::json!({"password": "let-me-ship"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.status(id), BuildStatus::Inactive);
}

#[tokio::test]
async fn production_deploy_keeps_preview_untouched() {
    let h = Harness::new(FakeToolchain::default()).await;
    let five = h.seed("Alice Smith", BuildStatus::ActiveProduction);
    let seven = h.seed("Alice Smith", BuildStatus::ActivePreview);
    let nine = h.seed("Alice Smith", BuildStatus::Inactive);

    let (_, json) = post_json(
        h.app(),
        &format!("/api/builds/{nine}/deploy/production"),
        Some(ALICE),
        serde_json::json!({"password": "let-me-ship"}),
    )
    .await;

    assert_eq!(json["deployed"], true);
    assert_eq!(h.status(five), BuildStatus::Inactive);
    assert_eq!(h.status(seven), BuildStatus::ActivePreview);
    assert_eq!(h.status(nine), BuildStatus::ActiveProduction);
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_lists_newest_first_for_signed_in_users() {
    let h = Harness::new(FakeToolchain::default()).await;
    let id = h.seed("Alice Smith", BuildStatus::Inactive);
    post_json(
        h.app(),
        &format!("/api/builds/{id}/deploy/preview"),
        Some(ALICE),
        serde_json::json!({}),
    )
    .await;

    let (status, _) = get(h.app(), "/api/audit", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = get(h.app(), "/api/audit?limit=5", Some(ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "publish");
    assert_eq!(entries[1]["kind"], "build");
}
