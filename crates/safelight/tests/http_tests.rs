//! HTTP routes of the build server, driven through `tower::ServiceExt::oneshot`.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use safelight::ServerConfig;
use safelight::server::{AppState, BUILD_ID_HEADER, router};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

const DEMO_BUILD: &str =
    "/build?functionName=demo&pathToGen=generators/demo_generator.cpp&target=x86-64-nacl-sse41";

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

struct Server {
    _dir: TempDir,
    state: AppState,
    app: Router,
}

impl Server {
    fn with_generator(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("buildSafelightGen.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ServerConfig {
            temp_dir: dir.path().to_path_buf(),
            generator: script,
            prebuilt_nexe_dir: PathBuf::from("/prebuilt"),
            timeout_secs: 20,
            ..ServerConfig::default()
        };
        let state = AppState::from_config(&config).unwrap();
        let app = router(state.clone());
        Self {
            _dir: dir,
            state,
            app,
        }
    }

    fn working() -> Self {
        Self::with_generator(
            r#"mkdir -p out
for ext in nexe s stmt html; do
  printf '%s.%s\n' "$1" "$ext" > "out/$1.$ext"
  echo "wrote out/$1.$ext"
done
"#,
        )
    }

    async fn send(&self, method: Method, uri: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        Response {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri).await
    }

    async fn post(&self, uri: &str) -> Response {
        self.send(Method::POST, uri).await
    }
}

#[tokio::test]
async fn build_returns_signature_and_serves_artifacts() {
    let server = Server::working();

    let built = server.post(DEMO_BUILD).await;
    assert_eq!(built.status, StatusCode::OK);
    let signature = built.text();
    assert_eq!(signature.len(), 64);
    assert!(built.headers.contains_key(BUILD_ID_HEADER));

    let nexe = server
        .get(&format!("/safelight_{signature}_x86-64-nacl-sse41.nexe"))
        .await;
    assert_eq!(nexe.status, StatusCode::OK);
    assert_eq!(nexe.text(), "safelight_demo.nexe\n");
    assert_eq!(
        nexe.headers[header::CONTENT_TYPE],
        "application/x-nacl"
    );

    let stmt = server
        .get(&format!("/safelight_{signature}_x86-64-nacl-sse41.stmt"))
        .await;
    assert_eq!(stmt.text(), "safelight_demo.stmt\n");

    let nmf = server
        .get(&format!("/safelight_{signature}_x86-64-nacl-sse41.nmf"))
        .await;
    assert!(nmf.text().contains(&format!(
        "\"url\":\"/safelight_{signature}_x86-64-nacl-sse41.nexe\""
    )));
}

#[tokio::test]
async fn repeated_build_reuses_cache() {
    let server = Server::working();

    let first = server.post(DEMO_BUILD).await;
    let second = server.post(DEMO_BUILD).await;

    assert_eq!(first.text(), second.text());
    assert_eq!(server.state.coordinator().generator_runs(), 1);
    assert_ne!(
        first.headers[BUILD_ID_HEADER],
        second.headers[BUILD_ID_HEADER]
    );
}

#[tokio::test]
async fn build_logs_are_kept_per_request() {
    let server = Server::working();

    let built = server.post(DEMO_BUILD).await;
    let build_id = built.headers[BUILD_ID_HEADER].to_str().unwrap().to_string();

    let by_id = server.get(&format!("/buildlog/{build_id}")).await;
    assert_eq!(by_id.status, StatusCode::OK);
    assert!(by_id.text().contains("wrote out/safelight_demo.nexe"));

    let reused = server.post(DEMO_BUILD).await;
    assert_eq!(reused.status, StatusCode::OK);
    let latest = server.get("/buildlog").await;
    assert!(latest.text().starts_with("Reusing cached build"));

    // The first build's log is untouched by the second request
    let again = server.get(&format!("/buildlog/{build_id}")).await;
    assert_eq!(again.text(), by_id.text());
}

#[tokio::test]
async fn unknown_build_log_is_not_found() {
    let server = Server::working();
    let missing = server
        .get("/buildlog/00000000-0000-4000-8000-000000000000")
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(
        server.get("/buildlog/not-a-uuid").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn latest_log_is_empty_before_any_build() {
    let server = Server::working();
    let latest = server.get("/buildlog").await;
    assert_eq!(latest.status, StatusCode::OK);
    assert!(latest.body.is_empty());
}

#[tokio::test]
async fn non_nacl_target_is_unsupported() {
    let server = Server::working();
    let response = server
        .post("/build?functionName=demo&pathToGen=gen.cpp&target=x86-64-linux")
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Unsupported target"));
    assert_eq!(server.state.coordinator().generator_runs(), 0);
}

#[tokio::test]
async fn malformed_target_is_rejected_without_building() {
    let server = Server::working();
    let response = server
        .post("/build?functionName=demo&pathToGen=gen.cpp&target=foo-bar")
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Malformed target: foo-bar"));
    assert_eq!(server.state.coordinator().generator_runs(), 0);
}

#[tokio::test]
async fn failed_build_reports_generator_output() {
    let server = Server::with_generator("echo 'halide: undefined symbol'\nexit 1\n");

    let response = server.post(DEMO_BUILD).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text();
    assert!(body.contains("exited with status 1"));
    assert!(body.contains("halide: undefined symbol"));

    let log = server.get("/buildlog").await.text();
    assert!(log.contains("halide: undefined symbol"));
    assert!(log.contains("exited with status 1"));
}

#[tokio::test]
async fn unrecognized_generator_output_reports_the_command() {
    let server = Server::with_generator("echo done\n");

    let response = server.post(DEMO_BUILD).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text();
    assert!(body.contains("produced no recognizable artifact"));
    assert!(body.contains("Command:"));
    assert!(body.contains("buildSafelightGen.sh safelight_demo generators/demo_generator.cpp"));
}

#[tokio::test]
async fn uncached_artifact_is_empty_success() {
    let server = Server::working();
    let signature = "ab".repeat(32);
    let response = server
        .get(&format!("/safelight_{signature}_arm-32-nacl.nexe"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(server.state.coordinator().generator_runs(), 0);
}

#[tokio::test]
async fn unrelated_paths_are_not_found() {
    let server = Server::working();
    assert_eq!(server.get("/index.html").await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        server.get("/safelight_abc_mips-32-nacl.nexe").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn prebuilt_manifests_list_every_cpu() {
    let server = Server::working();

    let sniffer = server.get("/nacl_sniffer.nmf").await;
    assert_eq!(sniffer.status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&sniffer.body).unwrap();
    assert_eq!(
        json["program"]["x86-64"]["url"],
        "/prebuilt/x86_64/nacl_sniffer.nexe"
    );
    assert_eq!(json["program"]["arm"]["url"], "/prebuilt/arm/nacl_sniffer.nexe");
    assert_eq!(json["program"].as_object().unwrap().len(), 3);

    let visualizers = server.get("/visualizers.nmf").await;
    let json: serde_json::Value = serde_json::from_slice(&visualizers.body).unwrap();
    assert_eq!(
        json["program"]["x86-32"]["url"],
        "/prebuilt/x86_32/visualizers_shell.nexe"
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let server = Server::working();
    let response = server.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "ok");
}
