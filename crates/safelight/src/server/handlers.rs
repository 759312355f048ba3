//! Route handlers

use super::{AppState, BUILD_ID_HEADER};
use crate::{Error, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use safelight_artifacts::{ArtifactKind, Manifest, Signature, Target};
use safelight_builder::{BuildLog, BuildRequest};
use safelight_process::LogSink;
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

/// Query of `POST /build`; missing fields are empty and fail validation
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct BuildParams {
    function_name: String,
    path_to_gen: String,
    target: String,
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

/// Reject targets no builder exists for
///
/// # Errors
///
/// Returns a malformed target error, or [`Error::UnsupportedTarget`] for a
/// well-formed target that is not a NaCl target
pub fn ensure_buildable_target(target: &str) -> Result<Target> {
    let parsed = Target::parse(target).map_err(safelight_builder::Error::from)?;
    if !parsed.is_nacl() {
        return Err(Error::UnsupportedTarget {
            target: target.to_string(),
        });
    }
    Ok(parsed)
}

async fn run_build(state: &AppState, params: BuildParams, log: &BuildLog) -> Result<Signature> {
    let request = BuildRequest::new(params.function_name, params.path_to_gen, params.target);
    ensure_buildable_target(&request.target)?;
    let bundle = state
        .coordinator
        .build_or_reuse(&request, Some(log))
        .await?;
    Ok(bundle.signature().clone())
}

pub(super) async fn build(
    State(state): State<AppState>,
    Query(params): Query<BuildParams>,
) -> Response {
    let log = state.logs.start();
    let build_id = log.id();
    tracing::info!(
        %build_id,
        function = %params.function_name,
        target = %params.target,
        "Build requested"
    );

    let span = tracing::info_span!("build_request", %build_id);
    let mut response = match run_build(&state, params, &log).instrument(span).await {
        Ok(signature) => {
            tracing::info!(%build_id, %signature, "Build ready");
            text(StatusCode::OK, signature.to_string())
        }
        Err(err) => {
            let report = match &err {
                Error::Build(e) => e.report(),
                other => other.to_string(),
            };
            tracing::warn!(%build_id, error = %err, "Build request failed");
            log.append(&report);
            text(StatusCode::INTERNAL_SERVER_ERROR, report)
        }
    };

    if let Ok(value) = HeaderValue::from_str(&build_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(BUILD_ID_HEADER), value);
    }
    response
}

pub(super) async fn artifact(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let Some(caps) = state.artifact_path.captures(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let group = |i| caps.get(i).map_or("", |m| m.as_str());

    let found = match (
        Signature::parse(group(1)),
        Target::parse(group(2)),
        ArtifactKind::from_extension(group(3)),
    ) {
        (Ok(signature), Ok(target), Some(kind)) => state
            .coordinator
            .fetch(&signature, &target, kind)
            .map(|bytes| (kind, bytes)),
        _ => None,
    };

    match found {
        Some((kind, bytes)) => {
            ([(header::CONTENT_TYPE, kind.content_type())], bytes).into_response()
        }
        // Absent artifacts are an empty success, never a build trigger
        None => {
            tracing::debug!(%file, "Artifact not cached");
            StatusCode::OK.into_response()
        }
    }
}

pub(super) async fn latest_log(State(state): State<AppState>) -> Response {
    let text_body = state
        .logs
        .latest()
        .map(|log| log.snapshot())
        .unwrap_or_default();
    text(StatusCode::OK, text_body)
}

pub(super) async fn log_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match Uuid::parse_str(&id).ok().and_then(|id| state.logs.get(&id)) {
        Some(log) => text(StatusCode::OK, log.snapshot()),
        None => text(StatusCode::NOT_FOUND, format!("Unknown build log: {id}")),
    }
}

fn prebuilt_manifest(state: &AppState, binary_name: &str) -> Response {
    match Manifest::prebuilt(&state.prebuilt_nexe_dir, binary_name).to_bytes() {
        Ok(body) => (
            [(header::CONTENT_TYPE, ArtifactKind::Manifest.content_type())],
            body,
        )
            .into_response(),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub(super) async fn nacl_sniffer_manifest(State(state): State<AppState>) -> Response {
    prebuilt_manifest(&state, "nacl_sniffer")
}

pub(super) async fn visualizers_manifest(State(state): State<AppState>) -> Response {
    prebuilt_manifest(&state, "visualizers_shell")
}

pub(super) async fn health() -> &'static str {
    "ok"
}
