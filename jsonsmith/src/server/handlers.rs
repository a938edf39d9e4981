use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::envelope::{ApiResponse, Reply};
use super::tasks::{TaskSpec, EASY, FAQ_ANSWER, INTENT, KEYWORD, SUMMARIZATION};
use super::AppState;
use crate::audit::AuditEntry;
use crate::inference::{InferenceOutcome, InferenceRequest, ParsedPayload, ValidationError};

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "jsonsmith gateway" }))
}

pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::health())
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary = state.orchestrator.metrics().summary();
    let gate = state.orchestrator.gate();
    Json(json!({
        "backend": state.orchestrator.backend_name(),
        "gate": {
            "capacity": gate.capacity(),
            "available": gate.available(),
        },
        "retries": summary,
        "rates": {
            "retry_success_rate": summary.retry_success_rate(),
            "overall_success_rate": summary.overall_success_rate(),
            "first_attempt_success_rate": summary.first_attempt_success_rate(),
        },
    }))
}

pub async fn faq_answer(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    run_task(&state, &FAQ_ANSWER, body).await
}

pub async fn intent(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    run_task(&state, &INTENT, body).await
}

pub async fn easy(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    run_task(&state, &EASY, body).await
}

pub async fn keyword(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    run_task(&state, &KEYWORD, body).await
}

pub async fn summarization(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    run_task(&state, &SUMMARIZATION, body).await
}

/// Validate the request, run inference and audit the result.
async fn run_task(state: &Arc<AppState>, task: &TaskSpec, body: Bytes) -> Reply {
    let started = Instant::now();
    let reply = execute(state, task, &body, started)
        .await
        .unwrap_or_else(|rejected| rejected);

    let Reply(code, response) = &reply;
    info!(
        endpoint = task.route,
        status = %response.status,
        http_status = code.as_u16(),
        elapsed = response.elapsed_time.unwrap_or_default(),
        "task request finished"
    );
    state.audit.record(AuditEntry::new(
        task.route,
        response.status.clone(),
        response.msg.clone(),
        response.data.clone(),
        response.elapsed_time,
    ));
    reply
}

async fn execute(
    state: &AppState,
    task: &TaskSpec,
    body: &[u8],
    started: Instant,
) -> Result<Reply, Reply> {
    let bad_request =
        |msg: String| Reply(StatusCode::BAD_REQUEST, ApiResponse::error(msg, elapsed(started)));
    let body = parse_request(task, body).map_err(bad_request)?;
    let substitutions = task.substitutions(&body).map_err(bad_request)?;

    let template = state.prompts.get_template(task.template).map_err(|e| {
        error!(endpoint = task.route, error = %e, "prompt template unavailable");
        Reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::error(e.to_string(), elapsed(started)),
        )
    })?;

    let request = InferenceRequest::new(
        template.render(&substitutions),
        task.output_keys.iter().copied(),
        state.sampling.clone(),
    )
    .with_max_attempts(state.max_attempts);

    let response = match state.orchestrator.run(&request).await {
        InferenceOutcome::Success { data } => {
            ApiResponse::success(task.shape(data), elapsed(started))
        }
        InferenceOutcome::Failure { kind, message, .. } => {
            warn!(endpoint = task.route, kind = %kind, "inference failed");
            ApiResponse::error(message, elapsed(started))
        }
    };
    Ok(Reply(StatusCode::OK, response))
}

/// Parse the body and require its key set to equal the task's fields.
fn parse_request(task: &TaskSpec, body: &[u8]) -> Result<ParsedPayload, String> {
    let validator = task.request_validator();
    let text = std::str::from_utf8(body).map_err(|e| format!("Error request body: {}", e))?;
    let payload = validator
        .parse(text)
        .map_err(|e| format!("Error request body: {}", e))?;

    match validator.check_keys(&payload) {
        Ok(()) => Ok(payload),
        Err(ValidationError::KeyMismatch { actual, expected }) => Err(format!(
            "Error request data keys({:?} | {:?})",
            actual.into_iter().collect::<Vec<_>>(),
            expected.into_iter().collect::<Vec<_>>()
        )),
        Err(e) => Err(format!("Error request body: {}", e)),
    }
}

fn elapsed(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}
