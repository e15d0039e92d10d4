//! Thin HTTP dispatch surface (§6). Handlers parse/shape only; all business
//! logic lives in the repositories, `ReviewRepository`, and `TaskBroker`.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use docflow_review::Decision;

use crate::app::AppState;
use crate::broker::ProcessTask;

/// Build the router for the worker binary.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/process", post(process))
        .route("/jobs/:id", get(get_job))
        .route("/queue", get(list_queue))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/claim", post(claim_next))
        .route("/queue/:id/submit", post(submit_review))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_text(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    document_id: String,
    content_type: String,
    #[serde(with = "base64_bytes")]
    file_bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    job_id: String,
    document_id: String,
}

async fn process(State(state): State<AppState>, Json(req): Json<ProcessRequest>) -> impl IntoResponse {
    let job_id = Uuid::new_v4().to_string();
    let task = ProcessTask {
        job_id: job_id.clone(),
        document_id: req.document_id.clone(),
        content_type: req.content_type,
        file_bytes: req.file_bytes,
    };
    state.broker.enqueue(task).await;
    (
        StatusCode::ACCEPTED,
        Json(ProcessResponse { job_id, document_id: req.document_id }),
    )
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.jobs.get(&id).await {
        Ok(job) => (StatusCode::OK, Json(json!(job))).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({"error": "not_found"}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    user: Option<String>,
}

async fn list_queue(State(state): State<AppState>, Query(q): Query<QueueQuery>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(50);
    let offset = q.offset.unwrap_or(0);
    match state.review.list_pending(limit, offset, q.user.as_deref()).await {
        Ok(items) => (StatusCode::OK, Json(json!(items))).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response(),
    }
}

async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.review.stats_for_dashboard().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "queue_depth": stats.queue_depth,
                "reviewed_today": stats.reviewed_today,
                "avg_review_time_seconds": stats.avg_review_time_seconds,
                "sla_compliance_pct": stats.sla_compliance_pct,
            })),
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    user: String,
}

async fn claim_next(State(state): State<AppState>, Json(req): Json<ClaimRequest>) -> impl IntoResponse {
    match state.review.claim_next(&req.user).await {
        Ok(Some(item)) => (StatusCode::OK, Json(json!(item))).into_response(),
        Ok(None) => (StatusCode::NO_CONTENT, Json(Value::Null)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    decision: String,
    user: String,
    #[serde(default)]
    corrections: HashMap<String, Value>,
    reject_reason: Option<String>,
}

async fn submit_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> impl IntoResponse {
    let decision = match req.decision.as_str() {
        "approve" => Decision::Approve,
        "correct" => Decision::Correct,
        "reject" => Decision::Reject,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("unknown_decision:{other}")})),
            )
                .into_response();
        }
    };

    let corrections_for_doc = req.corrections.clone();
    let action = match decision {
        Decision::Approve | Decision::Correct => "review_completed",
        Decision::Reject => "review_submitted",
    };

    match state
        .review
        .submit(&id, decision, &req.user, &req.corrections, req.reject_reason.as_deref())
        .await
    {
        Ok(item) => {
            if !corrections_for_doc.is_empty() {
                if let Err(err) = state.documents.merge_locked_fields(&item.document_id, &corrections_for_doc).await {
                    error!(error = %err, document_id = %item.document_id, "failed to merge review corrections into locked fields");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": err.to_string()})),
                    )
                        .into_response();
                }
            }
            if let Err(err) = state
                .audit
                .append(
                    &item.document_id,
                    Some(&item.job_id),
                    &req.user,
                    action,
                    &json!({"review_id": item.id, "decision": req.decision}),
                )
                .await
            {
                error!(error = %err, review_id = %item.id, "failed to append review audit entry");
            }
            (StatusCode::OK, Json(json!(item))).into_response()
        }
        Err(err) => (StatusCode::BAD_REQUEST, Json(json!({"error": err.to_string()}))).into_response(),
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}
