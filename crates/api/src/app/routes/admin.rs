//! Operational endpoints over the background job queue.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use mingle_infra::jobs::{DeadLetterEntry, Job, JobId, JobStatus, JobStore, JobStoreError};

use crate::app::errors;
use crate::app::services::AppServices;

const DEFAULT_LIST_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/dead-letters", get(list_dead_letters))
        .route("/jobs/dead-letters/:id/retry", post(retry_dead_letter))
}

#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Status filters are matched by discriminant; payload-carrying variants use
/// placeholder fields.
fn parse_status_filter(status: &str) -> Option<JobStatus> {
    match status {
        "pending" => Some(JobStatus::Pending),
        "running" => Some(JobStatus::Running),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed {
            error: String::new(),
            attempt: 0,
        }),
        "dead_lettered" => Some(JobStatus::DeadLettered {
            error: String::new(),
            attempts: 0,
        }),
        _ => None,
    }
}

fn job_to_json(job: &Job) -> Value {
    json!({
        "id": job.id.to_string(),
        "kind": job.kind,
        "status": job.status,
        "attempt": job.attempt,
        "payload": job.payload,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
        "scheduled_at": job.scheduled_at,
    })
}

fn dead_letter_to_json(entry: &DeadLetterEntry) -> Value {
    json!({
        "job": job_to_json(&entry.job),
        "reason": entry.reason,
        "dead_lettered_at": entry.dead_lettered_at,
    })
}

fn job_store_error_to_response(err: JobStoreError) -> Response {
    match err {
        JobStoreError::NotFound(id) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job {id} not found"),
        ),
        JobStoreError::AlreadyExists(id) => errors::json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("job {id} already exists"),
        ),
        JobStoreError::Storage(message) => {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage", message)
        }
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<JobListQuery>,
) -> Response {
    let status = match &query.status {
        Some(raw) => match parse_status_filter(raw) {
            Some(status) => Some(status),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    format!("unknown job status: {raw}"),
                );
            }
        },
        None => None,
    };

    match services
        .jobs
        .list_by_status(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
    {
        Ok(jobs) => {
            let items: Vec<_> = jobs.iter().map(job_to_json).collect();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => job_store_error_to_response(e),
    }
}

pub async fn job_stats(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.jobs.stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => job_store_error_to_response(e),
    }
}

pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<JobListQuery>,
) -> Response {
    match services
        .jobs
        .list_dead_letters(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
    {
        Ok(entries) => {
            let items: Vec<_> = entries.iter().map(dead_letter_to_json).collect();
            (StatusCode::OK, Json(json!({ "items": items }))).into_response()
        }
        Err(e) => job_store_error_to_response(e),
    }
}

pub async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<Uuid>,
) -> Response {
    match services.jobs.retry_dead_letter(JobId::from_uuid(id)) {
        Ok(job) => (StatusCode::OK, Json(job_to_json(&job))).into_response(),
        Err(e) => job_store_error_to_response(e),
    }
}
