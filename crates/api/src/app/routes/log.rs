use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Path,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use jobgate_core::JobId;
use jobgate_infra::jobs::{Job, JobStatus, ValueMap};

use crate::app::AppServices;
use crate::app::errors::ApiError;
use crate::context::SessionContext;

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub values: ValueMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The caller's jobs, oldest first.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<SessionContext>,
) -> Result<Json<Vec<JobSummary>>, ApiError> {
    let jobs = services.jobs.list_for_owner(caller.user_id()).await?;
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

/// One job. Ids that do not parse, do not exist or belong to someone else
/// all answer 404.
pub async fn detail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Result<Json<JobDetail>, ApiError> {
    let id: JobId = id.parse().map_err(|_| ApiError::NotFound)?;

    let job = services
        .jobs
        .get(id)
        .await?
        .filter(|job| job.is_owned_by(caller.user_id()))
        .ok_or(ApiError::NotFound)?;

    Ok(Json(JobDetail {
        summary: JobSummary::from(&job),
        values: job.value_map,
        error: job.error,
    }))
}
