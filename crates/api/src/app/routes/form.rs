use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Form, rejection::FormRejection},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;

use jobgate_core::JobId;
use jobgate_infra::jobs::{Job, JobStatus, ValueMap};

use crate::app::AppServices;
use crate::app::errors::ApiError;
use crate::context::SessionContext;

pub async fn show(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.form.as_ref().clone())
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Queue the submitted values as a job owned by the caller.
///
/// A body without a form content type is an empty submission.
pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<SessionContext>,
    form: Result<Form<ValueMap>, FormRejection>,
) -> Result<Json<Accepted>, ApiError> {
    let value_map = match form {
        Ok(Form(values)) => values,
        Err(FormRejection::InvalidFormContentType(_)) => ValueMap::new(),
        Err(e) => return Err(ApiError::Validation(e.body_text())),
    };

    let job = Job::new(caller.user_id(), value_map);
    services.jobs.insert(&job).await?;
    info!(job_id = %job.id, user_id = %job.user_id, fields = job.value_map.len(), "job queued");

    Ok(Json(Accepted {
        job_id: job.id,
        status: job.status,
    }))
}
