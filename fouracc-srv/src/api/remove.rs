//! Job removal
//!
//! `POST /rm` accepts the job `id` either url-encoded or as a multipart field.

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    routing::post,
    Extension, Form, Router,
};
use serde::Deserialize;

use super::identity::ClientIdentity;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct RemoveForm {
    id: String,
}

async fn job_id(request: Request) -> ApiResult<String> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        while let Some(field) = multipart.next_field().await? {
            if field.name() == Some("id") {
                return Ok(field.text().await?);
            }
        }
        return Err(ApiError::BadRequest("missing job id".to_string()));
    }

    let Form(form) = Form::<RemoveForm>::from_request(request, &())
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?;
    Ok(form.id)
}

/// POST /rm
pub async fn remove_job(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    request: Request,
) -> ApiResult<StatusCode> {
    let id = job_id(request).await?;
    state.store.remove_job(&client.token, id.trim()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn remove_routes() -> Router<AppState> {
    Router::new().route("/rm", post(remove_job))
}
