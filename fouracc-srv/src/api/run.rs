//! Upload and processing endpoint
//!
//! `POST /run` takes a multipart form:
//! - `id`: client job id
//! - `input-file`: the recording
//! - `chunksz`: positive chunk size
//! - `xmin`, `xmax`: optional sample range (`0` and `-1` by default)

use axum::{
    extract::{Multipart, State},
    routing::post,
    Extension, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fouracc_common::dispatch::{JobTarget, ProcessParams, XAxis};
use fouracc_common::persist::upload_name;
use fouracc_common::recording::Recording;
use serde::Serialize;
use tracing::info;

use super::identity::ClientIdentity;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Processing result: axis labels with their base64 PNG plots
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub names: Vec<String>,
    pub imgs: Vec<String>,
    pub error: String,
}

/// Fields of the upload form
#[derive(Debug, Default)]
struct RunForm {
    id: Option<String>,
    file_name: Option<String>,
    data: Option<Vec<u8>>,
    chunk_size: Option<String>,
    xmin: Option<String>,
    xmax: Option<String>,
}

impl RunForm {
    async fn read(multipart: &mut Multipart) -> ApiResult<Self> {
        let mut form = RunForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "input-file" => {
                    form.file_name = Some(field.file_name().unwrap_or_default().to_string());
                    form.data = Some(field.bytes().await?.to_vec());
                }
                "id" => form.id = Some(field.text().await?),
                "chunksz" => form.chunk_size = Some(field.text().await?),
                "xmin" => form.xmin = Some(field.text().await?),
                "xmax" => form.xmax = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }

    fn params(&self) -> ApiResult<ProcessParams> {
        let chunk_size = match self.chunk_size.as_deref().map(str::trim) {
            Some(text) => text
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid chunk size {:?}", text)))?,
            None => return Err(ApiError::BadRequest("missing chunk size".to_string())),
        };
        let beg = optional_field(self.xmin.as_deref(), "xmin", 0usize)?;
        let end = optional_field(self.xmax.as_deref(), "xmax", -1i64)?;
        if end < -1 {
            return Err(ApiError::BadRequest(format!("invalid xmax {}", end)));
        }
        Ok(ProcessParams {
            chunk_size,
            beg,
            end,
            x_axis: XAxis::Index,
        })
    }
}

fn optional_field<T: std::str::FromStr>(value: Option<&str>, name: &str, default: T) -> ApiResult<T> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(text) => text
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid {} {:?}", name, text))),
    }
}

/// POST /run
pub async fn run_job(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    mut multipart: Multipart,
) -> ApiResult<Json<RunResponse>> {
    let form = RunForm::read(&mut multipart).await?;

    let id = form
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing job id".to_string()))?
        .to_string();
    let params = form.params()?;
    let file_name = upload_name(form.file_name.as_deref().unwrap_or_default()).to_string();
    let data = form
        .data
        .ok_or_else(|| ApiError::BadRequest("missing input file".to_string()))?;

    let dir = state.store.register_job(&client.token, &id).await?;
    info!(job_id = %id, file = %file_name, bytes = data.len(), chunk_size = params.chunk_size, "processing upload");

    let recording = tokio::task::spawn_blocking(move || Recording::from_bytes(&data))
        .await
        .map_err(|err| ApiError::Internal(format!("could not load input file: {}", err)))??;

    let target = JobTarget::new(dir, file_name);
    let outcomes = state.dispatcher.run(&recording, &target, &params).await?;

    let (names, imgs) = outcomes
        .into_iter()
        .map(|outcome| (outcome.label, STANDARD.encode(&outcome.image)))
        .unzip();
    Ok(Json(RunResponse {
        names,
        imgs,
        error: String::new(),
    }))
}

pub fn run_routes() -> Router<AppState> {
    Router::new().route("/run", post(run_job))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(chunk: Option<&str>, xmin: Option<&str>, xmax: Option<&str>) -> RunForm {
        RunForm {
            chunk_size: chunk.map(str::to_string),
            xmin: xmin.map(str::to_string),
            xmax: xmax.map(str::to_string),
            ..RunForm::default()
        }
    }

    #[test]
    fn test_params_defaults() {
        let params = form(Some("256"), None, Some("")).params().unwrap();
        assert_eq!(params, ProcessParams::new(256));
    }

    #[test]
    fn test_params_rejects_bad_values() {
        for f in [
            form(None, None, None),
            form(Some("0"), None, None),
            form(Some("abc"), None, None),
            form(Some("4"), Some("-1"), None),
            form(Some("4"), None, Some("-2")),
        ] {
            assert!(matches!(f.params(), Err(ApiError::BadRequest(_))), "{:?}", f);
        }
    }
}
