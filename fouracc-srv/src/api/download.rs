//! Coefficient table download

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use tracing::debug;

use super::identity::ClientIdentity;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub id: String,
    /// `x`, `y`, `z`, or empty for a generic series
    #[serde(default)]
    pub axis: String,
}

/// GET /dl?id=<job>&axis=<axis>
pub async fn download_table(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let artifact = state
        .store
        .read_artifact(&client.token, &query.id, &query.axis)
        .await?;
    debug!(job_id = %query.id, file = %artifact.file_name, "serving table");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/tab-separated-values".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

pub fn download_routes() -> Router<AppState> {
    Router::new().route("/dl", get(download_table))
}
