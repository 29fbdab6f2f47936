//! HTTP error mapping
//!
//! Every failure is answered with `{"error": "<message>"}`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fouracc_common::dispatch::{AxisError, DispatchError};
use fouracc_common::persist::PersistError;
use fouracc_common::session::SessionError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error("could not parse multipart form: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Common(#[from] fouracc_common::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::UnknownIdentity | SessionError::InvalidJobId(_) | SessionError::InvalidAxis(_) => {
            StatusCode::BAD_REQUEST
        }
        SessionError::UnknownJob { .. } | SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
        SessionError::Ambiguous { .. } => StatusCode::CONFLICT,
        SessionError::CreateDir { .. } | SessionError::RemoveDir { .. } | SessionError::Read { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::Range(_)
        | DispatchError::Spectrum(_)
        | DispatchError::NoChannels
        | DispatchError::NoElapsedAxis => StatusCode::BAD_REQUEST,
        DispatchError::Axis {
            source: AxisError::Spectrum(_),
            ..
        } => StatusCode::BAD_REQUEST,
        // job removed or swept while it was being processed
        DispatchError::Axis {
            source: AxisError::Persist(PersistError::MissingDir { .. }),
            ..
        } => StatusCode::NOT_FOUND,
        DispatchError::Axis { .. } | DispatchError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use fouracc_common::Error as E;

        match self {
            ApiError::BadRequest(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Session(err) | ApiError::Common(E::Session(err)) => session_status(err),
            ApiError::Dispatch(err) | ApiError::Common(E::Dispatch(err)) => dispatch_status(err),
            ApiError::Common(E::Parse(_) | E::Load(_) | E::Spectrum(_) | E::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = %status, error = %message, "request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
