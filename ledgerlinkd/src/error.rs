use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledgerlink_core::{PollError, ProviderError, SyncError};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::service::AssetReportError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Sync(#[from] SyncError<ProviderError>),
    #[error("{0}")]
    Poll(#[from] PollError<ProviderError>),
}

impl From<AssetReportError> for ApiError {
    fn from(err: AssetReportError) -> Self {
        match err {
            AssetReportError::Provider(err) => ApiError::Provider(err),
            AssetReportError::Poll(err) => ApiError::Poll(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Provider(err) => provider_status(err),
            ApiError::Sync(SyncError::Aborted { source, .. }) => provider_status(source),
            ApiError::Sync(SyncError::Cancelled) | ApiError::Poll(PollError::Cancelled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Poll(PollError::RetriesExhausted { .. }) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            ApiError::Provider(err) => Some(err),
            ApiError::Sync(err) => err.fetch_error(),
            ApiError::Poll(PollError::RetriesExhausted { last_error, .. }) => Some(last_error),
            _ => None,
        }
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::Api { status, .. } => StatusCode::from_u16(status.as_u16())
            .ok()
            .filter(|status| status.is_client_error() || status.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        ProviderError::Request(_) => StatusCode::BAD_GATEWAY,
        ProviderError::Url(_) | ProviderError::Credentials(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        let detail = self.provider_error().and_then(ProviderError::detail);
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
            error_type: detail.map(|d| d.error_type.clone()),
            error_code: detail.map(|d| d.error_code.clone()),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
