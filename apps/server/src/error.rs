use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use macrodash_core::errors::Error as CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Core(e) => match e {
                CoreError::UnknownTab(_) | CoreError::UnknownSymbol { .. } => StatusCode::NOT_FOUND,
                CoreError::InvalidConfigValue(_) => StatusCode::BAD_REQUEST,
                // Missing provider credentials for the requested tab
                CoreError::MarketData(_) if e.is_fatal() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
