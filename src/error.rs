use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::tax_reports::TaxReportError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<TaxReportError> for AppError {
    fn from(error: TaxReportError) -> Self {
        match error {
            TaxReportError::InvalidYear { .. }
            | TaxReportError::EmptyPropertyList
            | TaxReportError::TooManyProperties { .. }
            | TaxReportError::NoPropertiesResolved => Self::BadRequest(error.to_string()),
            TaxReportError::PropertyNotFound(_) | TaxReportError::ReportNotFound(_) => {
                Self::NotFound(error.to_string())
            }
            TaxReportError::Render(_) => Self::Internal(error.to_string()),
            TaxReportError::Storage(_) | TaxReportError::DataSource(_) => {
                Self::Dependency(error.to_string())
            }
        }
    }
}
