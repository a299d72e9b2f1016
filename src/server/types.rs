use crate::{Error, uploads::UploadedFile};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// The gateway's error envelope together with its status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    /// The one place crate errors become HTTP answers.
    ///
    /// Caller mistakes are 400. Every other failure, whatever the upstream
    /// status was, collapses to 500 with `summary` naming the operation.
    pub fn from_error(summary: impl Into<String>, err: Error) -> Self {
        let summary = summary.into();
        match err {
            Error::Validation(message) => {
                warn!("Rejected request: {}", message);
                Self {
                    status: StatusCode::BAD_REQUEST,
                    body: ErrorResponse {
                        error: message,
                        details: None,
                    },
                }
            }
            Error::InvalidBody(details) => {
                warn!("Rejected request body: {}", details);
                Self {
                    status: StatusCode::BAD_REQUEST,
                    body: ErrorResponse {
                        error: "Invalid request body".to_string(),
                        details: Some(details),
                    },
                }
            }
            Error::Upload(details) => {
                warn!("{}: {}", summary, details);
                Self {
                    status: StatusCode::BAD_REQUEST,
                    body: ErrorResponse {
                        error: summary,
                        details: Some(details),
                    },
                }
            }
            other => {
                error!("{}: {}", summary, other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: ErrorResponse {
                        error: summary,
                        details: Some(other.to_string()),
                    },
                }
            }
        }
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                error: "Internal server error".to_string(),
                details: Some(details.into()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: FileInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub url: String,
    pub mimetype: String,
    pub size: u64,
}

impl From<&UploadedFile> for UploadResponse {
    fn from(file: &UploadedFile) -> Self {
        Self {
            success: true,
            file: FileInfo {
                name: file.original_name.clone(),
                url: file.url(),
                mimetype: file.mimetype.clone(),
                size: file.size,
            },
        }
    }
}
