use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crescendo_engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http {
        status: StatusCode,
        kind: &'static str,
        message: String,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }

    pub fn unavailable(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Engine(err) => match err {
                EngineError::InsufficientData { .. } | EngineError::InsufficientHistory { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::InvalidParameterSet(_) => StatusCode::BAD_REQUEST,
                EngineError::ConcurrentModification => StatusCode::CONFLICT,
                EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::NoCandidates | EngineError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Http { kind, .. } => kind,
            ApiError::Engine(err) => err.kind(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}: {:#}", self.kind(), self);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.to_string(), "kind": self.kind() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_engine_taxonomy() {
        let cases = [
            (EngineError::InsufficientData { needed: 6, available: 2 }, 422),
            (EngineError::InsufficientHistory { window: 50, available: 10 }, 422),
            (EngineError::InvalidParameterSet("decay".into()), 400),
            (EngineError::ConcurrentModification, 409),
            (EngineError::Cancelled, 503),
            (EngineError::NoCandidates, 500),
        ];
        for (err, code) in cases {
            let kind = err.kind();
            let api = ApiError::from(err);
            assert_eq!(api.status().as_u16(), code);
            assert_eq!(api.kind(), kind);
        }
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
    }
}
