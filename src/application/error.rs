use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{rebuild::RebuildError, revalidate::RevalidateError},
    cache::CacheError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RevalidateError> for HttpError {
    fn from(error: RevalidateError) -> Self {
        const SOURCE: &str = "infra::http::revalidate_error_to_http_error";

        let (status, public_message) = match &error {
            RevalidateError::MissingUrl => {
                (StatusCode::BAD_REQUEST, "Missing `url` query parameter")
            }
            RevalidateError::NotFound { .. } => (StatusCode::NOT_FOUND, "Feed not found"),
            RevalidateError::Origin(_) => (StatusCode::BAD_GATEWAY, "Origin request failed"),
            RevalidateError::Render { .. } => {
                (StatusCode::BAD_GATEWAY, "Origin feed could not be rendered")
            }
            RevalidateError::Cache(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        HttpError::from_error(SOURCE, status, public_message, &error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Rebuild(#[from] RebuildError),
    #[error(transparent)]
    Revalidate(#[from] RevalidateError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::origin::FetchError;

    #[test]
    fn revalidate_errors_map_to_statuses() {
        let cases = [
            (RevalidateError::MissingUrl, StatusCode::BAD_REQUEST),
            (
                RevalidateError::NotFound {
                    url: "https://example.com/rss".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                RevalidateError::Origin(FetchError::Status {
                    url: "https://example.com/rss".to_string(),
                    status: 500,
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RevalidateError::Cache(CacheError::storage("get", "disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(HttpError::from(error).status(), expected);
        }
    }

    #[test]
    fn report_is_attached_to_response() {
        let response = HttpError::from(RevalidateError::MissingUrl).into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("error report attached");
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
        assert_eq!(report.messages, ["no feed url was given"]);
    }
}
