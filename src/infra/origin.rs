//! reqwest-backed origin fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::application::origin::{FetchError, OriginFetcher, OriginResponse, mirrored_headers};
use crate::config::OriginSettings;
use crate::domain::Validators;

use super::error::InfraError;

pub struct HttpOriginFetcher {
    client: Client,
}

impl HttpOriginFetcher {
    pub fn new(settings: &OriginSettings) -> Result<Self, InfraError> {
        Self::with_timeout(settings.timeout, &settings.user_agent)
    }

    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(InfraError::origin_client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch(
        &self,
        url: &str,
        validators: &Validators,
    ) -> Result<OriginResponse, FetchError> {
        let mut request = self.client.get(url);

        if let Some(etag) = validators.etag.as_deref() {
            debug!(url, etag, "Setting If-None-Match");
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = validators.last_modified.as_deref() {
            debug!(url, last_modified, "Setting If-Modified-Since");
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|err| map_reqwest_error(url, err))?;
        let status = response.status();
        let headers = mirrored_headers(response.headers());

        if status == StatusCode::NOT_MODIFIED {
            return Ok(OriginResponse::NotModified { headers });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let header_str = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let etag = header_str(ETAG);
        let last_modified = header_str(LAST_MODIFIED);
        let validators = Validators::new(etag.as_deref(), last_modified.as_deref());

        let body = response.bytes().await.map_err(|err| map_reqwest_error(url, err))?;
        debug!(url, bytes = body.len(), "Fetched origin body");

        Ok(OriginResponse::Fresh {
            validators,
            body,
            headers,
        })
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::transport(url, err)
    }
}
