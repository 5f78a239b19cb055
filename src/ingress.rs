//! Upload of archives to the ingress service.

use crate::archive::Archive;
use crate::config::{self, ServiceConfig, TARBALL_FILENAME};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Destination for packed chunks. Returns the server-assigned request id.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn send(&self, archive: Archive) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct IngressResponse {
    request_id: String,
}

pub struct IngressClient {
    http: reqwest::Client,
    url: String,
    auth_token: String,
    content_type: String,
    user_agent: String,
}

impl IngressClient {
    pub fn new(
        url: impl Into<String>,
        auth_token: impl Into<String>,
        service_id: &str,
        identity_id: &str,
        connection_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connection_timeout)
            .read_timeout(connection_timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            auth_token: auth_token.into(),
            content_type: config::content_type(service_id),
            user_agent: config::user_agent(identity_id),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::new(
            config.ingress_server_url.clone(),
            config.ingress_server_auth_token.clone(),
            &config.service_id,
            &config.identity_id,
            config.connection_timeout(),
        )
    }
}

#[async_trait]
impl Uploader for IngressClient {
    async fn send(&self, archive: Archive) -> Result<String> {
        tracing::info!(
            "Sending collected data ({} files, {} bytes)",
            archive.entries(),
            archive.len()
        );

        let part = Part::bytes(archive.into_bytes())
            .file_name(TARBALL_FILENAME)
            .mime_str(&self.content_type)?;
        let form = Form::new().part("file", part);

        tracing::debug!("Posting payload to {}", self.url);
        let response = self
            .http
            .post(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .bearer_auth(&self.auth_token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::ACCEPTED {
            tracing::error!(
                "Posting payload failed, response: {}: {}",
                status.as_u16(),
                body
            );
            return Err(ExportError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IngressResponse =
            serde_json::from_str(&body).map_err(|e| ExportError::InvalidResponse {
                status: status.as_u16(),
                reason: e.to_string(),
                body: body.clone(),
            })?;

        tracing::info!("Data uploaded with request_id: '{}'", parsed.request_id);
        Ok(parsed.request_id)
    }
}
