//! Credential acquisition for the ingress service.
//!
//! The collector only needs a bearer token and an identity string. Each
//! deployment environment has its own way of obtaining them:
//!
//! - [`OpenShiftCredentials`] - cluster pull-secret and cluster ID, read
//!   through the in-cluster Kubernetes API
//! - [`SsoCredentials`] - SSO service-account client-credentials exchange
//! - [`StaticCredentials`] - token and identity supplied by the operator
//!
//! Credentials are fetched once at startup; there is no refresh.

pub mod openshift;
pub mod sso;
pub mod static_token;

pub use openshift::OpenShiftCredentials;
pub use sso::{SsoCredentials, SsoEnv};
pub use static_token::StaticCredentials;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Registry host whose entry in a docker auth config carries the ingress token
pub const CLOUD_AUTH_HOST: &str = "cloud.openshift.com";

/// Bearer token plus the identity reported in the user agent.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub identity_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("identity_id", &self.identity_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not running in an OpenShift cluster: {0}")]
    NotInCluster(String),

    #[error("Cannot read cluster pull secret: {0}")]
    PullSecret(String),

    #[error("Cannot retrieve cluster ID: {0}")]
    ClusterId(String),

    #[error("SSO token exchange failed: {0}")]
    Sso(String),

    #[error("Cannot obtain ingress access token: {0}")]
    AccessToken(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("HTTP error during authentication: {0}")]
    Http(#[from] reqwest::Error),
}

/// Source of ingress credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, AuthError>;
}

/// `{"auths": {"<host>": {"auth": "<token>"}}}` as found in pull secrets and
/// returned by the accounts-management API.
#[derive(Debug, Deserialize)]
pub(crate) struct DockerAuthConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
}

impl DockerAuthConfig {
    pub(crate) fn cloud_token(&self) -> Option<&str> {
        self.auths
            .get(CLOUD_AUTH_HOST)
            .and_then(|entry| entry.auth.as_deref())
    }
}
