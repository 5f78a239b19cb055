//! In-cluster OpenShift credentials.
//!
//! The ingress token is the `cloud.openshift.com` entry of the cluster pull
//! secret; the identity is the cluster ID from the `ClusterVersion` object.

use super::{AuthError, CredentialProvider, Credentials, DockerAuthConfig};
use crate::config::ACCESS_TOKEN_GENERATION_TIMEOUT;
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const PULL_SECRET_PATH: &str = "/api/v1/namespaces/openshift-config/secrets/pull-secret";
const CLUSTER_VERSION_PATH: &str = "/apis/config.openshift.io/v1/clusterversions/version";
const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

pub struct OpenShiftCredentials {
    http: reqwest::Client,
    api_base: String,
    service_account_token: String,
}

#[derive(Debug, Deserialize)]
struct Secret {
    #[serde(default)]
    data: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    spec: Option<ClusterVersionSpec>,
}

#[derive(Debug, Deserialize)]
struct ClusterVersionSpec {
    #[serde(rename = "clusterID")]
    cluster_id: Option<String>,
}

/// Which lookup a request belongs to, so failures land in the right variant.
#[derive(Clone, Copy)]
enum Lookup {
    PullSecret,
    ClusterId,
}

impl Lookup {
    fn error(self, msg: String) -> AuthError {
        match self {
            Lookup::PullSecret => AuthError::PullSecret(msg),
            Lookup::ClusterId => AuthError::ClusterId(msg),
        }
    }
}

impl OpenShiftCredentials {
    /// Load the in-cluster configuration from the pod environment.
    pub fn from_cluster() -> Result<Self, AuthError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| AuthError::NotInCluster("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| AuthError::NotInCluster("KUBERNETES_SERVICE_PORT is not set".into()))?;

        let sa_dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(sa_dir.join("token")).map_err(|e| {
            AuthError::NotInCluster(format!("cannot read service account token: {}", e))
        })?;
        let ca = std::fs::read(sa_dir.join("ca.crt")).map_err(|e| {
            AuthError::NotInCluster(format!("cannot read service account CA bundle: {}", e))
        })?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| AuthError::NotInCluster(format!("invalid CA bundle: {}", e)))?;

        let http = reqwest::Client::builder()
            .add_root_certificate(ca)
            .timeout(ACCESS_TOKEN_GENERATION_TIMEOUT)
            .build()?;

        // IPv6 service hosts need brackets in the authority
        let api_base = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };

        tracing::info!("Initialized OpenShift authentication provider");
        Ok(Self::with_endpoint(http, api_base, token.trim()))
    }

    pub fn with_endpoint(
        http: reqwest::Client,
        api_base: impl Into<String>,
        service_account_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            service_account_token: service_account_token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, lookup: Lookup) -> Result<T, AuthError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.service_account_token)
            .send()
            .await
            .map_err(|e| lookup.error(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| lookup.error(format!("reading response from {} failed: {}", url, e)))?;
        if !status.is_success() {
            tracing::error!("Kubernetes API returned {} for {}: {}", status, path, body);
            return Err(lookup.error(format!("API returned {}: {}", status, body)));
        }
        serde_json::from_str(&body).map_err(|e| lookup.error(format!("invalid response: {}", e)))
    }

    pub async fn auth_token(&self) -> Result<String, AuthError> {
        let secret: Secret = self.get_json(PULL_SECRET_PATH, Lookup::PullSecret).await?;
        let encoded = secret.data.get(DOCKER_CONFIG_KEY).ok_or_else(|| {
            tracing::error!("Pull secret has no {} key", DOCKER_CONFIG_KEY);
            AuthError::PullSecret("missing required keys in pull secret".into())
        })?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::PullSecret(format!("invalid pull secret format: {}", e)))?;
        let docker_config: DockerAuthConfig = serde_json::from_slice(&decoded)
            .map_err(|e| AuthError::PullSecret(format!("invalid pull secret format: {}", e)))?;

        docker_config
            .cloud_token()
            .map(str::to_string)
            .ok_or_else(|| AuthError::PullSecret("missing required keys in pull secret".into()))
    }

    pub async fn identity_id(&self) -> Result<String, AuthError> {
        let version: ClusterVersion = self
            .get_json(CLUSTER_VERSION_PATH, Lookup::ClusterId)
            .await?;
        version
            .spec
            .and_then(|spec| spec.cluster_id)
            .ok_or_else(|| AuthError::ClusterId("missing cluster ID in cluster version".into()))
    }
}

#[async_trait]
impl CredentialProvider for OpenShiftCredentials {
    async fn credentials(&self) -> Result<Credentials, AuthError> {
        let token = self.auth_token().await?;
        let identity_id = self.identity_id().await?;
        Ok(Credentials { token, identity_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn encoded_docker_config(auths: serde_json::Value) -> String {
        base64::engine::general_purpose::STANDARD.encode(json!({ "auths": auths }).to_string())
    }

    fn provider(server: &MockServer) -> OpenShiftCredentials {
        OpenShiftCredentials::with_endpoint(reqwest::Client::new(), server.base_url(), "sa-token")
    }

    #[tokio::test]
    async fn test_credentials_from_cluster_objects() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path(PULL_SECRET_PATH)
                .header("authorization", "Bearer sa-token");
            then.status(200).json_body(json!({
                "data": {
                    ".dockerconfigjson": encoded_docker_config(json!({
                        "cloud.openshift.com": {"auth": "pull-token"}
                    }))
                }
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path(CLUSTER_VERSION_PATH);
            then.status(200)
                .json_body(json!({"spec": {"clusterID": "cluster-123"}}));
        });

        let creds = provider(&server).credentials().await.unwrap();
        assert_eq!(creds.token, "pull-token");
        assert_eq!(creds.identity_id, "cluster-123");
    }

    #[tokio::test]
    async fn test_pull_secret_missing_cloud_entry() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PULL_SECRET_PATH);
            then.status(200).json_body(json!({
                "data": {
                    ".dockerconfigjson": encoded_docker_config(json!({"quay.io": {"auth": "x"}}))
                }
            }));
        });

        let err = provider(&server).auth_token().await.unwrap_err();
        assert!(matches!(err, AuthError::PullSecret(_)));
    }

    #[tokio::test]
    async fn test_pull_secret_not_json() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PULL_SECRET_PATH);
            then.status(200).json_body(json!({
                "data": {
                    ".dockerconfigjson": base64::engine::general_purpose::STANDARD.encode("not json")
                }
            }));
        });

        let err = provider(&server).auth_token().await.unwrap_err();
        assert!(matches!(err, AuthError::PullSecret(_)));
    }

    #[tokio::test]
    async fn test_pull_secret_forbidden() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(PULL_SECRET_PATH);
            then.status(403).body("forbidden");
        });

        let err = provider(&server).auth_token().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_cluster_version_without_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(CLUSTER_VERSION_PATH);
            then.status(200).json_body(json!({"spec": {}}));
        });

        let err = provider(&server).identity_id().await.unwrap_err();
        assert!(matches!(err, AuthError::ClusterId(_)));
    }
}
