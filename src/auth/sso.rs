//! SSO service-account credentials.
//!
//! Two requests: a client-credentials grant against the SSO realm, then an
//! exchange of the SSO access token for the ingress token at the accounts
//! management API.

use super::{AuthError, CredentialProvider, Credentials, DockerAuthConfig};
use crate::config::ACCESS_TOKEN_GENERATION_TIMEOUT;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

const TOKEN_PATH: &str = "/auth/realms/redhat-external/protocol/openid-connect/token";
const ACCESS_TOKEN_PATH: &str = "/api/accounts_mgmt/v1/access_token";
const SSO_SCOPE: &str = "api.console";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoEnv {
    Prod,
    Stage,
}

impl SsoEnv {
    fn sso_base(self) -> &'static str {
        match self {
            SsoEnv::Prod => "https://sso.redhat.com",
            SsoEnv::Stage => "https://sso.stage.redhat.com",
        }
    }

    fn api_base(self) -> &'static str {
        match self {
            SsoEnv::Prod => "https://api.openshift.com",
            SsoEnv::Stage => "https://api.stage.openshift.com",
        }
    }
}

pub struct SsoCredentials {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    /// Overrides the identity derived from the SSO token
    identity_id: Option<String>,
    sso_base: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenClaims {
    preferred_username: Option<String>,
    sub: Option<String>,
}

impl SsoCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        identity_id: Option<String>,
        env: SsoEnv,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(ACCESS_TOKEN_GENERATION_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            identity_id: identity_id.filter(|id| !id.is_empty()),
            sso_base: env.sso_base().to_string(),
            api_base: env.api_base().to_string(),
        })
    }

    /// Point both endpoints somewhere else (tests, private deployments).
    pub fn with_endpoints(mut self, sso_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.sso_base = sso_base.into().trim_end_matches('/').to_string();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn sso_token(&self) -> Result<String, AuthError> {
        let url = format!("{}{}", self.sso_base, TOKEN_PATH);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", SSO_SCOPE),
        ];
        let response = self.http.post(&url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::Sso(format!(
                "got {} response from SSO: {}",
                status.as_u16(),
                body
            )));
        }
        let token: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            AuthError::Sso(format!(
                "SSO response is not JSON. Response: {}: {}",
                status.as_u16(),
                body
            ))
        })?;
        Ok(token.access_token)
    }

    async fn ingress_token(&self, sso_token: &str) -> Result<String, AuthError> {
        let url = format!("{}{}", self.api_base, ACCESS_TOKEN_PATH);
        let response = self.http.post(&url).bearer_auth(sso_token).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::AccessToken(format!(
                "access_token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let config: DockerAuthConfig = serde_json::from_str(&body).map_err(|_| {
            AuthError::AccessToken(format!("response was not valid JSON, got {}", body))
        })?;
        config
            .cloud_token()
            .map(str::to_string)
            .ok_or_else(|| AuthError::AccessToken(format!("response was malformed, got {}", body)))
    }
}

/// Identity from the token's claims. The signature is not verified; the
/// token came straight from SSO over TLS.
///
/// A token without a decodable JSON payload is an error. A valid payload that
/// names neither `preferred_username` nor `sub` yields `"unknown"`.
pub fn derive_sso_identity(jwt: &str) -> Result<String, AuthError> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Sso("access token is not a JWT".to_string()))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Sso(format!("cannot decode access token payload: {}", e)))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Sso(format!("cannot parse access token claims: {}", e)))?;

    Ok(claims
        .preferred_username
        .filter(|s| !s.is_empty())
        .or(claims.sub.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "unknown".to_string()))
}

#[async_trait]
impl CredentialProvider for SsoCredentials {
    async fn credentials(&self) -> Result<Credentials, AuthError> {
        let sso_token = self.sso_token().await?;
        let identity_id = match &self.identity_id {
            Some(id) => id.clone(),
            None => derive_sso_identity(&sso_token)?,
        };
        let token = self.ingress_token(&sso_token).await?;
        Ok(Credentials { token, identity_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn make_jwt(claims: serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            engine.encode(r#"{"alg":"none"}"#),
            engine.encode(claims.to_string())
        )
    }

    fn provider(server: &MockServer, identity: Option<&str>) -> SsoCredentials {
        SsoCredentials::new("client", "secret", identity.map(String::from), SsoEnv::Stage)
            .unwrap()
            .with_endpoints(server.base_url(), server.base_url())
    }

    #[test]
    fn test_derive_identity_prefers_username() {
        let jwt = make_jwt(json!({"preferred_username": "svc-user", "sub": "1234"}));
        assert_eq!(derive_sso_identity(&jwt).unwrap(), "svc-user");

        let jwt = make_jwt(json!({"sub": "1234"}));
        assert_eq!(derive_sso_identity(&jwt).unwrap(), "1234");
    }

    #[test]
    fn test_derive_identity_without_claims_is_unknown() {
        let jwt = make_jwt(json!({"email": "svc@example.com"}));
        assert_eq!(derive_sso_identity(&jwt).unwrap(), "unknown");

        let jwt = make_jwt(json!({"preferred_username": "", "sub": ""}));
        assert_eq!(derive_sso_identity(&jwt).unwrap(), "unknown");
    }

    #[test]
    fn test_derive_identity_rejects_malformed_token() {
        assert!(matches!(derive_sso_identity("garbage"), Err(AuthError::Sso(_))));
        assert!(matches!(
            derive_sso_identity("header.!!not-base64!!.sig"),
            Err(AuthError::Sso(_))
        ));

        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let not_json = format!("h.{}.s", engine.encode("plain text"));
        assert!(matches!(derive_sso_identity(&not_json), Err(AuthError::Sso(_))));
    }

    #[tokio::test]
    async fn test_opaque_sso_token_fails_without_identity() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200).json_body(json!({"access_token": "opaque"}));
        });
        let exchange_mock = server.mock(|when, then| {
            when.method(POST).path(ACCESS_TOKEN_PATH);
            then.status(200)
                .json_body(json!({"auths": {"cloud.openshift.com": {"auth": "t"}}}));
        });

        let err = provider(&server, None).credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::Sso(_)));
        exchange_mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_sso_exchange() {
        let server = MockServer::start();
        let sso_jwt = make_jwt(json!({"preferred_username": "svc-user"}));

        let token_mock = server.mock(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .body_contains("grant_type=client_credentials")
                .body_contains("client_id=client")
                .body_contains("scope=api.console");
            then.status(200).json_body(json!({"access_token": sso_jwt}));
        });
        let exchange_mock = server.mock(|when, then| {
            when.method(POST)
                .path(ACCESS_TOKEN_PATH)
                .header("authorization", format!("Bearer {}", sso_jwt));
            then.status(200).json_body(json!({
                "auths": {"cloud.openshift.com": {"auth": "ingress-token"}}
            }));
        });

        let creds = provider(&server, None).credentials().await.unwrap();
        token_mock.assert();
        exchange_mock.assert();
        assert_eq!(creds.token, "ingress-token");
        assert_eq!(creds.identity_id, "svc-user");
    }

    #[tokio::test]
    async fn test_configured_identity_wins() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200)
                .json_body(json!({"access_token": make_jwt(json!({"sub": "x"}))}));
        });
        server.mock(|when, then| {
            when.method(POST).path(ACCESS_TOKEN_PATH);
            then.status(200)
                .json_body(json!({"auths": {"cloud.openshift.com": {"auth": "t"}}}));
        });

        let creds = provider(&server, Some("my-identity"))
            .credentials()
            .await
            .unwrap();
        assert_eq!(creds.identity_id, "my-identity");
    }

    #[tokio::test]
    async fn test_bad_sso_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(401).body("unauthorized_client");
        });

        let err = provider(&server, None).credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::Sso(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_bad_api_credentials() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200)
                .json_body(json!({"access_token": make_jwt(json!({"sub": "x"}))}));
        });
        server.mock(|when, then| {
            when.method(POST).path(ACCESS_TOKEN_PATH);
            then.status(403).body("forbidden");
        });

        let err = provider(&server, None).credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::AccessToken(_)));
    }

    #[tokio::test]
    async fn test_malformed_api_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200)
                .json_body(json!({"access_token": make_jwt(json!({"sub": "x"}))}));
        });
        server.mock(|when, then| {
            when.method(POST).path(ACCESS_TOKEN_PATH);
            then.status(200).json_body(json!({"auths": {}}));
        });

        let err = provider(&server, None).credentials().await.unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
