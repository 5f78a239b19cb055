//! Explicitly supplied credentials (manual mode).

use super::{AuthError, CredentialProvider, Credentials};
use async_trait::async_trait;

pub struct StaticCredentials {
    token: String,
    identity_id: String,
}

impl StaticCredentials {
    /// Both values must be non-empty.
    pub fn new(token: impl Into<String>, identity_id: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        let identity_id = identity_id.into();
        if token.trim().is_empty() || identity_id.trim().is_empty() {
            return Err(AuthError::MissingCredentials(
                "manual authentication requires both auth token and identity id".to_string(),
            ));
        }
        Ok(Self { token, identity_id })
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials, AuthError> {
        Ok(Credentials {
            token: self.token.clone(),
            identity_id: self.identity_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials_roundtrip() {
        let provider = StaticCredentials::new("token", "identity").unwrap();
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.token, "token");
        assert_eq!(creds.identity_id, "identity");
    }

    #[test]
    fn test_static_credentials_require_both_values() {
        assert!(matches!(
            StaticCredentials::new("", "identity"),
            Err(AuthError::MissingCredentials(_))
        ));
        assert!(StaticCredentials::new("token", " ").is_err());
    }
}
