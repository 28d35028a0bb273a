// Credential sources
pub mod redis_store;

use crate::error::AdvisorError;
use crate::models::Credentials;
use crate::Result;
use async_trait::async_trait;

pub use redis_store::RedisCredentialSource;

/// Anything that can hand back the broker credential triple
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch the credentials, failing with `CredentialsNotFound` when the record is absent
    async fn fetch_credentials(&self) -> Result<Credentials>;
}

/// Fixed in-memory credentials
///
/// `None` behaves like a store with no matching document.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    credentials: Option<Credentials>,
}

impl StaticCredentialSource {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch_credentials(&self) -> Result<Credentials> {
        self.credentials
            .clone()
            .ok_or_else(|| AdvisorError::CredentialsNotFound("static".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_returns_credentials() {
        let creds = Credentials {
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            request_token: "r".to_string(),
        };
        let source = StaticCredentialSource::new(creds.clone());

        let fetched = tokio_test::assert_ok!(source.fetch_credentials().await);
        assert_eq!(fetched, creds);
    }

    #[tokio::test]
    async fn test_empty_static_source_is_not_found() {
        let source = StaticCredentialSource::empty();

        let err = tokio_test::assert_err!(source.fetch_credentials().await);
        assert!(matches!(err, AdvisorError::CredentialsNotFound(_)));
    }
}
