use super::CredentialSource;
use crate::config::StoreConfig;
use crate::error::AdvisorError;
use crate::models::Credentials;
use crate::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Credential document stored as JSON in Redis
///
/// The document lives at `<collection>:<document_id>` and must carry
/// `api_key`, `api_secret` and `request_token`. Other fields are ignored.
pub struct RedisCredentialSource {
    conn: ConnectionManager,
    key: String,
}

impl RedisCredentialSource {
    /// Connect to Redis
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> index_signal::Result<()> {
    /// use index_signal::config::StoreConfig;
    /// use index_signal::credentials::RedisCredentialSource;
    ///
    /// let source = RedisCredentialSource::connect(&StoreConfig::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(store: &StoreConfig) -> Result<Self> {
        let client = Client::open(store.redis_url.as_str())?;

        let conn = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| {
            AdvisorError::Store(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Redis connection timeout after 5 seconds",
            )))
        })??;

        tracing::info!("Connected to credential store at {}", store.redis_url);

        Ok(Self {
            conn,
            key: store.document_key(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Decode a credential document, naming the key on failure
pub fn parse_credentials_document(key: &str, raw: &str) -> Result<Credentials> {
    serde_json::from_str(raw)
        .map_err(|e| AdvisorError::decode("credential document", format!("{}: {}", key, e)))
}

#[async_trait]
impl CredentialSource for RedisCredentialSource {
    async fn fetch_credentials(&self) -> Result<Credentials> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&self.key).await?;

        let raw = raw.ok_or_else(|| AdvisorError::CredentialsNotFound(self.key.clone()))?;
        let credentials = parse_credentials_document(&self.key, &raw)?;

        tracing::debug!(key = %self.key, "Loaded broker credentials");

        Ok(credentials)
    }
}
