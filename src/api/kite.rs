use super::{Broker, BrokerSession};
use crate::config::BrokerConfig;
use crate::error::AdvisorError;
use crate::models::{Candle, Credentials, Instrument};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const KITE_VERSION: &str = "3";
const QUOTE_RATE_PER_SEC: u32 = 1; // Kite quote endpoints: 1 req/s
const HISTORICAL_RATE_PER_SEC: u32 = 3; // Kite historical endpoint: 3 req/s
const DATE_FORMAT: &str = "%Y-%m-%d";

// Type alias for the rate limiter to simplify signatures
type KiteRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Kite Connect REST client
///
/// Cloneable; all clones share the same rate limiters. Limiters only delay
/// requests, nothing is retried.
#[derive(Clone)]
pub struct KiteClient {
    client: Client,
    base_url: String,
    quote_limiter: Arc<KiteRateLimiter>,
    historical_limiter: Arc<KiteRateLimiter>,
}

/// Authenticated Kite session
#[derive(Clone)]
pub struct KiteSession {
    kite: KiteClient,
    api_key: String,
    access_token: String,
    user_id: Option<String>,
}

// ============== Response Types ==============

/// Every JSON endpoint wraps its payload in this envelope
#[derive(Debug, Deserialize)]
struct KiteResponse<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionData {
    access_token: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LtpQuote {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalData {
    candles: Vec<RawCandle>,
}

/// `[timestamp, open, high, low, close, volume]`, with open interest appended when requested
#[derive(Debug, Deserialize)]
struct RawCandle(
    String,
    f64,
    f64,
    f64,
    f64,
    f64,
    #[serde(default)]
    #[allow(dead_code)]
    Option<f64>,
);

/// One row of the `/instruments/<exchange>` CSV dump
#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: u64,
    tradingsymbol: String,
}

// ============== Implementation ==============

/// `hex(sha256(api_key + request_token + api_secret))`, as Kite expects for `/session/token`
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn per_second(rate: u32) -> Arc<KiteRateLimiter> {
    let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rate)))
}

/// Map an error envelope onto the advisor's error kinds
fn broker_error(
    status: StatusCode,
    error_type: Option<String>,
    message: Option<String>,
) -> AdvisorError {
    let error_type = error_type.unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let message = message.unwrap_or_else(|| "no message".to_string());

    if error_type == "TokenException" {
        AdvisorError::Authentication(message)
    } else {
        AdvisorError::Broker {
            error_type,
            message,
        }
    }
}

/// Unwrap a JSON envelope into its `data` payload
async fn parse_envelope<T: DeserializeOwned>(response: Response, what: &'static str) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    let envelope: KiteResponse<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(AdvisorError::decode(what, e)),
        Err(_) => {
            return Err(AdvisorError::Broker {
                error_type: format!("HTTP {}", status.as_u16()),
                message: body,
            })
        }
    };

    if status.is_success() && envelope.status == "success" {
        return envelope
            .data
            .ok_or_else(|| AdvisorError::decode(what, "response has no data"));
    }

    Err(broker_error(status, envelope.error_type, envelope.message))
}

/// Reduce a Kite timestamp such as `2024-01-02T00:00:00+0530` to its calendar date
fn candle_date(timestamp: &str) -> Result<NaiveDate> {
    timestamp
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
        .ok_or_else(|| AdvisorError::decode("candle timestamp", timestamp))
}

/// Linear scan of the instrument CSV for an exact trading-symbol match
fn find_instrument_token(csv_body: &str, symbol: &str) -> Result<Option<u64>> {
    let mut reader = csv::Reader::from_reader(csv_body.as_bytes());

    for row in reader.deserialize::<InstrumentRow>() {
        let row = row.map_err(|e| AdvisorError::decode("instrument list", e))?;
        if row.tradingsymbol == symbol {
            return Ok(Some(row.instrument_token));
        }
    }

    Ok(None)
}

impl KiteClient {
    /// Create a new Kite client
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quote_limiter: per_second(QUOTE_RATE_PER_SEC),
            historical_limiter: per_second(HISTORICAL_RATE_PER_SEC),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Broker for KiteClient {
    type Session = KiteSession;

    /// Exchange the request token for an access token
    /// Endpoint: POST /session/token
    async fn authenticate(&self, credentials: &Credentials) -> Result<KiteSession> {
        let checksum = session_checksum(
            &credentials.api_key,
            &credentials.request_token,
            &credentials.api_secret,
        );

        let response = self
            .client
            .post(self.url("/session/token"))
            .header("X-Kite-Version", KITE_VERSION)
            .form(&[
                ("api_key", credentials.api_key.as_str()),
                ("request_token", credentials.request_token.as_str()),
                ("checksum", checksum.as_str()),
            ])
            .send()
            .await?;

        let data: SessionData = parse_envelope(response, "session")
            .await
            .map_err(|e| match e {
                AdvisorError::Broker {
                    error_type,
                    message,
                } => AdvisorError::Authentication(format!("{} ({})", message, error_type)),
                other => other,
            })?;

        tracing::info!(
            user_id = data.user_id.as_deref().unwrap_or("unknown"),
            "Authenticated with Kite"
        );

        Ok(KiteSession {
            kite: self.clone(),
            api_key: credentials.api_key.clone(),
            access_token: data.access_token,
            user_id: data.user_id,
        })
    }
}

impl std::fmt::Debug for KiteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiteSession")
            .field("base_url", &self.kite.base_url)
            .field("api_key", &self.api_key)
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl KiteSession {
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.kite
            .client
            .get(self.kite.url(path))
            .header("X-Kite-Version", KITE_VERSION)
            .header(
                AUTHORIZATION,
                format!("token {}:{}", self.api_key, self.access_token),
            )
    }
}

#[async_trait]
impl BrokerSession for KiteSession {
    /// Endpoint: GET /instruments/{exchange} (CSV)
    async fn lookup_instrument(&self, exchange: &str, symbol: &str) -> Result<Instrument> {
        let response = self.get(&format!("/instruments/{}", exchange)).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await?;
            return Err(match serde_json::from_str::<KiteResponse<serde_json::Value>>(&body) {
                Ok(envelope) => broker_error(status, envelope.error_type, envelope.message),
                Err(_) => broker_error(status, None, Some(body)),
            });
        }

        let body = response.text().await?;
        let token = find_instrument_token(&body, symbol)?.ok_or_else(|| {
            AdvisorError::InstrumentNotFound {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
            }
        })?;

        tracing::debug!(%exchange, %symbol, token, "Resolved instrument token");

        Ok(Instrument {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            token,
        })
    }

    /// Endpoint: GET /quote/ltp?i={token}
    async fn last_price(&self, instrument: &Instrument) -> Result<f64> {
        self.kite.quote_limiter.until_ready().await;

        let key = instrument.token.to_string();
        let response = self
            .get("/quote/ltp")
            .query(&[("i", key.as_str())])
            .send()
            .await?;

        let quotes: HashMap<String, LtpQuote> = parse_envelope(response, "last price").await?;
        let quote = quotes.get(&key).ok_or_else(|| {
            AdvisorError::decode("last price", format!("no quote for {}", instrument.symbol))
        })?;

        tracing::debug!(symbol = %instrument.symbol, price = quote.last_price, "Fetched last price");

        Ok(quote.last_price)
    }

    /// Endpoint: GET /instruments/historical/{token}/{interval}?from=...&to=...
    async fn historical_candles(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        interval: &str,
    ) -> Result<Vec<Candle>> {
        self.kite.historical_limiter.until_ready().await;

        let from = from.format(DATE_FORMAT).to_string();
        let to = to.format(DATE_FORMAT).to_string();
        let response = self
            .get(&format!(
                "/instruments/historical/{}/{}",
                instrument.token, interval
            ))
            .query(&[("from", from.as_str()), ("to", to.as_str())])
            .send()
            .await?;

        let data: HistoricalData = parse_envelope(response, "historical candles").await?;

        let candles = data
            .candles
            .into_iter()
            .map(|raw| -> Result<Candle> {
                Ok(Candle {
                    date: candle_date(&raw.0)?,
                    open: raw.1,
                    high: raw.2,
                    low: raw.3,
                    close: raw.4,
                    volume: raw.5,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Fetched {} {} candles for {} ({} to {})",
            candles.len(),
            interval,
            instrument.symbol,
            from,
            to
        );

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    const INSTRUMENTS_CSV: &str = "\
instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange
738561,2885,RELIANCE,RELIANCE INDUSTRIES,0,,0,0.05,1,EQ,NSE,NSE
256265,1001,NIFTY 50,NIFTY 50,0,,0,0,0,EQ,INDICES,NSE
260105,1016,NIFTY BANK,NIFTY BANK,0,,0,0,0,EQ,INDICES,NSE
";

    fn client_for(server: &ServerGuard) -> KiteClient {
        KiteClient::new(&BrokerConfig {
            base_url: server.url(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn credentials() -> Credentials {
        Credentials {
            api_key: "kitekey".to_string(),
            api_secret: "s3cret".to_string(),
            request_token: "req-tok-123".to_string(),
        }
    }

    fn session_for(server: &ServerGuard) -> KiteSession {
        KiteSession {
            kite: client_for(server),
            api_key: "kitekey".to_string(),
            access_token: "acc-tok".to_string(),
            user_id: None,
        }
    }

    fn nifty() -> Instrument {
        Instrument {
            symbol: "NIFTY 50".to_string(),
            exchange: "NSE".to_string(),
            token: 256265,
        }
    }

    #[test]
    fn test_session_checksum() {
        assert_eq!(
            session_checksum("kitekey", "req-tok-123", "s3cret"),
            "52908986862eb28b1757b20e0dad24eeb3a78e030ed20c62f80b89d7e2923359"
        );
    }

    #[test]
    fn test_candle_date_strips_time_and_offset() {
        let date = candle_date("2024-01-02T00:00:00+0530").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(candle_date("garbage").is_err());
    }

    #[test]
    fn test_find_instrument_token_exact_match_only() {
        assert_eq!(
            find_instrument_token(INSTRUMENTS_CSV, "NIFTY 50").unwrap(),
            Some(256265)
        );
        assert_eq!(find_instrument_token(INSTRUMENTS_CSV, "NIFTY").unwrap(), None);
    }

    #[tokio::test]
    async fn test_authenticate_sends_checksum() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/session/token")
            .match_header("x-kite-version", "3")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api_key".into(), "kitekey".into()),
                Matcher::UrlEncoded("request_token".into(), "req-tok-123".into()),
                Matcher::UrlEncoded(
                    "checksum".into(),
                    "52908986862eb28b1757b20e0dad24eeb3a78e030ed20c62f80b89d7e2923359".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","data":{"user_id":"AB1234","access_token":"acc-tok","public_token":"pub"}}"#,
            )
            .create_async()
            .await;

        let session = client_for(&server)
            .authenticate(&credentials())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.user_id(), Some("AB1234"));
        assert_eq!(session.access_token, "acc-tok");
    }

    #[tokio::test]
    async fn test_authenticate_rejected_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/session/token")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"error","message":"Token is invalid or has expired.","data":null,"error_type":"TokenException"}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .authenticate(&credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Authentication(_)));
        assert!(err.to_string().contains("invalid or has expired"));
    }

    #[tokio::test]
    async fn test_authenticate_input_exception_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/session/token")
            .with_status(400)
            .with_body(r#"{"status":"error","message":"Invalid checksum","error_type":"InputException"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .authenticate(&credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Authentication(_)));
        assert!(err.to_string().contains("InputException"));
    }

    #[tokio::test]
    async fn test_lookup_instrument() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/instruments/NSE")
            .match_header("authorization", "token kitekey:acc-tok")
            .with_status(200)
            .with_header("content-type", "text/csv")
            .with_body(INSTRUMENTS_CSV)
            .create_async()
            .await;

        let instrument = session_for(&server)
            .lookup_instrument("NSE", "NIFTY 50")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(instrument, nifty());
    }

    #[tokio::test]
    async fn test_lookup_instrument_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/instruments/NSE")
            .with_status(200)
            .with_body(INSTRUMENTS_CSV)
            .create_async()
            .await;

        let err = session_for(&server)
            .lookup_instrument("NSE", "BANKNIFTY")
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::InstrumentNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Instrument token for BANKNIFTY not found on NSE"
        );
    }

    #[tokio::test]
    async fn test_lookup_instrument_expired_session() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/instruments/NSE")
            .with_status(403)
            .with_body(r#"{"status":"error","message":"Incorrect `api_key` or `access_token`.","error_type":"TokenException"}"#)
            .create_async()
            .await;

        let err = session_for(&server)
            .lookup_instrument("NSE", "NIFTY 50")
            .await
            .unwrap_err();

        assert!(matches!(err, AdvisorError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_last_price() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/quote/ltp")
            .match_query(Matcher::UrlEncoded("i".into(), "256265".into()))
            .match_header("authorization", "token kitekey:acc-tok")
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"256265":{"instrument_token":256265,"last_price":21453.95}}}"#,
            )
            .create_async()
            .await;

        let price = session_for(&server).last_price(&nifty()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(price, 21453.95);
    }

    #[tokio::test]
    async fn test_last_price_missing_quote() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/quote/ltp")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{}}"#)
            .create_async()
            .await;

        let err = session_for(&server).last_price(&nifty()).await.unwrap_err();
        assert!(matches!(err, AdvisorError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_historical_candles() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/instruments/historical/256265/day")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("to".into(), "2024-01-31".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"status":"success","data":{"candles":[
                    ["2024-01-01T00:00:00+0530",21727.75,21834.35,21680.7,21741.9,0],
                    ["2024-01-02T00:00:00+0530",21751.35,21755.6,21555.65,21665.8,0]
                ]}}"#,
            )
            .create_async()
            .await;

        let candles = session_for(&server)
            .historical_candles(
                &nifty(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                "day",
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(candles[1].close, 21665.8);
        assert_eq!(candles[1].high, 21755.6);
    }

    #[tokio::test]
    async fn test_historical_candles_broker_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/instruments/historical/256265/day")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"status":"error","message":"invalid from date","error_type":"InputException"}"#)
            .create_async()
            .await;

        let err = session_for(&server)
            .historical_candles(
                &nifty(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                "day",
            )
            .await
            .unwrap_err();

        match err {
            AdvisorError::Broker {
                error_type,
                message,
            } => {
                assert_eq!(error_type, "InputException");
                assert_eq!(message, "invalid from date");
            }
            other => panic!("expected Broker error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/quote/ltp")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let err = session_for(&server).last_price(&nifty()).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 502"));
    }
}
