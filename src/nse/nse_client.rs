use super::config;
use super::models::{Instrument, OptionChain, SecurityType};
use crate::utility::timing::Timer;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rand::{seq::SliceRandom, thread_rng};
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

const SLOW_FETCH_MS: u128 = 2_000;
const PREVIEW_CHARS: usize = 200;

/// Where snapshots come from. The engine only depends on this seam.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_option_chain(&self, instrument: Instrument) -> Result<OptionChain>;

    /// Underlying's previous close, needed on expiry day only
    async fn fetch_previous_close(&self, instrument: Instrument) -> Result<f64>;
}

// -----------------------------------------------
// NSE HTTP SOURCE
// -----------------------------------------------

/// Cookie-backed session against nseindia.com. The homepage is hit once
/// before the first API call so the API accepts the session cookies.
pub struct NSEClient {
    http: Client,
    session: OnceCell<()>,
}

impl NSEClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            session: OnceCell::new(),
        })
    }

    async fn open_session(&self) -> Result<()> {
        self.session
            .get_or_try_init(|| async {
                self.http
                    .get(config::NSE_BASE_URL)
                    .header(header::ACCEPT, config::HEADER_ACCEPT_HTML)
                    .send()
                    .await
                    .context("NSE session warm-up failed")?;
                tokio::time::sleep(Duration::from_millis(config::WARMUP_DELAY_MS)).await;
                debug!("NSE session cookies acquired");
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        Ok(())
    }

    async fn attempt(&self, url: &str) -> Result<String> {
        let res = self
            .http
            .get(url)
            .header(header::REFERER, config::HEADER_REFERER)
            .header("X-Requested-With", config::HEADER_X_REQUESTED_WITH)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = res.status();
        debug!("GET {} -> {}", url, status.as_u16());
        let body = res.text().await.context("Response body unreadable")?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!("NSE answered {} for {}, backing off", status, url);
        }
        accept_response(status, body)
    }

    /// GET with exponential backoff. Every failure is retried until the
    /// attempts run out.
    async fn get_json_text(&self, url: &str) -> Result<String> {
        self.open_session().await?;
        let _timer = Timer::start_with_threshold(format!("GET {}", url), SLOW_FETCH_MS);

        let strategy = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        Retry::spawn(strategy, || self.attempt(url)).await
    }
}

#[async_trait]
impl MarketDataSource for NSEClient {
    async fn fetch_option_chain(&self, instrument: Instrument) -> Result<OptionChain> {
        let body = self
            .get_json_text(&config::nse_option_chain_url(instrument))
            .await?;
        serde_json::from_str(&body)
            .with_context(|| format!("Option chain for {} did not decode", instrument))
    }

    async fn fetch_previous_close(&self, instrument: Instrument) -> Result<f64> {
        let body = self
            .get_json_text(&config::nse_previous_close_url(instrument))
            .await?;
        let quote: Value = serde_json::from_str(&body)
            .with_context(|| format!("Quote for {} did not decode", instrument))?;
        parse_previous_close(instrument.security_type(), &quote)
    }
}

/// Success with a JSON-looking body, or an error carrying a body preview.
/// NSE serves an HTML page instead of JSON when the session is rejected.
fn accept_response(status: StatusCode, body: String) -> Result<String> {
    let preview = || body.chars().take(PREVIEW_CHARS).collect::<String>();

    if !status.is_success() {
        bail!("HTTP {}: {}", status, preview());
    }
    if !matches!(body.trim_start().chars().next(), Some('{' | '[')) {
        bail!("Expected JSON, got: {}", preview());
    }
    Ok(body)
}

/// Indices report under `data[0].previousClose`, equities under
/// `priceInfo.previousClose`
pub fn parse_previous_close(security_type: SecurityType, value: &Value) -> Result<f64> {
    let close = match security_type {
        SecurityType::Indices => value.pointer("/data/0/previousClose"),
        SecurityType::Equity => value.pointer("/priceInfo/previousClose"),
    };
    close
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("previousClose missing in quote response"))
}

fn build_http_client() -> Result<Client> {
    let language = config::ACCEPT_LANGUAGES
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or("en-US,en;q=0.9");

    let mut defaults = header::HeaderMap::new();
    defaults.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
    defaults.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_str(language)?);

    Client::builder()
        .user_agent(config::USER_AGENT)
        .default_headers(defaults)
        .cookie_store(true)
        .timeout(config::HTTP_TIMEOUT)
        .build()
        .context("HTTP client construction failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_previous_close() {
        let index = json!({"data": [{"index": "NIFTY 50", "previousClose": 19950.35}]});
        assert_eq!(parse_previous_close(SecurityType::Indices, &index).unwrap(), 19950.35);

        let equity = json!({"priceInfo": {"lastPrice": 3500.0, "previousClose": 3480.5}});
        assert_eq!(parse_previous_close(SecurityType::Equity, &equity).unwrap(), 3480.5);

        assert!(parse_previous_close(SecurityType::Equity, &index).is_err());
        assert!(parse_previous_close(SecurityType::Indices, &json!({"data": []})).is_err());
    }

    #[test]
    fn test_accept_response() {
        let ok = accept_response(StatusCode::OK, " {\"records\":{}}".to_string()).unwrap();
        assert!(ok.contains("records"));

        let html = accept_response(StatusCode::OK, "<html>Access Denied</html>".to_string());
        assert!(html.unwrap_err().to_string().contains("Access Denied"));

        let throttled = accept_response(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(throttled.unwrap_err().to_string().starts_with("HTTP 429"));
    }
}
