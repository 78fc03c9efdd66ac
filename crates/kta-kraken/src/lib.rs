//! kta-kraken
//!
//! Kraken API access for the trade analyzer. This crate owns everything that
//! talks to the venue and nothing that does accounting:
//! - credentials from the environment (query-only key; never logged)
//! - signed private calls with rate-limit backoff
//! - paginated `TradesHistory` retrieval, surfaced as plain [`TradeRecord`]s
//! - current prices from the public `Ticker` endpoint
//!
//! Callers run the fetches to completion and hand already-resolved data to
//! the `kta-ledger` core; no IO happens past this boundary.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use kta_ledger::num::{parse_decimal, safe_div};
use kta_ledger::TradeRecord;

mod sign;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API credentials for private endpoints.
///
/// Use a key with query-only permissions. The secret is kept out of `Debug`
/// and must never reach a log line.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    /// Base64-encoded API secret as issued by the venue.
    pub secret: String,
}

impl Credentials {
    /// Read `KRAKEN_KEY` / `KRAKEN_SECRET` from the environment.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("KRAKEN_KEY").ok()?;
        let secret = std::env::var("KRAKEN_SECRET").ok()?;
        if api_key.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self { api_key, secret })
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Pacing and rate-limit backoff knobs for one client.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum backoff attempts per call before the last error is returned.
    pub max_retries: u32,
    /// Starting backoff, doubled on every attempt.
    pub base_backoff: Duration,
    /// Fractional +/- jitter applied to each backoff sleep.
    pub jitter: f64,
    /// Pause between history pages; private endpoints are stricter than
    /// public ones.
    pub page_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_backoff: Duration::from_millis(800),
            jitter: 0.35,
            page_pause: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// No pauses, a single retry. For tests against mock servers.
    pub fn immediate() -> Self {
        Self {
            max_retries: 1,
            base_backoff: Duration::ZERO,
            jitter: 0.0,
            page_pause: Duration::ZERO,
        }
    }
}

/// Kraken reports application errors as a string array; rate-limit
/// responses look like `EAPI:Rate limit exceeded`.
fn is_rate_limited(errors: &[String]) -> bool {
    if errors.is_empty() {
        return false;
    }
    let joined = errors.join(" ").to_lowercase();
    joined.contains("rate limit") || joined.contains("exceeded")
}

fn backoff_delay(policy: &RetryPolicy, tries: u32) -> Duration {
    if policy.base_backoff.is_zero() {
        return Duration::ZERO;
    }
    let exp = policy.base_backoff.as_secs_f64() * 2f64.powi(tries as i32);
    let jitter = if policy.jitter > 0.0 {
        rand::thread_rng().gen_range(-policy.jitter..=policy.jitter)
    } else {
        0.0
    };
    Duration::from_secs_f64((exp * (1.0 + jitter)).max(0.2))
}

// ---------------------------------------------------------------------------
// Source traits
// ---------------------------------------------------------------------------

/// How valuation prices are read off the ticker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceMode {
    /// Last traded price.
    Last,
    /// Midpoint of best bid and ask.
    Mid,
}

/// Supplier of the full trade history, oldest record first.
#[async_trait]
pub trait TradeSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_all_trades(&self) -> Result<Vec<TradeRecord>>;
}

/// Supplier of current prices keyed by raw instrument identifier. Absent
/// entries mean "no price available", not zero.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_prices(
        &self,
        pair_ids: &[String],
        mode: PriceMode,
    ) -> Result<BTreeMap<String, Decimal>>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Every Kraken response wraps its payload in `{ "error": [...], "result": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

fn zero_string() -> String {
    "0".to_string()
}

/// One trade as returned by `TradesHistory`. Numerics stay decimal strings
/// so the accounting core parses them without a float in between; absent
/// fields default to zero the way the venue's own exports treat them.
#[derive(Clone, Debug, Deserialize)]
struct RawTrade {
    #[serde(default)]
    pair: String,
    #[serde(rename = "type", default)]
    side: String,
    #[serde(default = "zero_string")]
    vol: String,
    #[serde(default = "zero_string")]
    price: String,
    #[serde(default)]
    cost: Option<String>,
    #[serde(default = "zero_string")]
    fee: String,
    /// Epoch seconds, fractional.
    #[serde(default)]
    time: f64,
}

#[derive(Debug, Default, Deserialize)]
struct TradesHistoryResult {
    #[serde(default)]
    trades: BTreeMap<String, RawTrade>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    /// Ask: [price, whole-lot volume, lot volume].
    #[serde(default)]
    a: Vec<String>,
    /// Bid: same layout.
    #[serde(default)]
    b: Vec<String>,
    /// Last trade closed: [price, lot volume].
    #[serde(default)]
    c: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Kraken REST client.
///
/// The base URL is injected so tests can point the client at a mock server.
#[derive(Clone)]
pub struct KrakenClient {
    creds: Credentials,
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl KrakenClient {
    pub fn new(creds: Credentials) -> Self {
        Self::with_base_url(creds, "https://api.kraken.com".to_string())
    }

    pub fn with_base_url(creds: Credentials, base_url: String) -> Self {
        Self {
            creds,
            http: reqwest::Client::new(),
            base_url,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Signed POST to a private endpoint, with rate-limit backoff.
    ///
    /// Transport and decode failures are returned immediately; only
    /// rate-limit responses are retried. After the retry budget the last
    /// envelope is returned and the caller inspects its `error` array.
    async fn private_call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Envelope<T>> {
        let path = format!("/0/private/{endpoint}");
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let mut tries = 0u32;
        loop {
            // The nonce signs the body, so both are rebuilt per attempt.
            let nonce = Utc::now().timestamp_millis().to_string();
            let mut postdata = format!("nonce={nonce}");
            for (key, value) in params {
                postdata.push_str(&format!("&{key}={value}"));
            }
            let signature = sign::sign_request(&path, &nonce, &postdata, &self.creds.secret)?;

            let resp = self
                .http
                .post(&url)
                .header("API-Key", &self.creds.api_key)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .header("API-Sign", signature)
                .body(postdata)
                .send()
                .await
                .with_context(|| format!("{endpoint} request failed"))?;

            let envelope: Envelope<T> = resp
                .json()
                .await
                .with_context(|| format!("{endpoint} response decode failed"))?;

            if !is_rate_limited(&envelope.error) || tries >= self.policy.max_retries {
                return Ok(envelope);
            }

            let delay = backoff_delay(&self.policy, tries);
            debug!(endpoint, tries, ?delay, "rate limited, backing off");
            tokio::time::sleep(delay).await;
            tries += 1;
        }
    }
}

#[async_trait]
impl TradeSource for KrakenClient {
    fn source_name(&self) -> &'static str {
        "kraken"
    }

    /// Page through `TradesHistory` by offset until the reported count is
    /// reached, then return the trades oldest-first.
    async fn fetch_all_trades(&self) -> Result<Vec<TradeRecord>> {
        let mut collected: Vec<(String, RawTrade)> = Vec::new();
        let mut offset = 0u64;
        loop {
            let envelope: Envelope<TradesHistoryResult> = self
                .private_call("TradesHistory", &[("ofs", offset.to_string())])
                .await?;
            if !envelope.error.is_empty() {
                bail!("TradesHistory error: {}", envelope.error.join(", "));
            }
            let result = envelope.result.unwrap_or_default();
            let page_len = result.trades.len() as u64;
            collected.extend(result.trades);
            offset += page_len;
            if page_len == 0 || offset >= result.count {
                break;
            }
            tokio::time::sleep(self.policy.page_pause).await;
        }

        // Pages arrive newest-first; the ledger fold needs buys ahead of the
        // sells they cover, so order by trade time (tx id as tie-break).
        collected.sort_by(|a, b| a.1.time.total_cmp(&b.1.time).then_with(|| a.0.cmp(&b.0)));

        Ok(collected
            .into_iter()
            .map(|(_, t)| TradeRecord {
                pair: t.pair,
                side: t.side,
                volume: t.vol,
                price: t.price,
                cost: t.cost,
                fee: t.fee,
                time: t.time,
            })
            .collect())
    }
}

#[async_trait]
impl PriceSource for KrakenClient {
    /// Fetch current prices for the given raw pair identifiers.
    ///
    /// Ticker failures degrade to an empty map (the report then values
    /// without prices) rather than failing the run; entries that do not
    /// parse are simply absent.
    async fn fetch_prices(
        &self,
        pair_ids: &[String],
        mode: PriceMode,
    ) -> Result<BTreeMap<String, Decimal>> {
        let mut ids: Vec<&str> = pair_ids
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let url = format!("{}/0/public/Ticker", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("pair", ids.join(","))])
            .send()
            .await
            .context("Ticker request failed")?;
        let envelope: Envelope<BTreeMap<String, TickerEntry>> =
            resp.json().await.context("Ticker response decode failed")?;

        if !envelope.error.is_empty() {
            warn!(errors = ?envelope.error, "Ticker returned errors; valuing without prices");
            return Ok(BTreeMap::new());
        }

        let mut prices = BTreeMap::new();
        for (pair_id, entry) in envelope.result.unwrap_or_default() {
            let price = match mode {
                PriceMode::Last => entry.c.first().and_then(|s| parse_decimal(s)),
                PriceMode::Mid => {
                    let bid = entry.b.first().and_then(|s| parse_decimal(s));
                    let ask = entry.a.first().and_then(|s| parse_decimal(s));
                    match (bid, ask) {
                        (Some(bid), Some(ask)) => Some(safe_div(bid + ask, Decimal::TWO)),
                        _ => None,
                    }
                }
            };
            if let Some(price) = price {
                prices.insert(pair_id, price);
            }
        }
        Ok(prices)
    }
}

// ---------------------------------------------------------------------------
// Tests (mock server, no network)
// ---------------------------------------------------------------------------
