//! CoinGecko market metadata source.
//!
//! Fills `market_cap`, `market_cap_rank`, `name` and `logo_url` from
//! `/api/v3/coins/markets`, paginating `pages` × `per_page` coins ordered by
//! market cap. A failure after the first page keeps the pages already read.
//!
//! The source runs its pages against its own deadline, which ends shortly
//! before the per-source timeout the coordinator applies. A slow later page
//! therefore ends the loop with the earlier pages intact instead of having
//! the whole fetch dropped.

pub mod json_parser;

use std::time::Duration;

use ahash::AHashSet;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use coinagg_core::config::SourceConfig;
use coinagg_core::{AggError, SymbolUniverse};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{SourceBatch, UpstreamSource};

pub const COINGECKO_REST_URL: &str = "https://api.coingecko.com";
const MARKETS_PATH: &str = "/api/v3/coins/markets";
const MAX_PER_PAGE: u32 = 250;

/// Market-cap / logo source.
pub struct CoinGeckoSource {
    name: String,
    http: reqwest::Client,
    base_url: String,
    vs_currency: String,
    per_page: u32,
    pages: u32,
    api_key: Option<String>,
    /// Time allowed for all pages of one fetch.
    budget: Duration,
}

impl CoinGeckoSource {
    /// Create from a [`SourceConfig`], applying CoinGecko defaults.
    /// `timeout` is the per-source deadline; pagination stops at 90% of it.
    pub fn from_config(cfg: &SourceConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            name: cfg.name.clone(),
            http,
            base_url: cfg.base_url.clone().unwrap_or_else(|| COINGECKO_REST_URL.into()),
            vs_currency: cfg.vs_currency.clone().unwrap_or_else(|| "usd".into()),
            per_page: cfg.per_page.unwrap_or(MAX_PER_PAGE).clamp(1, MAX_PER_PAGE),
            pages: cfg.pages.unwrap_or(1).max(1),
            api_key: cfg.api_key.clone(),
            budget: timeout * 9 / 10,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, MARKETS_PATH);
        let mut req = self.http.get(&url).query(&[
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
            ("sparkline", "false".to_string()),
        ]);
        if let Some(ref key) = self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let body = req
            .send()
            .await
            .with_context(|| format!("markets page {page} request failed"))?
            .error_for_status()
            .with_context(|| format!("markets page {page} HTTP error"))?
            .json()
            .await
            .with_context(|| format!("markets page {page} body is not JSON"))?;
        Ok(body)
    }

    /// Fetch one page, failing once `deadline` has passed.
    async fn fetch_page_until(&self, page: u32, deadline: Instant) -> Result<serde_json::Value> {
        match tokio::time::timeout_at(deadline, self.fetch_page(page)).await {
            Ok(result) => result,
            Err(_) => {
                Err(anyhow!("markets page {page} exceeded the {:?} fetch budget", self.budget))
            }
        }
    }

    async fn fetch_markets(&self, universe: &SymbolUniverse) -> Result<SourceBatch> {
        let deadline = Instant::now() + self.budget;
        let mut batch = SourceBatch::new();
        let mut seen = AHashSet::new();
        let mut parsed = 0usize;

        for page in 1..=self.pages {
            let result = match self.fetch_page_until(page, deadline).await {
                Ok(body) => {
                    json_parser::parse_markets_page(&body, universe, &mut seen, &mut batch)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(stats) => {
                    parsed += stats.parsed;
                    // A short page is the last one.
                    if stats.items < self.per_page as usize {
                        break;
                    }
                }
                Err(e) if parsed > 0 => {
                    warn!(
                        "[{}] page {page} failed, keeping {} record(s): {e:#}",
                        self.name,
                        batch.len()
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if parsed == 0 {
            return Err(anyhow!("no coin could be parsed"));
        }
        debug!("[{}] {} coin(s) in universe", self.name, batch.len());
        Ok(batch)
    }
}

#[async_trait]
impl UpstreamSource for CoinGeckoSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, universe: &SymbolUniverse) -> Result<SourceBatch, AggError> {
        self.fetch_markets(universe)
            .await
            .map_err(|e| AggError::source_failed(&self.name, format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::cache::RefreshPolicy;
    use crate::coordinator::RefreshCoordinator;
    use crate::merger::Merger;

    const ONE_COIN: &str = r#"[{"id":"bitcoin","symbol":"btc","name":"Bitcoin",
        "image":"btc.png","market_cap":1.2e12,"market_cap_rank":1}]"#;

    /// Page number from a request head such as `GET /...&per_page=1&page=2&...`.
    fn page_of(head: &str) -> u32 {
        head.split("&page=")
            .nth(1)
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    /// Local HTTP server; `respond(page)` gives (delay, status, body).
    async fn serve<F>(respond: F) -> String
    where
        F: Fn(u32) -> (Duration, u16, &'static str) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut len = 0;
                    while !buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut buf[len..]).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => len += n,
                        }
                    }
                    let head = String::from_utf8_lossy(&buf[..len]).to_string();
                    let (delay, status, body) = (*respond)(page_of(&head));
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    fn two_page_source(base_url: String, timeout: Duration) -> CoinGeckoSource {
        let mut cfg = SourceConfig::new("cg", "coingecko_markets");
        cfg.base_url = Some(base_url);
        cfg.per_page = Some(1);
        cfg.pages = Some(2);
        CoinGeckoSource::from_config(&cfg, timeout).unwrap()
    }

    #[test]
    fn config_defaults_and_clamping() {
        let mut cfg = SourceConfig::new("cg", "coingecko_markets");
        let src = CoinGeckoSource::from_config(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(src.per_page, 250);
        assert_eq!(src.pages, 1);
        assert_eq!(src.vs_currency, "usd");
        assert_eq!(src.base_url, COINGECKO_REST_URL);
        assert_eq!(src.budget, Duration::from_millis(900));

        cfg.per_page = Some(1000);
        cfg.pages = Some(0);
        let src = CoinGeckoSource::from_config(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(src.per_page, 250);
        assert_eq!(src.pages, 1);
    }

    #[test]
    fn page_number_is_read_from_query() {
        let head = "GET /api/v3/coins/markets?vs_currency=usd&per_page=1&page=2&x=1 HTTP/1.1";
        assert_eq!(page_of(head), 2);
        assert_eq!(page_of("GET / HTTP/1.1"), 0);
    }

    #[tokio::test]
    async fn failed_later_page_keeps_earlier_pages() {
        let base = serve(|page| match page {
            1 => (Duration::ZERO, 200, ONE_COIN),
            _ => (Duration::ZERO, 500, r#"{"error":"boom"}"#),
        })
        .await;
        let src = two_page_source(base, Duration::from_secs(5));

        let batch = src.fetch(&SymbolUniverse::default()).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch["BTCUSDT"].market_cap, Some(1.2e12));
        assert_eq!(batch["BTCUSDT"].logo_url.as_deref(), Some("btc.png"));
    }

    #[tokio::test]
    async fn slow_later_page_keeps_earlier_pages_within_source_timeout() {
        let base = serve(|page| match page {
            1 => (Duration::ZERO, 200, ONE_COIN),
            _ => (Duration::from_secs(5), 200, "[]"),
        })
        .await;
        let policy = RefreshPolicy {
            source_timeout: Duration::from_millis(1_000),
            ..Default::default()
        };
        let src: Arc<dyn UpstreamSource> = Arc::new(two_page_source(base, policy.source_timeout));
        let coord = RefreshCoordinator::new(
            vec![src],
            Merger::new(vec!["cg".into()]),
            SymbolUniverse::default(),
            &policy,
        );

        let snap = coord.run_cycle(1).await;
        assert_eq!(snap.source_status["cg"], coinagg_core::SourceStatus::Ok);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("BTCUSDT").unwrap().market_cap(), Some(1.2e12));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_source_error() {
        let mut cfg = SourceConfig::new("cg", "coingecko_markets");
        cfg.base_url = Some("http://127.0.0.1:9".into());
        let src = CoinGeckoSource::from_config(&cfg, Duration::from_millis(200)).unwrap();
        let err = src.fetch(&SymbolUniverse::default()).await.unwrap_err();
        assert!(matches!(err, AggError::Source { ref source_name, .. } if source_name == "cg"));
    }
}
