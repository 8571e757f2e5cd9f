//! fast.com speed test client.
//!
//! Asks the fast.com API for a set of download targets, then downloads from
//! all of them concurrently for a bounded window and reports the aggregate
//! rate. Only download throughput is measured.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;
use url::Url;

use crate::probe::ProbeError;

/// fast.com target discovery endpoint.
pub const DEFAULT_API_URL: &str = "https://api.fast.com/netflix/speedtest";

/// Number of download targets requested per test.
pub const DEFAULT_URL_COUNT: u8 = 5;

/// Longest time spent downloading per test.
pub const DEFAULT_DOWNLOAD_WINDOW: Duration = Duration::from_secs(5);

/// A download speed measurement service.
#[async_trait::async_trait]
pub trait SpeedTest: Send + Sync + 'static {
    /// Measure download throughput in bytes per second.
    async fn download_bytes_per_sec(&self, token: &str) -> Result<f64, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct Target {
    url: String,
}

/// Speed test backed by the fast.com API.
#[derive(Debug, Clone)]
pub struct FastComClient {
    client: Client,
    api_url: Url,
    url_count: u8,
    window: Duration,
}

impl FastComClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns `ProbeError::Config` if the API URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(api_url: &str, url_count: u8, window: Duration) -> Result<Self, ProbeError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| ProbeError::Config(format!("invalid speed test URL '{api_url}': {e}")))?;

        // Target discovery plus the whole download window must fit in one request.
        let client = Client::builder()
            .timeout(window + Duration::from_secs(10))
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            url_count: url_count.max(1),
            window,
        })
    }

    async fn targets(&self, token: &str) -> Result<Vec<String>, ProbeError> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("https", "true")
            .append_pair("token", token)
            .append_pair("urlCount", &self.url_count.to_string());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Network(format!(
                "speed test API returned status {status}"
            )));
        }

        let targets: Vec<Target> = response
            .json()
            .await
            .map_err(|e| ProbeError::Parse(format!("invalid speed test API response: {e}")))?;

        if targets.is_empty() {
            return Err(ProbeError::Parse("speed test API returned no targets".to_string()));
        }
        Ok(targets.into_iter().map(|t| t.url).collect())
    }
}

/// Stream one target until it ends or the task is aborted, counting bytes.
async fn drain(client: Client, url: String, received: Arc<AtomicU64>) -> Result<(), ProbeError> {
    let mut response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ProbeError::Network(e.without_url().to_string()))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ProbeError::Network(e.without_url().to_string()))?
    {
        received.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
    Ok(())
}

#[async_trait::async_trait]
impl SpeedTest for FastComClient {
    async fn download_bytes_per_sec(&self, token: &str) -> Result<f64, ProbeError> {
        let targets = self.targets(token).await?;
        let received = Arc::new(AtomicU64::new(0));

        let start = Instant::now();
        let mut downloads = JoinSet::new();
        for url in targets {
            downloads.spawn(drain(self.client.clone(), url, Arc::clone(&received)));
        }

        let mut last_error = None;
        let window_result = tokio::time::timeout(self.window, async {
            while let Some(joined) = downloads.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => last_error = Some(e),
                    Err(e) => last_error = Some(ProbeError::Network(e.to_string())),
                }
            }
        })
        .await;
        if window_result.is_err() {
            downloads.abort_all();
        }

        let elapsed = start.elapsed().as_secs_f64();
        let bytes = received.load(Ordering::Relaxed);
        if bytes == 0 {
            return Err(last_error
                .unwrap_or_else(|| ProbeError::Network("no data received".to_string())));
        }

        let rate = bytes as f64 / elapsed.max(f64::EPSILON);
        tracing::debug!(bytes, elapsed_s = elapsed, bytes_per_sec = rate, "Speed test finished");
        Ok(rate)
    }
}
