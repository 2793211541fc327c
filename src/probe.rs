use crate::error::Result;
use crate::traits::{ProbeOutcome, Prober};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::{redirect, Client};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

// DynamoDB 端点不能追加查询参数, 否则请求会被拒绝
const PASSTHROUGH_PATTERN: &str = r"^https?://dynamodb\.";

/// Times one GET per call against a region's probe URL.
pub struct HttpProber {
    client: Client,
    timeout: Duration,
    passthrough: Regex,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        // Redirects would add a second round trip to the measurement
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            timeout,
            passthrough: Regex::new(PASSTHROUGH_PATTERN)?,
        })
    }

    /// Append a cache-busting timestamp, except for hosts that reject extra query params.
    pub fn probe_url(&self, url: &str, stamp: u128) -> String {
        if self.passthrough.is_match(url) {
            return url.to_string();
        }
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, sep, stamp)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let target = self.probe_url(url, stamp);

        let start = Instant::now();
        let outcome = match self.client.get(&target).send().await {
            // 不关心状态码: 只要有响应就说明可达
            Ok(_) => ProbeOutcome::Reached(start.elapsed().as_millis() as u64),
            Err(e) if e.is_timeout() => {
                ProbeOutcome::TimedOut(start.elapsed().as_millis() as u64)
            }
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        };

        debug!(url = %target, ?outcome, timeout_ms = self.timeout.as_millis() as u64, "probe finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Test helper: answers every connection with `status` after `delay`.
    async fn start_test_server(status: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}/ping", addr)
    }

    #[test]
    fn test_probe_url_cache_busting() {
        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        assert_eq!(
            prober.probe_url("https://storage.googleapis.com/x/ping.png", 42),
            "https://storage.googleapis.com/x/ping.png?42"
        );
        assert_eq!(
            prober.probe_url("https://example.com/ping?region=eu", 42),
            "https://example.com/ping?region=eu&42"
        );
    }

    #[test]
    fn test_probe_url_dynamodb_passthrough() {
        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        let url = "http://dynamodb.us-east-1.amazonaws.com/ping";
        assert_eq!(prober.probe_url(url, 42), url);
        let url = "https://dynamodb.eu-west-1.amazonaws.com/ping";
        assert_eq!(prober.probe_url(url, 42), url);
    }

    #[tokio::test]
    async fn test_probe_reached_regardless_of_status() {
        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();

        let ok = start_test_server("200 OK", Duration::ZERO).await;
        assert!(matches!(prober.probe(&ok).await, ProbeOutcome::Reached(_)));

        let missing = start_test_server("404 Not Found", Duration::ZERO).await;
        assert!(matches!(
            prober.probe(&missing).await,
            ProbeOutcome::Reached(_)
        ));
    }

    #[tokio::test]
    async fn test_probe_measures_elapsed() {
        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        let slow = start_test_server("200 OK", Duration::from_millis(150)).await;
        match prober.probe(&slow).await {
            ProbeOutcome::Reached(ms) => assert!(ms >= 150, "elapsed {}ms", ms),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let prober = HttpProber::new(Duration::from_millis(100)).unwrap();
        let hanging = start_test_server("200 OK", Duration::from_secs(5)).await;
        match prober.probe(&hanging).await {
            ProbeOutcome::TimedOut(ms) => assert!(ms >= 100),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        let outcome = prober.probe(&format!("http://{}/ping", addr)).await;
        assert!(matches!(outcome, ProbeOutcome::Failed(_)));
    }
}
