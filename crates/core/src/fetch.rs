//! Feed fetch capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::config::FetchConfig;
use crate::feed::{parse_feed, RawFeed};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Feed returned HTTP {0}")]
    Status(u16),

    #[error("Rate limited by source")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether another attempt may succeed. Throttled sources are not retried.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FetchError::RateLimited)
    }
}

/// Fetches and parses a source's feed document.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError>;
}

/// reqwest-backed fetcher.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        parse_feed(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/rss.xml")
    }

    #[tokio::test]
    async fn test_http_429_maps_to_rate_limited() {
        let url = serve_once("429 Too Many Requests", "slow down").await;
        let fetcher = HttpFeedFetcher::new(&FetchConfig::default()).unwrap();

        let result = fetcher.fetch(&url).await;

        assert_eq!(result.unwrap_err(), FetchError::RateLimited);
    }

    #[tokio::test]
    async fn test_http_503_maps_to_status() {
        let url = serve_once("503 Service Unavailable", "down").await;
        let fetcher = HttpFeedFetcher::new(&FetchConfig::default()).unwrap();

        let error = fetcher.fetch(&url).await.unwrap_err();

        assert_eq!(error, FetchError::Status(503));
        assert!(error.is_retriable());
    }

    #[tokio::test]
    async fn test_http_200_parses_body() {
        let url = serve_once(
            "200 OK",
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title>\
             <item><title>Episode 01</title><link>https://acg.test/t/1</link>\
             <pubDate>Mon, 24 Apr 2023 03:15:00 +0000</pubDate></item></channel></rss>",
        )
        .await;
        let fetcher = HttpFeedFetcher::new(&FetchConfig::default()).unwrap();

        let feed = fetcher.fetch(&url).await.unwrap();

        assert_eq!(feed.entries.len(), 1);
    }

    #[test]
    fn test_rate_limited_is_not_retriable() {
        assert!(!FetchError::RateLimited.is_retriable());
        assert!(FetchError::Status(503).is_retriable());
        assert!(FetchError::Status(404).is_retriable());
        assert!(FetchError::Timeout.is_retriable());
        assert!(FetchError::Parse("bad".into()).is_retriable());
    }

    #[test]
    fn test_new_with_default_config() {
        assert!(HttpFeedFetcher::new(&FetchConfig::default()).is_ok());
    }
}
