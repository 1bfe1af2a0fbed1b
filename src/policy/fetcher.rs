//! robots.txt retrieval.

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use super::ssrf::check_target;
use crate::error::{Error, Result};

/// Bytes of a robots.txt body kept for parsing; the rest is dropped.
pub const MAX_ROBOTS_BYTES: usize = 500 * 1024;

const MAX_REDIRECTS: usize = 10;

/// Status and body of a robots.txt fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsResponse {
    pub status: u16,
    pub body: String,
}

impl RobotsResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Fetches a robots.txt URL.
///
/// Any HTTP status is a successful fetch; `Err` is reserved for transport
/// failures.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, robots_url: &str) -> Result<RobotsResponse>;
}

/// `scheme://host[:port]/robots.txt` for a target URL.
pub fn robots_url_for(target: &Url) -> String {
    format!("{}/robots.txt", target.origin().ascii_serialization())
}

/// The URL actually requested when going through a relay prefix.
pub fn relay_request_url(relay_prefix: &str, robots_url: &str) -> String {
    format!("{}{}", relay_prefix, urlencoding::encode(robots_url))
}

/// Follow redirects only to targets the SSRF guard accepts.
fn guarded_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match check_target(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(violation) => attempt.error(violation.to_string()),
        }
    })
}

/// reqwest-backed fetcher, optionally routed through a relay.
///
/// Redirect hops are re-checked by the SSRF guard and bodies are capped at
/// [`MAX_ROBOTS_BYTES`].
pub struct HttpRobotsFetcher {
    http_client: reqwest::Client,
    relay_prefix: Option<String>,
}

impl HttpRobotsFetcher {
    /// Build a fetcher that identifies itself with `user_agent`.
    pub fn new(user_agent: &str, relay_prefix: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(guarded_redirects())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            relay_prefix,
        })
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch(&self, robots_url: &str) -> Result<RobotsResponse> {
        let request_url = match &self.relay_prefix {
            Some(prefix) => relay_request_url(prefix, robots_url),
            None => robots_url.to_string(),
        };
        debug!(url = %request_url, "[PolicyAgent] Fetching robots.txt");

        let mut resp = self
            .http_client
            .get(&request_url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = resp.status().as_u16();

        let mut bytes = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
        {
            let room = MAX_ROBOTS_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                warn!(
                    url = %request_url,
                    limit = MAX_ROBOTS_BYTES,
                    "[PolicyAgent] robots.txt truncated"
                );
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(RobotsResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Query, http::HeaderMap, http::StatusCode, response::Redirect, routing::get,
        Router,
    };
    use std::collections::HashMap;

    #[test]
    fn test_robots_url_keeps_scheme_host_and_port() {
        let url = Url::parse("https://example.com/private/page?x=1").unwrap();
        assert_eq!(robots_url_for(&url), "https://example.com/robots.txt");

        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(robots_url_for(&url), "http://example.com:8080/robots.txt");
    }

    #[test]
    fn test_relay_url_is_percent_encoded() {
        assert_eq!(
            relay_request_url(
                "https://api.allorigins.win/raw?url=",
                "https://example.com/robots.txt"
            ),
            "https://api.allorigins.win/raw?url=https%3A%2F%2Fexample.com%2Frobots.txt"
        );
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_direct_fetch_sends_user_agent() {
        async fn robots(headers: HeaderMap) -> (StatusCode, String) {
            let ua = headers["user-agent"].to_str().unwrap_or_default().to_string();
            (StatusCode::OK, format!("# for {}\nUser-agent: *\nDisallow:\n", ua))
        }
        let base = spawn(Router::new().route("/robots.txt", get(robots))).await;

        let fetcher = HttpRobotsFetcher::new("SynapseBot/1.0", None).unwrap();
        let resp = fetcher.fetch(&format!("{}/robots.txt", base)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("# for SynapseBot/1.0"));
    }

    #[tokio::test]
    async fn test_relay_fetch_passes_target() {
        async fn relay(Query(params): Query<HashMap<String, String>>) -> (StatusCode, String) {
            match params.get("url").map(String::as_str) {
                Some("https://example.com/robots.txt") => {
                    (StatusCode::OK, "User-agent: *\nDisallow: /private\n".into())
                }
                _ => (StatusCode::BAD_REQUEST, String::new()),
            }
        }
        let base = spawn(Router::new().route("/raw", get(relay))).await;

        let fetcher =
            HttpRobotsFetcher::new("SynapseBot/1.0", Some(format!("{}/raw?url=", base))).unwrap();
        let resp = fetcher
            .fetch("https://example.com/robots.txt")
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("Disallow: /private"));
    }

    #[tokio::test]
    async fn test_not_found_is_a_response_not_an_error() {
        let base = spawn(Router::new()).await;
        let fetcher = HttpRobotsFetcher::new("SynapseBot/1.0", None).unwrap();
        let resp = fetcher.fetch(&format!("{}/robots.txt", base)).await.unwrap();
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_redirect_to_blocked_address_is_refused() {
        async fn redirect() -> Redirect {
            Redirect::temporary("http://169.254.169.254/latest/meta-data")
        }
        let base = spawn(Router::new().route("/robots.txt", get(redirect))).await;

        let fetcher = HttpRobotsFetcher::new("SynapseBot/1.0", None).unwrap();
        let err = fetcher
            .fetch(&format!("{}/robots.txt", base))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_truncated() {
        async fn huge() -> String {
            "# filler line for a very large robots file\n".repeat(20_000)
        }
        let base = spawn(Router::new().route("/robots.txt", get(huge))).await;

        let fetcher = HttpRobotsFetcher::new("SynapseBot/1.0", None).unwrap();
        let resp = fetcher.fetch(&format!("{}/robots.txt", base)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), MAX_ROBOTS_BYTES);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpRobotsFetcher::new("SynapseBot/1.0", None).unwrap();
        let err = fetcher
            .fetch(&format!("http://{}/robots.txt", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
