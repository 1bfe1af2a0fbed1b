//! The policy gate.

use moka::future::Cache;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::decision::PolicyDecision;
use super::fetcher::{robots_url_for, HttpRobotsFetcher, RobotsFetcher, RobotsResponse};
use super::robots::RobotsTxt;
use super::ssrf::check_target;
use super::tools::{ToolCall, ToolWhitelist};
use crate::config::PolicyConfig;
use crate::error::Result;

const ROBOTS_CACHE_CAPACITY: u64 = 1_000;

/// Decides whether outbound fetches and tool invocations may proceed.
///
/// Stateless apart from its settings and the optional robots cache, so a
/// single gate can be shared behind an `Arc` and called concurrently.
pub struct PolicyGate {
    user_agent: String,
    whitelist: ToolWhitelist,
    fetcher: Arc<dyn RobotsFetcher>,
    robots_cache: Option<Cache<String, RobotsResponse>>,
}

impl PolicyGate {
    /// Create a gate with an explicit fetcher and no robots cache.
    pub fn new(
        user_agent: impl Into<String>,
        allowed_tools: impl IntoIterator<Item = impl Into<String>>,
        fetcher: Arc<dyn RobotsFetcher>,
    ) -> Self {
        Self {
            user_agent: user_agent.into(),
            whitelist: ToolWhitelist::new(allowed_tools),
            fetcher,
            robots_cache: None,
        }
    }

    /// Build the production gate: HTTP fetcher, optional relay and cache.
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let fetcher = HttpRobotsFetcher::new(&config.user_agent, config.relay_url.clone())?;
        let gate = Self::new(
            config.user_agent.clone(),
            config.allowed_tools.iter().cloned(),
            Arc::new(fetcher),
        );
        Ok(gate.with_robots_cache(Duration::from_secs(config.robots_cache_ttl_secs)))
    }

    /// Cache robots.txt responses per origin for `ttl`. A zero TTL disables it.
    pub fn with_robots_cache(mut self, ttl: Duration) -> Self {
        self.robots_cache = if ttl.is_zero() {
            None
        } else {
            Some(
                Cache::builder()
                    .max_capacity(ROBOTS_CACHE_CAPACITY)
                    .time_to_live(ttl)
                    .build(),
            )
        };
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn allowed_tools(&self) -> &[String] {
        self.whitelist.tools()
    }

    /// Check whether `target_url` may be fetched under robots.txt and the
    /// SSRF guard. Never fails: every error becomes a deny.
    pub async fn can_fetch(&self, target_url: &str) -> PolicyDecision {
        self.evaluate_fetch(target_url)
            .await
            .record("robots", target_url)
    }

    async fn evaluate_fetch(&self, target_url: &str) -> PolicyDecision {
        let url = match Url::parse(target_url) {
            Ok(url) => url,
            Err(e) => return PolicyDecision::deny(format!("Invalid URL format: {}", e)),
        };

        if let Err(violation) = check_target(&url) {
            return PolicyDecision::deny(violation.to_string());
        }

        let robots_url = robots_url_for(&url);
        let response = match self.fetch_robots(&robots_url).await {
            Ok(response) => response,
            Err(e) => return PolicyDecision::deny(format!("Policy check failed: {}", e)),
        };

        if response.status == 404 {
            return PolicyDecision::allow("No robots.txt found (assumed allowed)");
        }
        if !(200..300).contains(&response.status) {
            return PolicyDecision::deny(format!(
                "Could not verify robots.txt (HTTP {})",
                response.status
            ));
        }

        let robots = RobotsTxt::parse(&response.body);
        let verdict = robots.check(&request_path(&url), &self.user_agent);

        if verdict.allowed {
            let mut reason = String::from("Allowed by robots.txt.");
            if let Some(delay) = verdict.crawl_delay {
                reason.push_str(&format!(" (Crawl-delay: {}s)", delay));
            }
            PolicyDecision::allow(reason)
        } else {
            let rule = verdict
                .matched
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            PolicyDecision::deny(format!("Blocked by robots.txt (rule: {})", rule))
        }
    }

    async fn fetch_robots(&self, robots_url: &str) -> Result<RobotsResponse> {
        let Some(cache) = &self.robots_cache else {
            return self.fetcher.fetch(robots_url).await;
        };

        if let Some(cached) = cache.get(robots_url).await {
            debug!(url = robots_url, "[PolicyAgent] robots.txt cache hit");
            return Ok(cached);
        }

        let response = self.fetcher.fetch(robots_url).await?;
        cache
            .insert(robots_url.to_string(), response.clone())
            .await;
        Ok(response)
    }

    /// Check a single tool invocation against the whitelist.
    pub fn validate_tool_call(&self, call: &ToolCall) -> PolicyDecision {
        self.whitelist.check_call(call).record("tool", &call.tool)
    }

    /// Check every tool declared in an MCP configuration document.
    pub async fn validate_mcp_config(&self, config_json: &str) -> PolicyDecision {
        self.whitelist
            .check_config(config_json)
            .record("mcp_config", "config")
    }
}

/// Path plus query, as evaluated against robots rules.
fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
