//! Policy gate.
//!
//! Compliance checks run before the agent touches the outside world:
//! - robots.txt compliance for outbound fetches, behind an SSRF guard
//! - a fixed whitelist for tool invocations and MCP configurations
//!
//! Every check returns a [`PolicyDecision`]; failures never surface as
//! errors, they become deny decisions with the failure in the reason.
//!
//! # Example
//!
//! ```ignore
//! let gate = PolicyGate::from_config(&PolicyConfig::default())?;
//! let decision = gate.can_fetch("https://example.com/private/page").await;
//! if !decision.allowed {
//!     println!("{}", decision);
//! }
//! ```

mod decision;
mod fetcher;
mod gate;
mod robots;
mod ssrf;
mod tools;

pub use decision::PolicyDecision;
pub use fetcher::{
    relay_request_url, robots_url_for, HttpRobotsFetcher, RobotsFetcher, RobotsResponse,
    MAX_ROBOTS_BYTES,
};
pub use gate::PolicyGate;
pub use robots::{normalize_encoding, pattern_matches, RobotsTxt, Rule, RuleKind, Verdict};
pub use ssrf::{blocked_v4_range, check_target, SsrfViolation};
pub use tools::{is_safe_tool_name, ToolCall, ToolWhitelist};

/// User agent used for robots.txt matching and outbound requests.
pub const DEFAULT_USER_AGENT: &str = "SynapseBot/1.0";

/// Tools permitted by default.
pub const DEFAULT_ALLOWED_TOOLS: [&str; 4] =
    ["googleSearch", "codeExecution", "calculator", "clock"];
