//! Policy decision type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a policy check. `reason` always names the rule that matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    /// An allowing decision.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    /// A denying decision.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }

    /// Count the decision under `gate` and log it.
    pub(crate) fn record(self, gate: &'static str, subject: &str) -> Self {
        let outcome = if self.allowed { "allowed" } else { "denied" };
        metrics::counter!("synapse_policy_decisions_total", "gate" => gate, "outcome" => outcome)
            .increment(1);
        if self.allowed {
            tracing::info!(gate, subject, reason = %self.reason, "[PolicyAgent] Allowed");
        } else {
            tracing::warn!(gate, subject, reason = %self.reason, "[PolicyAgent] Denied");
        }
        self
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.allowed { "ALLOWED" } else { "BLOCKED" };
        write!(f, "{}: {}", verdict, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_display() {
        let allow = PolicyDecision::allow("Allowed by robots.txt.");
        assert!(allow.allowed);
        assert_eq!(allow.to_string(), "ALLOWED: Allowed by robots.txt.");

        let deny = PolicyDecision::deny("Blocked by robots.txt");
        assert!(!deny.allowed);
        assert_eq!(deny.to_string(), "BLOCKED: Blocked by robots.txt");
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let json = serde_json::to_value(PolicyDecision::deny("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"allowed": false, "reason": "nope"}));
    }
}
