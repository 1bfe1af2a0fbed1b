//! robots.txt parsing and evaluation.
//!
//! Supports `User-agent`, `Allow`, `Disallow`, `Crawl-delay` and `Sitemap`,
//! `#` comments, grouped user-agent lines, and the `*` / `$` path
//! wildcards.
//!
//! Group selection: the group whose agent token equals our product token
//! (case-insensitive) wins, then the `*` group. Groups naming the same
//! agent are merged. Within the chosen rules the longest matching pattern
//! wins, and `Allow` wins a tie.
//!
//! Patterns and request paths are compared in normalized percent-encoding:
//! non-ASCII bytes are escaped and existing escapes are uppercased.

use std::fmt;

/// Directive kind of a path rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Disallow,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Allow => write!(f, "Allow"),
            RuleKind::Disallow => write!(f, "Disallow"),
        }
    }
}

/// A single `Allow`/`Disallow` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub pattern: String,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.pattern)
    }
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        pattern_matches(&self.pattern, path)
    }
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// The verdict for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    /// Rule that decided the outcome; `None` means nothing matched.
    pub matched: Option<Rule>,
    /// `Crawl-delay` of the selected group, in seconds.
    pub crawl_delay: Option<f64>,
}

/// A parsed robots.txt file.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

/// Product token of a user agent: `SynapseBot/1.0` -> `synapsebot`.
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl RobotsTxt {
    /// Parse a robots.txt body. Unknown lines are ignored.
    pub fn parse(body: &str) -> Self {
        let mut robots = RobotsTxt::default();
        let mut current: Option<Group> = None;
        // A user-agent line after a rule line starts a new group.
        let mut in_agent_lines = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_lines {
                        if let Some(group) = current.take() {
                            robots.groups.push(group);
                        }
                        current = Some(Group::default());
                        in_agent_lines = true;
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(product_token(value));
                    }
                }
                "allow" | "disallow" => {
                    in_agent_lines = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    // An empty pattern matches nothing.
                    if value.is_empty() {
                        continue;
                    }
                    let kind = if key == "allow" {
                        RuleKind::Allow
                    } else {
                        RuleKind::Disallow
                    };
                    group.rules.push(Rule {
                        kind,
                        pattern: normalize_encoding(value),
                    });
                }
                "crawl-delay" => {
                    in_agent_lines = false;
                    if let Some(group) = current.as_mut() {
                        group.crawl_delay = value.parse::<f64>().ok().filter(|d| *d >= 0.0);
                    }
                }
                "sitemap" => robots.sitemaps.push(value.to_string()),
                _ => {}
            }
        }

        if let Some(group) = current {
            robots.groups.push(group);
        }
        robots
    }

    /// `Sitemap` URLs listed anywhere in the file.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Groups that apply to `user_agent`.
    fn groups_for(&self, user_agent: &str) -> Vec<&Group> {
        let token = product_token(user_agent);

        let named = !token.is_empty()
            && self
                .groups
                .iter()
                .any(|g| g.agents.iter().any(|a| *a == token));
        let wanted = if named { token.as_str() } else { "*" };

        self.groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a == wanted))
            .collect()
    }

    /// Crawl delay for `user_agent`, in seconds.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.groups_for(user_agent)
            .into_iter()
            .find_map(|g| g.crawl_delay)
    }

    /// Evaluate `path` (path plus optional query) for `user_agent`.
    pub fn check(&self, path: &str, user_agent: &str) -> Verdict {
        let groups = self.groups_for(user_agent);
        let crawl_delay = groups.iter().find_map(|g| g.crawl_delay);

        let path = normalize_encoding(path);
        if path == "/robots.txt" {
            return Verdict {
                allowed: true,
                matched: None,
                crawl_delay,
            };
        }

        let mut best: Option<&Rule> = None;
        for rule in groups.iter().flat_map(|g| g.rules.iter()) {
            if !rule.matches(&path) {
                continue;
            }
            best = match best {
                None => Some(rule),
                Some(current) => {
                    let longer = rule.pattern.len() > current.pattern.len();
                    let tie_allow = rule.pattern.len() == current.pattern.len()
                        && rule.kind == RuleKind::Allow;
                    if longer || tie_allow {
                        Some(rule)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        Verdict {
            allowed: best.map_or(true, |r| r.kind == RuleKind::Allow),
            matched: best.cloned(),
            crawl_delay,
        }
    }

    /// Shorthand for `check(path, user_agent).allowed`.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        self.check(path, user_agent).allowed
    }
}

/// Percent-encode non-ASCII, space and control bytes, and uppercase the
/// hex digits of existing `%xx` escapes.
///
/// `/café` and `/caf%c3%a9` both become `/caf%C3%A9`.
pub fn normalize_encoding(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push('%');
            out.push(bytes[i + 1].to_ascii_uppercase() as char);
            out.push(bytes[i + 2].to_ascii_uppercase() as char);
            i += 3;
            continue;
        }
        if b <= b' ' || b >= 0x7f {
            out.push_str(&format!("%{:02X}", b));
        } else {
            out.push(b as char);
        }
        i += 1;
    }
    out
}

/// Match a robots.txt path pattern against a path.
///
/// Patterns are prefix matches; `*` matches any run of characters and a
/// trailing `$` anchors the end.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let pieces: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match pieces.split_first() {
        Some(split) => split,
        None => return true,
    };

    let Some(mut remaining) = path.strip_prefix(first) else {
        return false;
    };
    if rest.is_empty() {
        return !anchored || remaining.is_empty();
    }

    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };
    for piece in middle {
        match remaining.find(piece) {
            Some(idx) => remaining = &remaining[idx + piece.len()..],
            None => return false,
        }
    }

    if anchored {
        remaining.ends_with(last)
    } else {
        remaining.contains(last)
    }
}
