//! Ordered whitelist table and its line-oriented parser.
//!
//! # File Grammar
//!
//! ```text
//! # comment line, ignored
//! <pattern>                  allow the request unchanged
//! <pattern>\t<target>        rewrite the request to <target>
//! ```
//!
//! Fields are separated by any run of whitespace. Lines with zero or more
//! than two fields are dropped, as are patterns that fail to compile as a
//! glob. Parsing never fails as a whole.
//!
//! An IPv6 literal host such as `http://[::1]:80` matches literally; any
//! other `[...]` in a pattern is a character class.

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};

use super::error::ConfigError;

/// A single whitelist line.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pattern: String,
    target: String,
    matcher: GlobMatcher,
}

impl RuleEntry {
    /// Compile a rule from its pattern and target.
    ///
    /// Matching is case-insensitive and covers the whole canonical key;
    /// `*` also crosses `/` and `:`.
    pub fn new(pattern: &str, target: &str) -> Result<Self, ConfigError> {
        let matcher = GlobBuilder::new(&escape_ipv6_host(pattern))
            .case_insensitive(true)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.kind().to_string(),
            })?
            .compile_matcher();

        Ok(Self {
            pattern: pattern.to_string(),
            target: target.to_string(),
            matcher,
        })
    }

    /// Rule that allows whatever `pattern` matches, unchanged.
    pub fn allow(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(pattern, pattern)
    }

    /// The glob pattern as written in the whitelist.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The rewrite target (equal to the pattern for allow-as-is rules).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether this rule passes the request through without rewriting.
    pub fn is_allow_as_is(&self) -> bool {
        self.pattern.eq_ignore_ascii_case(&self.target)
    }

    /// Whether the pattern matches the canonical key.
    pub fn matches(&self, key: &str) -> bool {
        self.matcher.is_match(key)
    }
}

/// Escape the brackets of an IPv6 literal host so they are not read as a
/// character class.
fn escape_ipv6_host(pattern: &str) -> String {
    let Some((scheme, rest)) = pattern.split_once("://") else {
        return pattern.to_string();
    };
    let Some(host) = rest.strip_prefix('[') else {
        return pattern.to_string();
    };
    let Some((literal, tail)) = host.split_once(']') else {
        return pattern.to_string();
    };

    let is_ipv6 = literal.contains(':')
        && literal
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
    if is_ipv6 {
        format!("{}://\\[{}\\]{}", scheme, literal, tail)
    } else {
        pattern.to_string()
    }
}

/// Immutable, ordered whitelist. The first matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    /// Parse whitelist text. Malformed lines are skipped, never fatal.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let entry = match fields.as_slice() {
                [pattern] => RuleEntry::allow(pattern),
                [pattern, target] => RuleEntry::new(pattern, target),
                _ => {
                    debug!(
                        "Skipping whitelist line {}: expected 1 or 2 fields, got {}",
                        line_no,
                        fields.len()
                    );
                    continue;
                }
            };

            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping whitelist line {}: {}", line_no, e),
            }
        }

        Self { entries }
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no rules (everything is denied).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
