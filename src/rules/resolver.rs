//! First-match resolution of canonical request keys.
//!
//! A canonical key is `scheme://host:port`, where scheme is `conn` for
//! CONNECT tunnels and `http` for forwarded requests.

use super::table::RuleTable;

/// Scheme prefix for CONNECT tunnel keys.
pub const CONN_SCHEME: &str = "conn://";

/// Scheme prefix for forward-proxy keys.
pub const HTTP_SCHEME: &str = "http://";

/// Resolve `key` against `table`.
///
/// Returns the key itself for allow-as-is rules, the rule's target for
/// rewrite rules, or `None` when nothing matches. Entries are tried in
/// declaration order and the first match wins, even if a later entry is
/// more specific.
pub fn resolve(table: &RuleTable, key: &str) -> Option<String> {
    let key = key.trim();

    let entry = table.entries().iter().find(|entry| entry.matches(key))?;

    if entry.is_allow_as_is() {
        Some(key.to_string())
    } else {
        Some(entry.target().to_string())
    }
}

/// Build the canonical key for a CONNECT request authority.
pub fn conn_key(authority: &str) -> String {
    format!("{}{}", CONN_SCHEME, authority)
}

/// Build the canonical key for a forwarded request.
pub fn http_key(host: &str, port: u16) -> String {
    format!("{}{}:{}", HTTP_SCHEME, host, port)
}

/// Strip a leading `scheme` (case-insensitive) from a resolved value.
///
/// Allow-as-is resolutions return the canonical key, so handlers use this
/// to get back to a plain authority.
pub fn strip_scheme<'a>(value: &'a str, scheme: &str) -> &'a str {
    match value.get(..scheme.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(scheme) => &value[scheme.len()..],
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> RuleTable {
        RuleTable::parse(text)
    }

    #[test]
    fn test_allow_as_is() {
        let rules = table("http://a.b:80\n");

        assert_eq!(
            resolve(&rules, "http://a.b:80"),
            Some("http://a.b:80".to_string())
        );
        assert_eq!(resolve(&rules, "http://c.d:80"), None);
    }

    #[test]
    fn test_rewrite() {
        let rules = table("conn://chain-x:30303\tlocalhost:30308\n");

        assert_eq!(
            resolve(&rules, "conn://chain-x:30303"),
            Some("localhost:30308".to_string())
        );
    }

    #[test]
    fn test_glob_match() {
        let rules = table("http://*.pdx.link:80\n");

        assert_eq!(
            resolve(&rules, "http://a.pdx.link:80"),
            Some("http://a.pdx.link:80".to_string())
        );
        assert_eq!(resolve(&rules, "http://other.com:80"), None);
    }

    #[test]
    fn test_glob_question_mark_and_class() {
        let rules = table(
            "conn://node-?:30303\tlocalhost:1\n\
             conn://peer-[0-3]:30303\tlocalhost:2\n",
        );

        assert_eq!(
            resolve(&rules, "conn://node-7:30303"),
            Some("localhost:1".to_string())
        );
        assert_eq!(resolve(&rules, "conn://node-17:30303"), None);
        assert_eq!(
            resolve(&rules, "conn://peer-2:30303"),
            Some("localhost:2".to_string())
        );
        assert_eq!(resolve(&rules, "conn://peer-4:30303"), None);
    }

    #[test]
    fn test_no_partial_matching() {
        let rules = table("http://a.b:80\n");

        assert_eq!(resolve(&rules, "http://a.b:8080"), None);
        assert_eq!(resolve(&rules, "http://xa.b:80"), None);
    }

    #[test]
    fn test_first_declared_match_wins() {
        let rules = table(
            "http://a.b:80\tx:80\n\
             http://a.b:*\ty:80\n",
        );

        assert_eq!(resolve(&rules, "http://a.b:80"), Some("x:80".to_string()));
        assert_eq!(resolve(&rules, "http://a.b:81"), Some("y:80".to_string()));
    }

    #[test]
    fn test_first_match_beats_later_more_specific() {
        let rules = table(
            "http://*:80\tcatch-all:80\n\
             http://a.b:80\tspecific:80\n",
        );

        assert_eq!(
            resolve(&rules, "http://a.b:80"),
            Some("catch-all:80".to_string())
        );
    }

    #[test]
    fn test_first_match_with_shared_prefixes() {
        let mut text = String::new();
        for i in 0..50 {
            text.push_str(&format!("conn://chain-{}*\tlocalhost:{}\n", i, 30000 + i));
        }
        let rules = table(&text);

        // "chain-1*" is declared before "chain-10*" and must win
        assert_eq!(
            resolve(&rules, "conn://chain-10:30303"),
            Some("localhost:30001".to_string())
        );
        assert_eq!(
            resolve(&rules, "conn://chain-42:1"),
            Some("localhost:30004".to_string())
        );
    }

    #[test]
    fn test_case_insensitive() {
        let rules = table("http://example.com:80\tlocalhost:80\n");

        assert_eq!(
            resolve(&rules, "HTTP://Example.com:80"),
            resolve(&rules, "http://example.com:80")
        );
        assert_eq!(
            resolve(&rules, "HTTP://Example.com:80"),
            Some("localhost:80".to_string())
        );
    }

    #[test]
    fn test_key_is_trimmed() {
        let rules = table("http://a.b:80\n");

        assert_eq!(
            resolve(&rules, "  http://a.b:80\t"),
            Some("http://a.b:80".to_string())
        );
    }

    #[test]
    fn test_deterministic() {
        let rules = table("http://*.b:80\tx:1\nhttp://a.*:80\ty:2\n");

        let first = resolve(&rules, "http://a.b:80");
        for _ in 0..100 {
            assert_eq!(resolve(&rules, "http://a.b:80"), first);
        }
    }

    #[test]
    fn test_empty_table_denies_everything() {
        let rules = RuleTable::default();
        assert_eq!(resolve(&rules, "http://a.b:80"), None);
        assert_eq!(resolve(&rules, "conn://a.b:443"), None);
    }

    #[test]
    fn test_ipv6_literal_key() {
        let rules = table("http://[::1]:80\n");
        assert_eq!(
            resolve(&rules, &http_key("[::1]", 80)),
            Some("http://[::1]:80".to_string())
        );
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(conn_key("chain-x:30303"), "conn://chain-x:30303");
        assert_eq!(http_key("pdx.ltd", 80), "http://pdx.ltd:80");
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("conn://a.b:1", CONN_SCHEME), "a.b:1");
        assert_eq!(strip_scheme("CONN://a.b:1", CONN_SCHEME), "a.b:1");
        assert_eq!(strip_scheme("a.b:1", CONN_SCHEME), "a.b:1");
        assert_eq!(strip_scheme("http://a.b:80", HTTP_SCHEME), "a.b:80");
        assert_eq!(strip_scheme("ht", HTTP_SCHEME), "ht");
    }
}
