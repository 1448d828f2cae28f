//! Candidate URL policy
//!
//! Nothing reaches the browser or the store without passing `UrlPolicy`.

use url::Url;

use crate::consts::AUTH_MARKERS;

/// Scheme allow-list for navigation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UrlPolicy {
    /// Also accept `http://` (debug builds only; SameSite=None cookies break)
    pub allow_insecure_debug: bool,
}

impl UrlPolicy {
    pub const STRICT: Self = Self {
        allow_insecure_debug: false,
    };

    pub fn new(allow_insecure_debug: bool) -> Self {
        Self {
            allow_insecure_debug,
        }
    }

    pub fn is_valid(&self, candidate: &str) -> bool {
        is_valid(candidate, self.allow_insecure_debug)
    }

    /// Returns the candidate only if it passes the policy
    pub fn accept<'a>(&self, candidate: Option<&'a str>) -> Option<&'a str> {
        candidate.filter(|c| self.is_valid(c))
    }
}

/// True iff non-empty and `https://`-prefixed, or `http://`-prefixed when
/// `allow_insecure_debug` is set.
pub fn is_valid(candidate: &str, allow_insecure_debug: bool) -> bool {
    if candidate.is_empty() {
        return false;
    }
    if candidate.starts_with("https://") {
        return true;
    }
    allow_insecure_debug && candidate.starts_with("http://")
}

/// Login/OTP/callback pages are never stored as the resume URL
pub fn looks_like_auth_page(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Host component of `url`, if it parses
pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
}

/// Host-suffix comparison against the tracked domain.
///
/// With no tracked domain yet every URL counts as same-site.
pub fn is_same_site(url: &str, domain: Option<&str>) -> bool {
    let domain = match domain {
        Some(d) if !d.is_empty() => d,
        _ => return true,
    };
    match extract_host(url) {
        Some(host) => host == domain || host.ends_with(&format!(".{domain}")),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_https_always_valid() {
        assert!(is_valid("https://game.example/play", false));
        assert!(is_valid("https://game.example/play", true));
    }

    #[test]
    fn test_http_only_under_debug() {
        assert!(!is_valid("http://game.example", false));
        assert!(is_valid("http://game.example", true));
    }

    #[test]
    fn test_empty_and_other_schemes_rejected() {
        assert!(!is_valid("", false));
        assert!(!is_valid("", true));
        assert!(!is_valid("ftp://game.example", true));
        assert!(!is_valid("javascript:alert(1)", true));
        assert!(!is_valid("HTTPS://game.example", false));
    }

    #[test]
    fn test_accept_filters() {
        let policy = UrlPolicy::STRICT;
        assert_eq!(policy.accept(Some("https://a.example")), Some("https://a.example"));
        assert_eq!(policy.accept(Some("http://a.example")), None);
        assert_eq!(policy.accept(None), None);
    }

    #[test]
    fn test_auth_markers_case_insensitive() {
        assert!(looks_like_auth_page("https://x.example/LOGIN"));
        assert!(looks_like_auth_page("https://x.example/oauth/cb"));
        assert!(looks_like_auth_page("https://x.example/SignIn?next=/"));
        assert!(looks_like_auth_page("https://x.example/verify/otp"));
        assert!(looks_like_auth_page("https://x.example/auth/callback"));
        assert!(!looks_like_auth_page("https://x.example/lobby"));
        assert!(!looks_like_auth_page(""));
    }

    #[test]
    fn test_same_site_suffix() {
        assert!(is_same_site("https://game.example/a", Some("game.example")));
        assert!(is_same_site("https://m.game.example/a", Some("game.example")));
        assert!(!is_same_site("https://evilgame.example/a", Some("game.example")));
        assert!(!is_same_site("https://other.example/a", Some("game.example")));
        assert!(!is_same_site("not a url", Some("game.example")));
    }

    #[test]
    fn test_same_site_without_domain_accepts_anything() {
        assert!(is_same_site("https://other.example/a", None));
        assert!(is_same_site("https://other.example/a", Some("")));
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://Game.Example:8443/x").as_deref(),
            Some("game.example")
        );
        assert_eq!(extract_host("garbage"), None);
    }

    proptest! {
        #[test]
        fn prop_strict_valid_iff_https_prefix(s in ".*") {
            prop_assert_eq!(is_valid(&s, false), s.starts_with("https://"));
        }

        #[test]
        fn prop_debug_adds_http(s in ".*") {
            let expected = s.starts_with("https://") || s.starts_with("http://");
            prop_assert_eq!(is_valid(&s, true), expected);
        }

        #[test]
        fn prop_prefixed_paths_are_valid(path in "[a-z0-9./-]{0,40}") {
            let https = format!("https://{path}");
            let http = format!("http://{path}");
            prop_assert!(is_valid(&https, false));
            prop_assert!(!is_valid(&http, false));
            prop_assert!(is_valid(&http, true));
        }
    }
}
