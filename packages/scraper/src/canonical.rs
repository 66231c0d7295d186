//! URL canonicalization for outbound links found on listing pages.
//!
//! Directory sites rarely link to a business website directly. Links are
//! wrapped in tracking redirects (`/gourl/...?redirect=<target>`), written
//! protocol-relative, or left without a scheme entirely. [`Canonicalizer`]
//! turns all of these into a plain `scheme://host/path` string, dropping the
//! query and fragment so tracking parameters never reach the output.
//!
//! Canonicalization is total: any input that cannot be turned into a URL
//! with a host yields `None` instead of an error.

use std::sync::LazyLock;

use regex::Regex;
use url::{Position, Url};

/// Canonical URLs longer than this are rejected.
pub const MAX_CANONICAL_LEN: usize = 2048;

/// Query parameter names checked (in order) for a redirect target.
pub const DEFAULT_REDIRECT_PARAMS: &[&str] = &["redirect", "url", "dest"];

/// Path segment that marks an outbound redirect wrapper.
const REDIRECT_WRAPPER_SEGMENT: &str = "/gourl/";

/// Base used to parse relative redirect wrappers.
const WRAPPER_BASE: &str = "https://dummy.local";

static DEFAULT: LazyLock<Canonicalizer> = LazyLock::new(Canonicalizer::default);

/// Canonicalizes `raw` using the default redirect parameter names.
#[must_use]
pub fn canonicalize(raw: &str) -> Option<String> {
    DEFAULT.canonicalize(raw)
}

/// Normalizes raw link values into canonical absolute URLs.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    /// Redirect parameter names, highest priority first.
    redirect_params: Vec<String>,
    /// `name=value` scan used when the wrapper's query does not parse.
    fallback: Option<Regex>,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT_PARAMS)
    }
}

impl Canonicalizer {
    /// Creates a canonicalizer that recognizes the given redirect parameter
    /// names. Blank names are ignored.
    #[must_use]
    pub fn new<S: AsRef<str>>(redirect_params: &[S]) -> Self {
        let redirect_params: Vec<String> = redirect_params
            .iter()
            .map(|p| p.as_ref().trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();

        let fallback = if redirect_params.is_empty() {
            None
        } else {
            let alternation = redirect_params
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!("(?:{alternation})=([^&]+)")).ok()
        };

        Self {
            redirect_params,
            fallback,
        }
    }

    /// Returns the recognized redirect parameter names.
    #[must_use]
    pub fn redirect_params(&self) -> &[String] {
        &self.redirect_params
    }

    /// Returns the canonical form of `raw`, or `None` if it has no usable
    /// host or the result would exceed [`MAX_CANONICAL_LEN`].
    #[must_use]
    pub fn canonicalize(&self, raw: &str) -> Option<String> {
        let token = raw.split_whitespace().next()?.trim_matches([',', ';']);
        if token.is_empty() {
            return None;
        }

        let effective = if token.contains(REDIRECT_WRAPPER_SEGMENT) {
            self.unwrap_redirect(token)
                .unwrap_or_else(|| token.to_owned())
        } else {
            token.to_owned()
        };

        // A literal `%` left after decoding stays escaped, so the canonical
        // form decodes to itself.
        let decoded = percent_decode(&effective).replace('%', "%25");
        let absolute = with_scheme(&decoded);
        let url = Url::parse(&absolute).ok()?;
        if url.host_str().is_none_or(str::is_empty) {
            return None;
        }

        let mut path = url.path();
        if let Some(last_slash) = path.rfind('/')
            && let Some(semi) = path[last_slash..].find(';')
        {
            path = &path[..last_slash + semi];
        }
        if path == "/" && !has_explicit_path(&absolute) {
            path = "";
        }

        let canonical = format!("{}{path}", &url[..Position::BeforePath]);
        if canonical.len() > MAX_CANONICAL_LEN {
            return None;
        }
        Some(canonical)
    }

    /// Extracts the redirect target from a `/gourl/` wrapper.
    fn unwrap_redirect(&self, token: &str) -> Option<String> {
        let absolute = if token.starts_with("http://") || token.starts_with("https://") {
            token.to_owned()
        } else {
            format!("{WRAPPER_BASE}{token}")
        };

        let from_query = Url::parse(&absolute).ok().and_then(|url| {
            self.redirect_params.iter().find_map(|name| {
                url.query_pairs()
                    .find(|(key, value)| key == name.as_str() && !value.is_empty())
                    .map(|(_, value)| value.into_owned())
            })
        });

        let value = from_query.or_else(|| {
            let caps = self.fallback.as_ref()?.captures(token)?;
            Some(caps.get(1)?.as_str().to_owned())
        })?;

        Some(percent_decode(&value))
    }
}

/// Percent-decodes `s`, replacing invalid UTF-8 sequences.
fn percent_decode(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Adds `http` to scheme-relative, `www.`-prefixed, and scheme-less URLs.
fn with_scheme(s: &str) -> String {
    if s.starts_with("//") {
        format!("http:{s}")
    } else if s.starts_with("www.") || !has_scheme(s) {
        format!("http://{s}")
    } else {
        s.to_owned()
    }
}

/// Returns `true` if `s` starts with `scheme:`. A `host:port` prefix is not
/// a scheme.
fn has_scheme(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.starts_with(|c: char| c.is_ascii_digit())
}

/// Returns `true` if the authority in `s` is followed by a `/`.
fn has_explicit_path(s: &str) -> bool {
    let rest = s.split_once("//").map_or(s, |(_, rest)| rest);
    rest.find(['/', '?', '#'])
        .is_some_and(|i| rest[i..].starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_relative_gets_http() {
        assert_eq!(
            canonicalize("//example.com/a").as_deref(),
            Some("http://example.com/a")
        );
    }

    #[test]
    fn bare_www_gets_http() {
        assert_eq!(canonicalize("www.x.com").as_deref(), Some("http://www.x.com"));
    }

    #[test]
    fn schemeless_host_gets_http() {
        assert_eq!(
            canonicalize("example.com:8080/menu").as_deref(),
            Some("http://example.com:8080/menu")
        );
    }

    #[test]
    fn empty_and_blank_are_rejected() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("   \t "), None);
        assert_eq!(canonicalize(",;"), None);
    }

    #[test]
    fn redirect_wrapper_is_unwrapped() {
        assert_eq!(
            canonicalize("/gourl/abc123?redirect=http%3A%2F%2Freal.com%2Fp").as_deref(),
            Some("http://real.com/p")
        );
        assert_eq!(
            canonicalize("https://www.yellowpages.ca/gourl/x?redirect=https%3A%2F%2Freal.com%2Fp")
                .as_deref(),
            Some("https://real.com/p")
        );
    }

    #[test]
    fn redirect_params_are_checked_in_priority_order() {
        assert_eq!(
            canonicalize("/gourl/x?dest=http%3A%2F%2Fd.com&url=http%3A%2F%2Fu.com").as_deref(),
            Some("http://u.com")
        );
    }

    #[test]
    fn redirect_fallback_scans_raw_token() {
        assert_eq!(
            canonicalize("/gourl/redirect=http%3A%2F%2Fb.com%2Fz").as_deref(),
            Some("http://b.com/z")
        );
    }

    #[test]
    fn custom_redirect_params_are_honored() {
        let canonicalizer = Canonicalizer::new(&["target"]);
        assert_eq!(
            canonicalizer
                .canonicalize("/gourl/x?target=http%3A%2F%2Ft.com%2Fq")
                .as_deref(),
            Some("http://t.com/q")
        );
        // `redirect` is no longer recognized, so the target is not followed.
        assert_ne!(
            canonicalizer
                .canonicalize("https://yp.ca/gourl/x?redirect=http%3A%2F%2Ft.com")
                .as_deref(),
            Some("http://t.com")
        );
    }

    #[test]
    fn query_fragment_and_path_params_are_stripped() {
        assert_eq!(
            canonicalize("https://Example.com/path/page;jsessionid=1?utm_source=x#top").as_deref(),
            Some("https://example.com/path/page")
        );
        assert_eq!(
            canonicalize("http://example.com?utm=1").as_deref(),
            Some("http://example.com")
        );
    }

    #[test]
    fn only_first_token_is_used() {
        assert_eq!(
            canonicalize("  http://a.com/x, http://b.com  ").as_deref(),
            Some("http://a.com/x")
        );
        assert_eq!(canonicalize("http://a.com/x;,").as_deref(), Some("http://a.com/x"));
    }

    #[test]
    fn hostless_values_are_rejected() {
        assert_eq!(canonicalize("mailto:someone@example.com"), None);
        assert_eq!(canonicalize("javascript:void(0)"), None);
        assert_eq!(canonicalize("http://"), None);
    }

    #[test]
    fn overlong_urls_are_rejected() {
        let long = format!("http://example.com/{}", "a".repeat(MAX_CANONICAL_LEN));
        assert_eq!(canonicalize(&long), None);

        let fits = format!("http://example.com/{}", "a".repeat(100));
        assert_eq!(canonicalize(&fits).as_deref(), Some(fits.as_str()));
    }

    #[test]
    fn literal_percent_stays_escaped() {
        assert_eq!(
            canonicalize("http://x.com/%2525").as_deref(),
            Some("http://x.com/%2525")
        );
        assert_eq!(
            canonicalize("http://x.com/100%").as_deref(),
            Some("http://x.com/100%25")
        );
        assert_eq!(
            canonicalize("http://x.com/a%20b").as_deref(),
            Some("http://x.com/a%20b")
        );
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let inputs = [
            "//example.com/a",
            "www.x.com",
            "http://x.com/",
            "https://example.com/a%20b?c=d",
            "/gourl/abc?redirect=https%3A%2F%2Freal.com%2Fp%3Fq%3D1",
            "HTTP://EXAMPLE.COM/Path",
            "shop.example.org/catalog;v=2",
            "http://exämple.com/ü",
            "http://user:pw@host.com:81/x",
            "http://x.com/%2525",
            "http://x.com/100%",
            "http://x.com/a%2520b",
        ];

        for input in inputs {
            let once = canonicalize(input)
                .unwrap_or_else(|| panic!("expected a canonical form for {input}"));
            assert_eq!(canonicalize(&once).as_deref(), Some(once.as_str()), "{input}");
        }
    }
}
