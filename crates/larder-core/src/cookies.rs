//! In-memory cookie jar with standard domain/path/expiry/secure matching.
//!
//! The target storefront speaks plain `Set-Cookie` headers; there is no
//! machine session API. The jar is keyed by (domain, path, name), holds
//! process-lifetime state only, and is replaced wholesale on session clear
//! so a logout can never leak a partial cookie set.
//!
//! Malformed headers are logged and skipped, never fatal — the storefront
//! is not a contractual peer and its headers drift.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use url::Url;

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Normalised (lowercase, no leading dot) domain this cookie applies to.
    pub domain: String,
    pub path: String,
    /// None = session cookie, lives as long as the jar.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    /// True when the header carried no `Domain` attribute: the cookie
    /// matches the exact request host only, not subdomains.
    pub host_only: bool,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| now >= at)
    }
}

/// Cookie storage keyed by (domain, path, name).
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<(String, String, String), Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Store one `Set-Cookie` header value against the request URL.
    ///
    /// Follows RFC 6265 semantics for the attributes the storefront
    /// actually sends: `Domain`, `Path`, `Expires`, `Max-Age`, `Secure`.
    /// `Max-Age` wins over `Expires`; a non-positive `Max-Age` or a past
    /// `Expires` deletes the cookie. Malformed headers are skipped.
    pub fn store_from_header(&mut self, url: &Url, header: &str) {
        let Some(host) = url.host_str() else {
            tracing::warn!("Set-Cookie ignored: request URL has no host");
            return;
        };
        let host = host.to_ascii_lowercase();

        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
            tracing::warn!("Skipping malformed Set-Cookie header (no name=value pair)");
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            tracing::warn!("Skipping malformed Set-Cookie header (empty cookie name)");
            return;
        }
        let value = value.trim().trim_matches('"').to_string();

        let now = Utc::now();
        let mut domain = host.clone();
        let mut host_only = true;
        let mut path: Option<String> = None;
        let mut expires: Option<DateTime<Utc>> = None;
        let mut max_age: Option<i64> = None;
        let mut secure = false;

        for attr in parts {
            let attr = attr.trim();
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => {
                    let d = val.trim().trim_start_matches('.').to_ascii_lowercase();
                    if d.is_empty() {
                        continue;
                    }
                    if !domain_match(&host, &d) {
                        tracing::warn!(
                            cookie = %name,
                            domain = %d,
                            host = %host,
                            "Skipping cookie: Domain attribute does not cover request host"
                        );
                        return;
                    }
                    domain = d;
                    host_only = false;
                }
                "path" => {
                    let p = val.trim();
                    if p.starts_with('/') {
                        path = Some(p.to_string());
                    }
                }
                "expires" => expires = parse_cookie_date(val.trim()),
                "max-age" => max_age = val.trim().parse::<i64>().ok(),
                "secure" => secure = true,
                // HttpOnly, SameSite and friends are irrelevant to a
                // non-browser client; accepted and ignored.
                _ => {}
            }
        }

        // Max-Age takes precedence; non-positive values collapse to "now",
        // which the deletion check below turns into a removal.
        if let Some(seconds) = max_age {
            expires = Some(now + ChronoDuration::seconds(seconds.max(0)));
        }

        let path = path.unwrap_or_else(|| default_path(url));
        let key = (domain.clone(), path.clone(), name.to_string());

        // An already-past expiry is a deletion instruction.
        if expires.is_some_and(|at| at <= now) {
            self.cookies.remove(&key);
            return;
        }

        self.cookies.insert(
            key,
            Cookie {
                name: name.to_string(),
                value,
                domain,
                path,
                expires,
                secure,
                host_only,
            },
        );
    }

    /// True when any stored, unexpired cookie name contains one of the
    /// needles (case-insensitive). Used for session-cookie heuristics.
    pub fn has_name_containing(&self, needles: &[&str]) -> bool {
        let now = Utc::now();
        self.cookies.values().any(|c| {
            !c.is_expired(now) && {
                let name = c.name.to_ascii_lowercase();
                needles.iter().any(|n| name.contains(n))
            }
        })
    }

    /// Build the `Cookie` request header value for a URL, or None when no
    /// stored cookie matches. Expired entries are dropped during the read.
    pub fn cookie_header_for(&mut self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let req_path = url.path();
        let https = url.scheme() == "https";
        let now = Utc::now();

        self.cookies.retain(|_, c| !c.is_expired(now));

        let mut matched: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| {
                let domain_ok = if c.host_only {
                    host == c.domain
                } else {
                    domain_match(&host, &c.domain)
                };
                domain_ok && path_match(req_path, &c.path) && (!c.secure || https)
            })
            .collect();

        if matched.is_empty() {
            return None;
        }

        // Longest path first, then name, for a stable header.
        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.name.cmp(&b.name)));

        Some(
            matched
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// RFC 6265 domain matching: exact match, or `host` is a dot-separated
/// suffix of `domain` (and not an IP literal).
fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    if host.parse::<std::net::IpAddr>().is_ok() {
        return false;
    }
    host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// RFC 6265 path matching.
fn path_match(req_path: &str, cookie_path: &str) -> bool {
    if req_path == cookie_path {
        return true;
    }
    req_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || req_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

/// Default cookie path: the directory of the request path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Parse the `Expires` attribute. The storefront emits RFC 1123 dates;
/// older pages still use the dash-separated Netscape variant.
fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d-%b-%y %H:%M:%S GMT"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    tracing::warn!(raw = %raw, "Unparsable cookie Expires attribute, treating as session cookie");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn round_trip_same_domain() {
        let mut jar = CookieJar::new();
        let u = url("https://shop.example.com/cart");
        jar.store_from_header(&u, "sid=abc123; Path=/");
        assert_eq!(
            jar.cookie_header_for(&u).as_deref(),
            Some("sid=abc123"),
            "cookie should be retrievable for the setting URL"
        );
    }

    #[test]
    fn cookie_absent_for_unrelated_domain() {
        let mut jar = CookieJar::new();
        jar.store_from_header(&url("https://shop.example.com/"), "sid=abc; Path=/");
        assert_eq!(jar.cookie_header_for(&url("https://other.org/")), None);
    }

    #[test]
    fn domain_attribute_covers_subdomains() {
        let mut jar = CookieJar::new();
        jar.store_from_header(
            &url("https://shop.example.com/"),
            "sid=abc; Domain=example.com; Path=/",
        );
        assert!(jar.cookie_header_for(&url("https://www.example.com/")).is_some());
        assert!(jar.cookie_header_for(&url("https://example.com/")).is_some());
        assert!(jar.cookie_header_for(&url("https://notexample.com/")).is_none());
    }

    #[test]
    fn host_only_cookie_does_not_leak_to_subdomains() {
        let mut jar = CookieJar::new();
        jar.store_from_header(&url("https://example.com/"), "sid=abc; Path=/");
        assert!(jar.cookie_header_for(&url("https://example.com/x")).is_some());
        assert!(jar.cookie_header_for(&url("https://shop.example.com/")).is_none());
    }

    #[test]
    fn foreign_domain_attribute_is_rejected() {
        let mut jar = CookieJar::new();
        jar.store_from_header(
            &url("https://shop.example.com/"),
            "sid=abc; Domain=evil.org; Path=/",
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn path_matching() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/account/orders");
        jar.store_from_header(&u, "pref=1; Path=/account");
        assert!(jar.cookie_header_for(&url("https://example.com/account")).is_some());
        assert!(
            jar.cookie_header_for(&url("https://example.com/account/addresses"))
                .is_some()
        );
        assert!(jar.cookie_header_for(&url("https://example.com/cart")).is_none());
        assert!(
            jar.cookie_header_for(&url("https://example.com/accountant"))
                .is_none(),
            "prefix match must respect path segment boundaries"
        );
    }

    #[test]
    fn secure_cookie_not_sent_over_http() {
        let mut jar = CookieJar::new();
        jar.store_from_header(&url("https://example.com/"), "sid=abc; Path=/; Secure");
        assert!(jar.cookie_header_for(&url("https://example.com/")).is_some());
        assert!(jar.cookie_header_for(&url("http://example.com/")).is_none());
    }

    #[test]
    fn max_age_zero_deletes_cookie() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.store_from_header(&u, "sid=abc; Path=/");
        jar.store_from_header(&u, "sid=abc; Path=/; Max-Age=0");
        assert!(jar.is_empty());
    }

    #[test]
    fn max_age_wins_over_expires() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/");
        // Expires far in the past, Max-Age far in the future: cookie lives.
        jar.store_from_header(
            &u,
            "sid=abc; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Max-Age=3600",
        );
        assert!(jar.cookie_header_for(&u).is_some());
    }

    #[test]
    fn expired_expires_is_deletion() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.store_from_header(&u, "sid=abc; Path=/");
        jar.store_from_header(&u, "sid=abc; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(jar.is_empty());
    }

    #[test]
    fn malformed_header_is_skipped() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/");
        jar.store_from_header(&u, "no-equals-sign-here");
        jar.store_from_header(&u, "=value-without-name");
        assert!(jar.is_empty());
    }

    #[test]
    fn multiple_cookies_joined_longest_path_first() {
        let mut jar = CookieJar::new();
        let u = url("https://example.com/account/orders");
        jar.store_from_header(&u, "a=1; Path=/");
        jar.store_from_header(&u, "b=2; Path=/account");
        assert_eq!(jar.cookie_header_for(&u).as_deref(), Some("b=2; a=1"));
    }

    #[test]
    fn default_path_is_request_directory() {
        let mut jar = CookieJar::new();
        jar.store_from_header(&url("https://example.com/account/orders"), "sid=x");
        assert!(jar.cookie_header_for(&url("https://example.com/account/x")).is_some());
        assert!(jar.cookie_header_for(&url("https://example.com/cart")).is_none());
    }

    #[test]
    fn cookie_date_formats() {
        assert!(parse_cookie_date("Wed, 21 Oct 2015 07:28:00 GMT").is_some());
        assert!(parse_cookie_date("Wed, 21-Oct-2015 07:28:00 GMT").is_some());
        assert!(parse_cookie_date("sometime later").is_none());
    }
}
