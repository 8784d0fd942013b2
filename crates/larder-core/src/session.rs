//! Authenticated-session state and cookie ownership.
//!
//! [`SessionStore`] exclusively owns the [`CookieJar`] and the
//! authentication state. It is a cheap-to-clone handle over shared state,
//! constructed once per process and passed explicitly into whatever needs
//! it — there are no globals. Session lifetime is sliding: every request
//! attempt pushes the expiry forward by the configured timeout.
//!
//! Expiry is split into a pure predicate ([`SessionStore::is_expired`])
//! and an explicit eviction ([`SessionStore::expire_if_needed`]);
//! [`SessionStore::is_valid`] composes the two for callers that want the
//! classic check-and-clear read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::cookies::CookieJar;

/// Default sliding-session timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding inactivity timeout.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Mutable authentication state. Owned by [`SessionStore`]; mutated only
/// through its methods.
#[derive(Debug, Clone)]
struct SessionState {
    session_id: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    authenticated: bool,
    last_activity: Instant,
    expires_at: Instant,
}

impl SessionState {
    fn unauthenticated() -> Self {
        let now = Instant::now();
        Self {
            session_id: None,
            user_id: None,
            email: None,
            authenticated: false,
            last_activity: now,
            expires_at: now,
        }
    }
}

/// Redacted session snapshot for health/status reporting. Carries no raw
/// identifiers: the session id is reduced to presence, the email is masked.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub has_session_id: bool,
    pub has_user_id: bool,
    /// Masked as `a***@example.com`; None when no user is attached.
    pub email: Option<String>,
    /// Seconds until expiry; zero when unauthenticated or already past.
    pub seconds_remaining: u64,
    /// Seconds since the last request attempt.
    pub idle_seconds: u64,
}

struct Inner {
    state: SessionState,
    jar: CookieJar,
}

/// Owns cookie storage and authentication state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::unauthenticated(),
                jar: CookieJar::new(),
            })),
            timeout: config.timeout,
        }
    }

    /// Mark the session authenticated and start the sliding timeout.
    pub async fn set_authenticated(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        email: Option<&str>,
    ) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.state = SessionState {
            session_id: Some(session_id.to_string()),
            user_id: user_id.map(str::to_string),
            email: email.map(str::to_string),
            authenticated: true,
            last_activity: now,
            expires_at: now + self.timeout,
        };
        tracing::info!("Session authenticated");
    }

    /// Pure predicate: is an authenticated session past its expiry?
    /// Never mutates; pair with [`expire_if_needed`](Self::expire_if_needed).
    pub async fn is_expired(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state.authenticated && Instant::now() >= inner.state.expires_at
    }

    /// Evict the session if it has expired: resets the state to
    /// unauthenticated and replaces the cookie jar wholesale. Returns true
    /// when an eviction actually happened.
    pub async fn expire_if_needed(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state.authenticated && Instant::now() >= inner.state.expires_at {
            tracing::info!("Session expired, clearing state and cookies");
            inner.state = SessionState::unauthenticated();
            inner.jar = CookieJar::new();
            return true;
        }
        false
    }

    /// Check-and-clear read: runs [`expire_if_needed`](Self::expire_if_needed)
    /// and then reports whether the session is still authenticated. Not an
    /// idempotent read — an expired session is gone after the first call.
    pub async fn is_valid(&self) -> bool {
        self.expire_if_needed().await;
        self.inner.lock().await.state.authenticated
    }

    /// Slide the expiry forward by the full timeout. Called by the
    /// transport on every request attempt, success or not.
    pub async fn update_activity(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state.authenticated {
            let now = Instant::now();
            inner.state.last_activity = now;
            inner.state.expires_at = now + self.timeout;
        }
    }

    /// True when the remaining session time has dropped to 20% of the
    /// timeout or less. Callers use this to refresh credentials before
    /// the session dies mid-flow.
    pub async fn needs_renewal(&self) -> bool {
        let inner = self.inner.lock().await;
        if !inner.state.authenticated {
            return false;
        }
        let remaining = inner
            .state
            .expires_at
            .saturating_duration_since(Instant::now());
        renewal_due(remaining, self.timeout)
    }

    /// Reset to unauthenticated and discard the cookie jar entirely.
    pub async fn clear_session(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = SessionState::unauthenticated();
        inner.jar = CookieJar::new();
        tracing::info!("Session cleared");
    }

    /// Compute the `Cookie` request header for a URL from the jar.
    pub async fn cookie_header(&self, url: &Url) -> Option<String> {
        let mut inner = self.inner.lock().await;
        inner.jar.cookie_header_for(url)
    }

    /// Persist all `Set-Cookie` values from a response against its URL.
    pub async fn store_response_cookies(&self, url: &Url, headers: &[String]) {
        let mut inner = self.inner.lock().await;
        for header in headers {
            inner.jar.store_from_header(url, header);
        }
    }

    /// True when the jar holds a cookie whose name suggests a server-side
    /// session. Login success on the storefront is inferred, not reported,
    /// and a session-ish cookie appearing is one of the two signals.
    pub async fn has_session_cookie(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.jar.has_name_containing(&["session", "sid", "sess"])
    }

    /// Redacted snapshot for health/status reporting.
    pub async fn session_info(&self) -> SessionInfo {
        let inner = self.inner.lock().await;
        let remaining = if inner.state.authenticated {
            inner
                .state
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs()
        } else {
            0
        };
        SessionInfo {
            authenticated: inner.state.authenticated,
            has_session_id: inner.state.session_id.is_some(),
            has_user_id: inner.state.user_id.is_some(),
            email: inner.state.email.as_deref().map(mask_email),
            seconds_remaining: remaining,
            idle_seconds: inner.state.last_activity.elapsed().as_secs(),
        }
    }
}

/// Renewal threshold: remaining time at or below 20% of the timeout.
fn renewal_due(remaining: Duration, timeout: Duration) -> bool {
    remaining <= timeout / 5
}

/// Mask an email for telemetry: first character plus the domain.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().unwrap_or('*');
            format!("{first}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_timeout(ms: u64) -> SessionStore {
        SessionStore::new(SessionConfig {
            timeout: Duration::from_millis(ms),
        })
    }

    #[tokio::test]
    async fn fresh_store_is_unauthenticated() {
        let store = store_with_timeout(1000);
        assert!(!store.is_valid().await);
        assert!(!store.is_expired().await);
        assert!(!store.needs_renewal().await);
    }

    #[tokio::test]
    async fn authenticated_session_is_valid_before_timeout() {
        let store = store_with_timeout(10_000);
        store.set_authenticated("sid-1", Some("u1"), Some("a@b.c")).await;
        assert!(store.is_valid().await);
        assert!(!store.is_expired().await);
    }

    #[tokio::test]
    async fn is_valid_clears_expired_session_and_cookies() {
        let store = store_with_timeout(50);
        store.set_authenticated("sid-1", None, None).await;
        let url = Url::parse("https://shop.example.com/").unwrap();
        store
            .store_response_cookies(&url, &["sid=abc; Path=/".to_string()])
            .await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.is_expired().await);
        assert!(!store.is_valid().await);
        // Eviction replaced the jar wholesale.
        assert_eq!(store.cookie_header(&url).await, None);
        let info = store.session_info().await;
        assert!(!info.authenticated);
        assert!(!info.has_session_id);
    }

    #[tokio::test]
    async fn expire_if_needed_reports_eviction_once() {
        let store = store_with_timeout(30);
        store.set_authenticated("sid-1", None, None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.expire_if_needed().await);
        assert!(!store.expire_if_needed().await, "second call is a no-op");
    }

    #[tokio::test]
    async fn update_activity_slides_expiry() {
        let store = store_with_timeout(100);
        store.set_authenticated("sid-1", None, None).await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            store.update_activity().await;
        }
        // 180ms elapsed but activity kept sliding the window.
        assert!(store.is_valid().await);
    }

    #[test]
    fn renewal_threshold_is_twenty_percent() {
        let timeout = Duration::from_secs(1000);
        assert!(renewal_due(Duration::from_secs(200), timeout));
        assert!(renewal_due(Duration::from_secs(199), timeout));
        assert!(renewal_due(Duration::ZERO, timeout));
        assert!(!renewal_due(Duration::from_secs(201), timeout));
        assert!(!renewal_due(Duration::from_secs(1000), timeout));
    }

    #[tokio::test]
    async fn needs_renewal_false_when_unauthenticated() {
        let store = store_with_timeout(10);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!store.needs_renewal().await);
    }

    #[tokio::test]
    async fn clear_session_discards_cookies() {
        let store = store_with_timeout(10_000);
        store.set_authenticated("sid-1", None, Some("x@y.z")).await;
        let url = Url::parse("https://shop.example.com/").unwrap();
        store
            .store_response_cookies(&url, &["sid=abc; Path=/".to_string()])
            .await;
        store.clear_session().await;
        assert!(!store.is_valid().await);
        assert_eq!(store.cookie_header(&url).await, None);
    }

    #[tokio::test]
    async fn session_info_redacts_identifiers() {
        let store = store_with_timeout(10_000);
        store
            .set_authenticated("very-secret-sid", Some("u42"), Some("alice@example.com"))
            .await;
        let info = store.session_info().await;
        assert!(info.authenticated);
        assert!(info.has_session_id);
        assert!(info.has_user_id);
        assert_eq!(info.email.as_deref(), Some("a***@example.com"));
        assert!(info.seconds_remaining > 0);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("very-secret-sid"));
        assert!(!json.contains("alice@"));
    }

    #[tokio::test]
    async fn session_cookie_heuristic() {
        let store = store_with_timeout(10_000);
        let url = Url::parse("https://shop.example.com/").unwrap();
        assert!(!store.has_session_cookie().await);
        store
            .store_response_cookies(&url, &["PHPSESSID=abc; Path=/".to_string()])
            .await;
        assert!(store.has_session_cookie().await);
    }

    #[test]
    fn mask_email_handles_odd_inputs() {
        assert_eq!(mask_email("alice@example.com"), "a***@example.com");
        assert_eq!(mask_email("@example.com"), "***");
        assert_eq!(mask_email("no-at-sign"), "***");
    }
}
