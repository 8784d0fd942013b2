//! Fixed-window rate limiting and the request-budget transport wrapper.
//!
//! [`RateLimitedTransport`] wraps any [`Transport`] implementation with a
//! fixed-window quota, cookie injection from the [`SessionStore`], and
//! `Set-Cookie` persistence on the way back. When the window is exhausted
//! it fails immediately with [`AppError::RateLimitExceeded`] — it never
//! queues or sleeps; retry/backoff policy belongs to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use larder_core::rate_limit::{RateLimitConfig, RateLimitedTransport};
//! use larder_core::session::{SessionConfig, SessionStore};
//!
//! # use larder_core::transport::{HttpRequest, HttpResponse, Transport};
//! # #[derive(Clone)] struct MyTransport;
//! # impl Transport for MyTransport {
//! #     async fn execute(&self, _: HttpRequest) -> Result<HttpResponse, larder_core::error::AppError> { todo!() }
//! # }
//! let session = SessionStore::new(SessionConfig::default());
//! let config = RateLimitConfig::new(60); // 60 requests per minute
//! let transport = RateLimitedTransport::new(MyTransport, config, session);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::AppError;
use crate::session::SessionStore;
use crate::transport::{HttpRequest, HttpResponse, Transport, redact_headers};

/// Configuration for the fixed-window request budget.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests permitted per window.
    pub max_requests: u32,

    /// Window length. Quota resets at window boundaries, no carryover.
    pub window: Duration,
}

impl RateLimitConfig {
    /// A budget of `max_requests` per 60-second window.
    pub fn new(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl Default for RateLimitConfig {
    /// 60 requests per minute — polite against a site that bans scrapers.
    fn default() -> Self {
        Self::new(60)
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window quota counter. Shared mutable state with no fairness
/// guarantee across concurrent callers.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Arc<Mutex<Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Arc::new(Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            })),
        }
    }

    /// Consume one unit of quota, or fail immediately when the window is
    /// exhausted.
    pub async fn try_acquire(&self) -> Result<(), AppError> {
        let mut window = self.window.lock().await;
        if window.started.elapsed() >= self.config.window {
            window.started = Instant::now();
            window.count = 0;
        }
        if window.count >= self.config.max_requests {
            tracing::warn!(
                max = self.config.max_requests,
                window_secs = self.config.window.as_secs(),
                "Request budget exhausted"
            );
            return Err(AppError::RateLimitExceeded);
        }
        window.count += 1;
        Ok(())
    }

    /// Units left in the current window.
    pub async fn remaining(&self) -> u32 {
        let window = self.window.lock().await;
        if window.started.elapsed() >= self.config.window {
            return self.config.max_requests;
        }
        self.config.max_requests.saturating_sub(window.count)
    }
}

/// A [`Transport`] wrapper that enforces the request budget and owns the
/// cookie round-trip: inject `Cookie` on the way out, persist `Set-Cookie`
/// on the way back, and slide session activity on every attempt.
#[derive(Clone)]
pub struct RateLimitedTransport<T> {
    inner: T,
    limiter: RateLimiter,
    session: SessionStore,
}

impl<T: Transport> RateLimitedTransport<T> {
    pub fn new(inner: T, config: RateLimitConfig, session: SessionStore) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(config),
            session,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl<T: Transport> Transport for RateLimitedTransport<T> {
    async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.limiter.try_acquire().await?;

        // Every attempt counts as activity, not only successes.
        self.session.update_activity().await;

        let request_url =
            Url::parse(&request.url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        if let Some(cookie_header) = self.session.cookie_header(&request_url).await {
            request.headers.push(("Cookie".to_string(), cookie_header));
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            headers = ?redact_headers(&request.headers),
            "Issuing request"
        );

        let response = self.inner.execute(request).await?;

        if !response.set_cookies.is_empty() {
            // Cookies apply to wherever the redirects landed us.
            let cookie_url = Url::parse(&response.final_url).unwrap_or(request_url);
            self.session
                .store_response_cookies(&cookie_url, &response.set_cookies)
                .await;
        }

        tracing::debug!(
            status = response.status,
            final_url = %response.final_url,
            "Request complete"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::testutil::{MockTransport, html_response};

    fn session() -> SessionStore {
        SessionStore::new(SessionConfig::default())
    }

    #[tokio::test]
    async fn acquire_within_budget_succeeds() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3));
        for _ in 0..3 {
            limiter.try_acquire().await.unwrap();
        }
        assert_eq!(limiter.remaining().await, 0);
    }

    #[tokio::test]
    async fn exhausted_window_fails_immediately() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1));
        limiter.try_acquire().await.unwrap();
        let start = Instant::now();
        let err = limiter.try_acquire().await.unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded));
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "exhaustion must fail without sleeping"
        );
    }

    #[tokio::test]
    async fn window_reset_restores_budget() {
        let config = RateLimitConfig::new(1).with_window(Duration::from_millis(50));
        let limiter = RateLimiter::new(config);
        limiter.try_acquire().await.unwrap();
        assert!(limiter.try_acquire().await.is_err());
        tokio::time::sleep(Duration::from_millis(70)).await;
        limiter.try_acquire().await.unwrap();
    }

    #[tokio::test]
    async fn transport_injects_stored_cookies() {
        let session = session();
        let url = Url::parse("https://shop.example.com/").unwrap();
        session
            .store_response_cookies(&url, &["sid=abc; Path=/".to_string()])
            .await;

        let mock = MockTransport::respond_with(html_response("<html></html>"));
        let transport = RateLimitedTransport::new(mock.clone(), RateLimitConfig::new(10), session);

        transport
            .execute(HttpRequest::get("https://shop.example.com/cart"))
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let cookie = requests[0]
            .headers
            .iter()
            .find(|(n, _)| n == "Cookie")
            .map(|(_, v)| v.clone());
        assert_eq!(cookie.as_deref(), Some("sid=abc"));
    }

    #[tokio::test]
    async fn transport_persists_response_cookies() {
        let session = session();
        let mut resp = html_response("<html></html>");
        resp.set_cookies = vec!["token=xyz; Path=/".to_string()];
        let mock = MockTransport::respond_with(resp);
        let transport =
            RateLimitedTransport::new(mock, RateLimitConfig::new(10), session.clone());

        transport
            .execute(HttpRequest::get("https://shop.example.com/"))
            .await
            .unwrap();

        let url = Url::parse("https://shop.example.com/x").unwrap();
        assert_eq!(session.cookie_header(&url).await.as_deref(), Some("token=xyz"));
    }

    #[tokio::test]
    async fn budget_exhaustion_blocks_inner_call() {
        let mock = MockTransport::respond_with(html_response("<html></html>"));
        let transport = RateLimitedTransport::new(
            mock.clone(),
            RateLimitConfig::new(1),
            session(),
        );

        transport
            .execute(HttpRequest::get("https://shop.example.com/a"))
            .await
            .unwrap();
        let err = transport
            .execute(HttpRequest::get("https://shop.example.com/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded));
        assert_eq!(mock.requests().len(), 1, "second request never left the process");
    }

    #[tokio::test]
    async fn every_attempt_slides_activity() {
        let session = SessionStore::new(SessionConfig {
            timeout: Duration::from_millis(120),
        });
        session.set_authenticated("sid", None, None).await;

        let mock = MockTransport::with_responses(vec![
            Ok(html_response("<html></html>")),
            Err(AppError::NetworkError("reset".into())),
        ]);
        let transport =
            RateLimitedTransport::new(mock, RateLimitConfig::new(10), session.clone());

        tokio::time::sleep(Duration::from_millis(70)).await;
        transport
            .execute(HttpRequest::get("https://shop.example.com/"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        // Failed attempt still counts as activity.
        let _ = transport
            .execute(HttpRequest::get("https://shop.example.com/"))
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(session.is_valid().await, "sliding expiry kept the session alive");
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_dispatch() {
        let mock = MockTransport::respond_with(html_response("<html></html>"));
        let transport =
            RateLimitedTransport::new(mock.clone(), RateLimitConfig::new(10), session());
        let err = transport
            .execute(HttpRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
        assert!(mock.requests().is_empty());
    }
}
