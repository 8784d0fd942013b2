//! Outbound HTTP over reqwest.
//!
//! Redirects are followed by hand instead of by the client: the site
//! sets its session cookies on the 302 that follows a login post, and
//! reqwest's automatic redirect handling would drop those headers along
//! with the intermediate responses.

use std::time::Duration;

use larder_core::error::AppError;
use larder_core::transport::{Body, HttpRequest, HttpResponse, Method, Transport};
use reqwest::Client;
use reqwest::header::SET_COOKIE;
use reqwest::redirect::Policy;
use url::Url;

const MAX_REDIRECTS: usize = 5;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport using reqwest, with configurable User-Agent and
/// timeout and manual redirect following.
///
/// Any response the server actually produced is returned as
/// `Ok(HttpResponse)`, status included; `Err` is reserved for failures
/// where no response exists (timeout, connection refused, redirect
/// loop).
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, AppError> {
        Self::with_timeout(user_agent, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::NetworkError(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::NetworkError(e.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let origin = Url::parse(&request.url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        let mut url = origin.clone();
        let mut method = request.method;
        let mut body = request.body.clone();
        let mut set_cookies = Vec::new();

        for _hop in 0..=MAX_REDIRECTS {
            let mut builder = match method {
                Method::Get => self.client.get(url.clone()),
                Method::Post => self.client.post(url.clone()),
            };
            // Request headers carry the session cookie; keep them on
            // the origin host only.
            if url.host_str() == origin.host_str() {
                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }
            }
            builder = match &body {
                Some(Body::Form(fields)) => builder.form(fields),
                Some(Body::Json(json)) => builder.json(json),
                None => builder,
            };

            let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

            for value in response.headers().get_all(SET_COOKIE) {
                match value.to_str() {
                    Ok(s) => set_cookies.push(s.to_string()),
                    Err(_) => tracing::warn!(url = %url, "Dropping non-UTF-8 Set-Cookie header"),
                }
            }

            let status = response.status().as_u16();
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if is_redirect(status) => {
                    url = redirect_target(&url, &location)?;
                    (method, body) = next_hop(method, body, status);
                    tracing::debug!(status, target = %url, "Following redirect");
                }
                _ => {
                    let final_url = response.url().to_string();
                    let body = response.text().await.map_err(|e| {
                        AppError::NetworkError(format!("Failed to read response body: {e}"))
                    })?;
                    return Ok(HttpResponse {
                        status,
                        final_url,
                        set_cookies,
                        body,
                    });
                }
            }
        }

        Err(AppError::NetworkError(format!(
            "Redirect limit ({MAX_REDIRECTS}) exceeded for {}",
            request.url
        )))
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn redirect_target(current: &Url, location: &str) -> Result<Url, AppError> {
    current
        .join(location)
        .map_err(|e| AppError::InvalidUrl(format!("bad redirect target '{location}': {e}")))
}

/// Method and body for the next hop. 301/302/303 after a POST downgrade
/// to a bodyless GET, 307/308 resend as-is.
fn next_hop(method: Method, body: Option<Body>, status: u16) -> (Method, Option<Body>) {
    match status {
        307 | 308 => (method, body),
        _ => (Method::Get, None),
    }
}
