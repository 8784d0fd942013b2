//! Wire types and trait seams for outbound HTTP.
//!
//! The storefront has no stable machine API, so the request/response
//! types stay deliberately small: method, URL, headers, an optional form
//! or JSON body, and on the way back the status, the post-redirect URL,
//! the raw `Set-Cookie` headers, and the body text.

use std::future::Future;

use crate::error::AppError;

/// Request method. The storefront only ever needs page reads and form or
/// JSON posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Request body: form-encoded fields (in submission order) or JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, json: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(Body::Json(json)),
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(Body::Form(fields)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed response. `final_url` is the URL after redirects, which is
/// how login success gets inferred on a site that never says so directly.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    /// Raw `Set-Cookie` header values, in response order.
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes an outbound HTTP request.
pub trait Transport: Send + Sync + Clone {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, AppError>> + Send;
}

/// Mutation intents that map to storefront forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormIntent {
    Login,
    AddToCart,
    UpdateCart,
    RemoveFromCart,
    Checkout,
    SaveAddress,
    SelectSlot,
}

impl std::fmt::Display for FormIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormIntent::Login => "login",
            FormIntent::AddToCart => "add_to_cart",
            FormIntent::UpdateCart => "update_cart",
            FormIntent::RemoveFromCart => "remove_from_cart",
            FormIntent::Checkout => "checkout",
            FormIntent::SaveAddress => "save_address",
            FormIntent::SelectSlot => "select_slot",
        };
        write!(f, "{name}")
    }
}

/// A form located on a reference page, ready to submit.
///
/// `fields` holds the discovered hidden inputs, anti-forgery token
/// included, in document order. Discovery that cannot produce a token
/// fails with [`AppError::CsrfTokenMissing`] rather than returning a
/// token-less form.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredForm {
    /// Action URL, possibly relative to the reference page.
    pub action: String,
    pub method: Method,
    pub fields: Vec<(String, String)>,
}

/// Locates the form for an intent inside a reference HTML page.
pub trait FormFinder: Send + Sync + Clone {
    fn discover(&self, html: &str, intent: FormIntent) -> Result<DiscoveredForm, AppError>;
}

/// Headers whose values must never reach telemetry.
const SENSITIVE_HEADERS: [&str; 3] = ["cookie", "authorization", "set-cookie"];

/// Replace credential-bearing header values with a placeholder before
/// they are attached to any diagnostic output.
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                (name.clone(), "<redacted>".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let req = HttpRequest::get("https://example.com/cart");
        assert_eq!(req.method, Method::Get);
        assert!(req.body.is_none());

        let req = HttpRequest::post_form(
            "https://example.com/cart/add",
            vec![("productId".into(), "42".into())],
        )
        .with_header("X-Requested-With", "XMLHttpRequest");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.headers.len(), 1);
        assert!(matches!(req.body, Some(Body::Form(_))));
    }

    #[test]
    fn success_status_range() {
        let mut resp = HttpResponse {
            status: 204,
            final_url: "https://example.com/".into(),
            set_cookies: vec![],
            body: String::new(),
        };
        assert!(resp.is_success());
        resp.status = 302;
        assert!(!resp.is_success());
        resp.status = 500;
        assert!(!resp.is_success());
    }

    #[test]
    fn redaction_hides_credentials_case_insensitively() {
        let headers = vec![
            ("Cookie".to_string(), "sid=secret".to_string()),
            ("AUTHORIZATION".to_string(), "Bearer tok".to_string()),
            ("Accept".to_string(), "text/html".to_string()),
        ];
        let redacted = redact_headers(&headers);
        assert_eq!(redacted[0].1, "<redacted>");
        assert_eq!(redacted[1].1, "<redacted>");
        assert_eq!(redacted[2].1, "text/html");
    }
}
