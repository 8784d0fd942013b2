//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks
//! use `Arc<Mutex<_>>` for interior mutability, allowing test assertions
//! on recorded calls.

use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::transport::{
    DiscoveredForm, FormFinder, FormIntent, HttpRequest, HttpResponse, Transport,
};

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

/// A 200 HTML response with no cookies.
pub fn html_response(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        final_url: "https://shop.example.com/".to_string(),
        set_cookies: Vec::new(),
        body: body.to_string(),
    }
}

/// A 200 JSON response.
pub fn json_response(value: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        final_url: "https://shop.example.com/api".to_string(),
        set_cookies: Vec::new(),
        body: value.to_string(),
    }
}

/// A response with an arbitrary status.
pub fn response_with_status(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        final_url: "https://shop.example.com/".to_string(),
        set_cookies: Vec::new(),
        body: body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock transport with a queue of canned responses. Each call pops the
/// first element; an empty queue returns a default HTML page. Every
/// request is recorded for call-count and header assertions.
#[derive(Clone)]
pub struct MockTransport {
    responses: Arc<Mutex<Vec<Result<HttpResponse, AppError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Answer the first call with `response`, later calls with the
    /// default page.
    pub fn respond_with(response: HttpResponse) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Ok(response)])),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![Err(error)])),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_responses(responses: Vec<Result<HttpResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of all recorded requests, in issue order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(html_response("<html><body>default</body></html>"))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockFormFinder
// ---------------------------------------------------------------------------

/// Mock form finder returning a fixed form or error, with a call counter.
#[derive(Clone)]
pub struct MockFormFinder {
    result: Arc<Mutex<Result<DiscoveredForm, Option<AppError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockFormFinder {
    pub fn with_form(form: DiscoveredForm) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(form))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(Some(error)))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// How many times `discover` was invoked.
    pub fn discover_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl FormFinder for MockFormFinder {
    fn discover(&self, _html: &str, intent: FormIntent) -> Result<DiscoveredForm, AppError> {
        *self.calls.lock().unwrap() += 1;
        match &mut *self.result.lock().unwrap() {
            Ok(form) => Ok(form.clone()),
            Err(slot) => Err(slot
                .take()
                .unwrap_or_else(|| AppError::FormNotFound(intent.to_string()))),
        }
    }
}
