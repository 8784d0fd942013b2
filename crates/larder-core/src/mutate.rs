//! Dual-path state-changing operations.
//!
//! Every mutation against the storefront runs the same state machine:
//!
//! ```text
//! NotStarted → ApiAttempted → (Success | FormAttempted) → (Success | Failed)
//! ```
//!
//! The structured (JSON) call goes first; if it throws or comes back
//! without a positive success indicator, the mutator fetches a reference
//! page, discovers the matching HTML form (hidden fields and anti-forgery
//! token included), overlays the intent's values, and submits it through
//! the same transport using the method the form declares. A business failure after both
//! paths is a normal return value, not an error — the mutator only errors
//! when form discovery cannot proceed at all.

use url::Url;

use crate::error::AppError;
use crate::transport::{FormFinder, FormIntent, HttpRequest, Method, Transport};

/// States of one mutation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    NotStarted,
    ApiAttempted,
    FormAttempted,
    Success,
    Failed,
}

/// Which path produced the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPath {
    Api,
    Form,
}

/// One exhausted attempt, for the structured failure report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MutationAttempt {
    pub path: MutationPath,
    pub reason: String,
}

/// Unified outcome of a mutation: either which path succeeded, or the
/// list of what was attempted. Never an exception for business failure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MutationOutcome {
    pub succeeded: bool,
    pub path: Option<MutationPath>,
    pub attempts: Vec<MutationAttempt>,
}

/// Everything one mutation intent needs: the structured call, where to
/// look for its success flag, and the form fallback ingredients.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    /// Human-readable intent name, for logging only.
    pub name: String,
    /// The structured (machine-oriented) request, tried first.
    pub api: HttpRequest,
    /// JSON pointer to the boolean success indicator, e.g. `/success`.
    pub success_pointer: String,
    /// Reference page to fetch when falling back to the form path.
    pub form_page: String,
    pub form_intent: FormIntent,
    /// Intent-specific values overlaid onto the discovered hidden fields.
    /// Overlay wins on name collisions; field order is preserved.
    pub overlay: Vec<(String, String)>,
}

/// Orchestrates API-then-form mutations over injected transport and form
/// discovery.
#[derive(Clone)]
pub struct DualPathMutator<T, F>
where
    T: Transport,
    F: FormFinder,
{
    transport: T,
    forms: F,
}

impl<T, F> DualPathMutator<T, F>
where
    T: Transport,
    F: FormFinder,
{
    pub fn new(transport: T, forms: F) -> Self {
        Self { transport, forms }
    }

    /// Run one mutation to a terminal state.
    ///
    /// Guarantee: when the structured path reports success, the form path
    /// is never touched — no reference-page fetch, no discovery, no
    /// submission.
    pub async fn execute(&self, plan: &MutationPlan) -> Result<MutationOutcome, AppError> {
        let mut state = MutationState::NotStarted;
        let mut attempts = Vec::new();
        tracing::debug!(mutation = %plan.name, state = ?state, "Mutation starting");

        // NotStarted → ApiAttempted
        state = MutationState::ApiAttempted;
        tracing::debug!(mutation = %plan.name, state = ?state, "Trying structured call");
        match self.transport.execute(plan.api.clone()).await {
            Ok(response) if api_success(&response.body, &plan.success_pointer) => {
                tracing::info!(mutation = %plan.name, "Structured call succeeded");
                return Ok(MutationOutcome {
                    succeeded: true,
                    path: Some(MutationPath::Api),
                    attempts,
                });
            }
            Ok(response) => {
                tracing::debug!(
                    mutation = %plan.name,
                    status = response.status,
                    "Structured call returned no positive success indicator"
                );
                attempts.push(MutationAttempt {
                    path: MutationPath::Api,
                    reason: format!(
                        "HTTP {} without success indicator at {}",
                        response.status, plan.success_pointer
                    ),
                });
            }
            Err(e) => {
                tracing::debug!(mutation = %plan.name, error = %e, "Structured call failed");
                attempts.push(MutationAttempt {
                    path: MutationPath::Api,
                    reason: e.to_string(),
                });
            }
        }

        // ApiAttempted → FormAttempted
        state = MutationState::FormAttempted;
        tracing::info!(mutation = %plan.name, state = ?state, "Falling back to form submission");

        let reference = match self
            .transport
            .execute(HttpRequest::get(&plan.form_page))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                attempts.push(MutationAttempt {
                    path: MutationPath::Form,
                    reason: format!("reference page fetch failed: {e}"),
                });
                return Ok(failed(attempts, plan));
            }
        };

        // Discovery errors (missing token, no form) mean the fallback
        // cannot proceed at all: propagate instead of soft-failing.
        let form = self.forms.discover(&reference.body, plan.form_intent)?;

        let action = resolve_action(&plan.form_page, &form.action)?;
        let fields = overlay_fields(form.fields, &plan.overlay);
        let submission = form_submission(form.method, action, fields)?;

        match self.transport.execute(submission).await {
            Ok(response) if response.is_success() => {
                debug_assert_eq!(state, MutationState::FormAttempted);
                tracing::info!(mutation = %plan.name, state = ?MutationState::Success, "Form submission succeeded");
                Ok(MutationOutcome {
                    succeeded: true,
                    path: Some(MutationPath::Form),
                    attempts,
                })
            }
            Ok(response) => {
                attempts.push(MutationAttempt {
                    path: MutationPath::Form,
                    reason: format!("form submission returned HTTP {}", response.status),
                });
                Ok(failed(attempts, plan))
            }
            Err(e) => {
                attempts.push(MutationAttempt {
                    path: MutationPath::Form,
                    reason: e.to_string(),
                });
                Ok(failed(attempts, plan))
            }
        }
    }
}

fn failed(attempts: Vec<MutationAttempt>, plan: &MutationPlan) -> MutationOutcome {
    tracing::warn!(
        mutation = %plan.name,
        attempts = attempts.len(),
        "Mutation failed on both paths"
    );
    MutationOutcome {
        succeeded: false,
        path: None,
        attempts,
    }
}

/// A structured response counts as success only on an explicit positive
/// indicator: a JSON body with `true` at the configured pointer.
fn api_success(body: &str, pointer: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer(pointer).cloned())
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Resolve a (possibly relative) form action against the reference page.
fn resolve_action(form_page: &str, action: &str) -> Result<String, AppError> {
    let base = Url::parse(form_page).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
    if action.is_empty() {
        // An empty action submits back to the page itself.
        return Ok(base.to_string());
    }
    base.join(action)
        .map(|u| u.to_string())
        .map_err(|e| AppError::InvalidUrl(e.to_string()))
}

/// Submit the fields the way the form declares: POST carries them
/// form-encoded, GET carries them as query parameters on the action URL.
fn form_submission(
    method: Method,
    action: String,
    fields: Vec<(String, String)>,
) -> Result<HttpRequest, AppError> {
    match method {
        Method::Post => Ok(HttpRequest::post_form(action, fields)),
        Method::Get => {
            let mut url = Url::parse(&action).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
            url.query_pairs_mut()
                .extend_pairs(fields.iter().map(|(n, v)| (n.as_str(), v.as_str())));
            Ok(HttpRequest::get(url.to_string()))
        }
    }
}

/// Overlay intent values onto discovered fields. Collisions replace in
/// place so the form's field order survives; new fields append.
fn overlay_fields(
    mut fields: Vec<(String, String)>,
    overlay: &[(String, String)],
) -> Vec<(String, String)> {
    for (name, value) in overlay {
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.clone(),
            None => fields.push((name.clone(), value.clone())),
        }
    }
    fields
}
