//! Form discovery for the mutation fallback path.
//!
//! Given a served page and a mutation intent, locate the matching
//! `<form>`, read its action and hidden fields, and hand them to the
//! mutator. The target site rejects submissions without its anti-forgery
//! token, so discovery that cannot find one is a hard error.

use larder_core::error::AppError;
use larder_core::transport::{DiscoveredForm, FormFinder, FormIntent, Method};
use scraper::{ElementRef, Html, Selector};

/// Hidden field names the site uses for its anti-forgery token.
const TOKEN_FIELDS: &[&str] = &[
    "csrf_token",
    "_token",
    "_csrf",
    "__RequestVerificationToken",
    "authenticity_token",
];

/// How a form is recognized as serving an intent. Action keywords are
/// substring matches against the action URL, marker fields are input
/// names expected inside the form.
struct IntentProfile {
    action_keywords: &'static [&'static str],
    marker_fields: &'static [&'static str],
}

const fn profile(intent: FormIntent) -> IntentProfile {
    match intent {
        FormIntent::Login => IntentProfile {
            action_keywords: &["login", "signin", "prihlaseni"],
            marker_fields: &["password", "email", "username"],
        },
        FormIntent::AddToCart => IntentProfile {
            action_keywords: &["cart/add", "add-to-cart", "kosik"],
            marker_fields: &["productId", "product_id", "quantity"],
        },
        FormIntent::UpdateCart => IntentProfile {
            action_keywords: &["cart/update", "cart"],
            marker_fields: &["quantity"],
        },
        FormIntent::RemoveFromCart => IntentProfile {
            action_keywords: &["cart/remove", "remove", "delete"],
            marker_fields: &["productId", "product_id"],
        },
        FormIntent::Checkout => IntentProfile {
            action_keywords: &["checkout", "order", "objednavka"],
            marker_fields: &[],
        },
        FormIntent::SaveAddress => IntentProfile {
            action_keywords: &["address", "adresa"],
            marker_fields: &["street", "city"],
        },
        FormIntent::SelectSlot => IntentProfile {
            action_keywords: &["slot", "delivery", "doprava"],
            marker_fields: &["slotId", "slot_id"],
        },
    }
}

/// Scores `<form>` elements against an [`IntentProfile`] and extracts
/// the winner's hidden fields.
#[derive(Debug, Clone, Default)]
pub struct HtmlFormFinder;

impl HtmlFormFinder {
    pub fn new() -> Self {
        Self
    }
}

impl FormFinder for HtmlFormFinder {
    fn discover(&self, html: &str, intent: FormIntent) -> Result<DiscoveredForm, AppError> {
        let doc = Html::parse_document(html);
        let profile = profile(intent);

        let form_sel = Selector::parse("form").map_err(|e| {
            // "form" always parses; guard against scraper changes anyway.
            AppError::FormNotFound(format!("{intent}: {e}"))
        })?;

        let mut best: Option<(u32, ElementRef<'_>)> = None;
        for form in doc.select(&form_sel) {
            let score = score_form(form, &profile);
            if score > 0 && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, form));
            }
        }
        let (score, form) = best.ok_or_else(|| AppError::FormNotFound(intent.to_string()))?;
        tracing::debug!(intent = %intent, score, "Selected form");

        let fields = hidden_fields(form);
        if !fields
            .iter()
            .any(|(name, _)| TOKEN_FIELDS.iter().any(|t| t.eq_ignore_ascii_case(name)))
        {
            return Err(AppError::CsrfTokenMissing);
        }

        Ok(DiscoveredForm {
            action: form.value().attr("action").unwrap_or_default().to_string(),
            method: form_method(form),
            fields,
        })
    }
}

fn score_form(form: ElementRef<'_>, profile: &IntentProfile) -> u32 {
    let mut score = 0;
    let action = form
        .value()
        .attr("action")
        .unwrap_or_default()
        .to_ascii_lowercase();
    for keyword in profile.action_keywords {
        if action.contains(keyword) {
            score += 2;
        }
    }
    let hint = format!(
        "{} {}",
        form.value().attr("id").unwrap_or_default(),
        form.value().attr("class").unwrap_or_default()
    )
    .to_ascii_lowercase();
    for keyword in profile.action_keywords {
        if hint.contains(keyword) {
            score += 1;
        }
    }
    let names: Vec<String> = input_names(form);
    for marker in profile.marker_fields {
        if names.iter().any(|n| n.eq_ignore_ascii_case(marker)) {
            score += 1;
        }
    }
    score
}

fn input_names(form: ElementRef<'_>) -> Vec<String> {
    match Selector::parse("input[name], select[name], textarea[name]") {
        Ok(sel) => form
            .select(&sel)
            .filter_map(|el| el.value().attr("name").map(str::to_string))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Hidden inputs in document order, the payload a plain submission of
/// the untouched form would carry.
fn hidden_fields(form: ElementRef<'_>) -> Vec<(String, String)> {
    match Selector::parse("input[type='hidden'][name]") {
        Ok(sel) => form
            .select(&sel)
            .map(|el| {
                (
                    el.value().attr("name").unwrap_or_default().to_string(),
                    el.value().attr("value").unwrap_or_default().to_string(),
                )
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn form_method(form: ElementRef<'_>) -> Method {
    match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => Method::Post,
        _ => Method::Get,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CART_PAGE: &str = r#"
        <form action="/search" method="get">
            <input name="q">
        </form>
        <form action="/cart/add" method="post">
            <input type="hidden" name="csrf_token" value="tok-1">
            <input type="hidden" name="returnUrl" value="/42-milk">
            <input type="hidden" name="productId" value="42">
            <input type="number" name="quantity" value="1">
        </form>"#;

    #[test]
    fn picks_the_matching_form_and_reads_hidden_fields() {
        let form = HtmlFormFinder::new()
            .discover(CART_PAGE, FormIntent::AddToCart)
            .unwrap();
        assert_eq!(form.action, "/cart/add");
        assert_eq!(form.method, Method::Post);
        assert_eq!(
            form.fields,
            vec![
                ("csrf_token".to_string(), "tok-1".to_string()),
                ("returnUrl".to_string(), "/42-milk".to_string()),
                ("productId".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn login_form_found_by_markers_without_action_keyword() {
        let html = r#"
            <form action="/session" method="post" id="login-form">
                <input type="hidden" name="_token" value="t">
                <input type="email" name="email">
                <input type="password" name="password">
            </form>"#;
        let form = HtmlFormFinder::new()
            .discover(html, FormIntent::Login)
            .unwrap();
        assert_eq!(form.action, "/session");
        assert_eq!(form.fields, vec![("_token".to_string(), "t".to_string())]);
    }

    #[test]
    fn missing_token_is_a_hard_error() {
        let html = r#"
            <form action="/cart/add" method="post">
                <input type="hidden" name="productId" value="42">
            </form>"#;
        let err = HtmlFormFinder::new()
            .discover(html, FormIntent::AddToCart)
            .unwrap_err();
        assert!(matches!(err, AppError::CsrfTokenMissing));
    }

    #[test]
    fn no_candidate_form_reports_the_intent() {
        let html = r#"<form action="/search"><input name="q"></form>"#;
        let err = HtmlFormFinder::new()
            .discover(html, FormIntent::Checkout)
            .unwrap_err();
        match err {
            AppError::FormNotFound(what) => assert!(what.contains("checkout")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn higher_scoring_form_wins() {
        let html = r#"
            <form action="/cart" method="post">
                <input type="hidden" name="csrf_token" value="a">
            </form>
            <form action="/cart/update" method="post">
                <input type="hidden" name="csrf_token" value="b">
                <input type="number" name="quantity" value="2">
            </form>"#;
        let form = HtmlFormFinder::new()
            .discover(html, FormIntent::UpdateCart)
            .unwrap();
        assert_eq!(form.action, "/cart/update");
    }

    #[test]
    fn token_name_match_is_case_insensitive() {
        let html = r#"
            <form action="/checkout" method="post">
                <input type="hidden" name="__requestverificationtoken" value="x">
            </form>"#;
        let form = HtmlFormFinder::new()
            .discover(html, FormIntent::Checkout)
            .unwrap();
        assert_eq!(form.fields.len(), 1);
    }
}
