//! Declarative per-field extraction strategies.
//!
//! The storefront's markup is unversioned and drifts, so no single
//! selector is trusted. Each field carries an ordered fallback chain: a
//! specific marker attribute first, then a specific class, then a generic
//! text pattern. [`resolve`] walks the chain and accepts the first
//! non-empty result that passes the field's validator. An invalid
//! selector or regex inside a table disables that one strategy, never the
//! field.

use regex::Regex;
use scraper::{ElementRef, Selector};

/// One way of pulling a field value out of a DOM scope.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// An attribute of the first element matching `selector`.
    Attr {
        selector: &'static str,
        attr: &'static str,
    },
    /// The whitespace-collapsed text of the first element matching
    /// `selector`.
    Text { selector: &'static str },
    /// Like `Attr`, then capture group 1 of `pattern` applied to the
    /// attribute value.
    AttrPattern {
        selector: &'static str,
        attr: &'static str,
        pattern: &'static str,
    },
    /// Like `Text`, then capture group 1 of `pattern`.
    TextPattern {
        selector: &'static str,
        pattern: &'static str,
    },
}

/// A field and its ordered strategy chain.
pub struct FieldSpec {
    pub name: &'static str,
    pub strategies: &'static [Strategy],
    /// Accepts the candidate value. Candidates are already trimmed and
    /// non-empty when this runs.
    pub validate: fn(&str) -> bool,
}

/// Validator: any non-empty value (the default).
pub fn any(_: &str) -> bool {
    true
}

/// Validator: must contain at least one digit (prices, quantities, ids).
pub fn numeric_like(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

/// Walk the strategy chain; first non-empty, validator-passing result
/// wins.
pub fn resolve(scope: ElementRef<'_>, spec: &FieldSpec) -> Option<String> {
    for strategy in spec.strategies {
        if let Some(value) = apply(scope, strategy) {
            let value = value.trim().to_string();
            if !value.is_empty() && (spec.validate)(&value) {
                return Some(value);
            }
        }
    }
    tracing::trace!(field = spec.name, "All extraction strategies exhausted");
    None
}

fn apply(scope: ElementRef<'_>, strategy: &Strategy) -> Option<String> {
    match strategy {
        Strategy::Attr { selector, attr } => first_match(scope, selector)?
            .value()
            .attr(attr)
            .map(str::to_string),
        Strategy::Text { selector } => Some(collapse_ws(&text_of(first_match(scope, selector)?))),
        Strategy::AttrPattern {
            selector,
            attr,
            pattern,
        } => {
            let raw = first_match(scope, selector)?.value().attr(attr)?.to_string();
            capture(pattern, &raw)
        }
        Strategy::TextPattern { selector, pattern } => {
            let raw = collapse_ws(&text_of(first_match(scope, selector)?));
            capture(pattern, &raw)
        }
    }
}

/// First element matching `selector` within the scope, the scope element
/// itself included (listing cards often carry their own marker
/// attributes).
pub fn first_match<'a>(scope: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let sel = parse_selector(selector)?;
    if sel.matches(&scope) {
        return Some(scope);
    }
    scope.select(&sel).next()
}

/// All elements matching `selector` within the scope.
pub fn all_matches<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match parse_selector(selector) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::warn!(selector = %selector, error = %e, "Invalid selector in strategy table");
            None
        }
    }
}

fn capture(pattern: &str, haystack: &str) -> Option<String> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid pattern in strategy table");
            return None;
        }
    };
    re.captures(haystack)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Concatenated text content of an element.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_ws(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
