//! Normalization of free-form selection input.

use crate::error::{Error, Result};

/// Physical delivery methods the catalogs use, including the placeholder
/// for rows whose method column is blank.
const ALL_METHODS: [&str; 8] = [
    "streamed",
    "telemetered",
    "recovered",
    "recovered_host",
    "recovered_inst",
    "recovered_wfp",
    "recovered_cspp",
    "no_method",
];

/// Logical method tokens accepted from users.
const VALID_METHOD_INPUTS: [&str; 3] = ["streamed", "telemetered", "recovered"];

const RECOVERED_VARIANTS: [&str; 4] = [
    "recovered_host",
    "recovered_inst",
    "recovered_wfp",
    "recovered_cspp",
];

/// Selection criteria for catalog filtering, one list per dimension.
///
/// An empty list places no restriction on its dimension. Instrument tokens
/// may be partial (`CTD` matches any sensor containing it); the other
/// dimensions are exact memberships. `delivery_methods` holds the logical
/// tokens as entered; [`define_methods`] expands them before filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub arrays: Vec<String>,
    pub subsites: Vec<String>,
    pub nodes: Vec<String>,
    pub instruments: Vec<String>,
    pub delivery_methods: Vec<String>,
}

impl SelectionCriteria {
    /// Build criteria from raw user input, one free-form string per
    /// dimension. See [`parse_input_list`] for the accepted shapes.
    pub fn from_inputs(
        arrays: &str,
        subsites: &str,
        nodes: &str,
        instruments: &str,
        delivery_methods: &str,
    ) -> Self {
        Self {
            arrays: parse_input_list(arrays),
            subsites: parse_input_list(subsites),
            nodes: parse_input_list(nodes),
            instruments: parse_input_list(instruments),
            delivery_methods: parse_input_list(delivery_methods),
        }
    }
}

/// Parse one free-form selection string into tokens.
///
/// Accepts, in order: an empty string (no restriction), a bracketed list or
/// parenthesized tuple of quoted tokens (`['CP','CE']`, `("GI01SUMO",)`), a
/// comma-separated run, or a single bare token. Input that fails the
/// collection scan falls through to the comma and bare-token rules and is
/// carried as opaque text for later filtering to reject.
pub fn parse_input_list(input: &str) -> Vec<String> {
    let s = input.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if let Some(elements) = parse_quoted_collection(s) {
        return elements;
    }
    if s.contains(',') {
        return s.split(',').map(|t| t.trim().to_string()).collect();
    }
    vec![s.to_string()]
}

/// Scan a bracketed list or parenthesized tuple of quoted tokens.
///
/// Returns `None` unless the whole input is one collection literal whose
/// elements are all single- or double-quoted strings; a trailing comma is
/// allowed. This is a scanner, not an expression evaluator.
fn parse_quoted_collection(s: &str) -> Option<Vec<String>> {
    let inner = s
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .or_else(|| s.strip_prefix('(').and_then(|r| r.strip_suffix(')')))?;

    let mut elements = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let quote = rest.chars().next()?;
        if quote != '\'' && quote != '"' {
            return None;
        }
        let body = &rest[1..];
        let close = body.find(quote)?;
        elements.push(body[..close].to_string());
        rest = body[close + 1..].trim_start();
        match rest.strip_prefix(',') {
            Some(r) => rest = r.trim_start(),
            None if rest.is_empty() => break,
            None => return None,
        }
    }
    Some(elements)
}

/// Expand logical delivery-method tokens to the physical method set.
///
/// An empty selection expands to every method the catalogs use, including
/// `no_method`. `recovered` expands to its four physical variants. Tokens
/// outside the logical set are rejected.
pub fn define_methods(delivery_methods: &[String]) -> Result<Vec<String>> {
    if delivery_methods.is_empty() {
        return Ok(ALL_METHODS.iter().map(|m| m.to_string()).collect());
    }
    let mut methods = Vec::new();
    for d in delivery_methods {
        if !VALID_METHOD_INPUTS.contains(&d.as_str()) {
            return Err(Error::InvalidInput(format!(
                "invalid delivery method (expected streamed, telemetered, or recovered): {d}"
            )));
        }
        if d == "recovered" {
            methods.extend(RECOVERED_VARIANTS.iter().map(|m| m.to_string()));
        } else {
            methods.push(d.clone());
        }
    }
    Ok(methods)
}
