//! Turns provider output into canonical `Company` records.
//!
//! Providers disagree on the envelope (bare array, `{"companies": [...]}`,
//! `{"results": [...]}`) and on field types, and their category labels are
//! not trusted. Everything funnels through [`parse_company_payload`] and
//! [`finalize_companies`] so both providers yield the same shape.

use crate::errors::AppError;
use crate::models::{Company, EnergyCategory, ProviderKind};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Accepted response envelopes, tried in declaration order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CompanyPayload {
    /// `[ {...}, ... ]`
    Bare(Vec<Value>),
    /// `{ "companies": [ ... ] }`
    Wrapped { companies: Vec<Value> },
    /// `{ "results": [ ... ] }`
    Results { results: Vec<Value> },
    /// Any other object: no usable records.
    Other(Map<String, Value>),
}

impl CompanyPayload {
    pub fn into_items(self) -> Vec<Value> {
        match self {
            CompanyPayload::Bare(items) => items,
            CompanyPayload::Wrapped { companies } => companies,
            CompanyPayload::Results { results } => results,
            CompanyPayload::Other(map) => {
                tracing::warn!(
                    "Provider returned an object without companies/results (keys: {:?})",
                    map.keys().collect::<Vec<_>>()
                );
                Vec::new()
            }
        }
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("fence pattern is valid")
    })
}

/// Removes a Markdown code fence wrapped around the whole text, if any.
pub fn strip_code_fence(text: &str) -> &str {
    match fence_regex().captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => text,
    }
}

/// Parses provider text into the list of raw record objects.
///
/// Blank text counts as an empty array. Anything that is neither an array
/// nor an object fails the whole call; there is no partial salvage.
pub fn parse_company_payload(text: &str) -> Result<Vec<Value>, AppError> {
    let body = strip_code_fence(text).trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let payload: CompanyPayload = serde_json::from_str(body)?;
    Ok(payload.into_items())
}

/// Numeric cast with a zero fallback.
///
/// Numbers pass through; strings are parsed (a lone `,` is read as the
/// decimal separator). Everything else, and any NaN, infinite or negative
/// result, becomes `0.0`.
pub fn coerce_consumption(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_numeric_text(s),
        _ => 0.0,
    };

    if parsed.is_finite() && parsed >= 0.0 {
        parsed
    } else {
        0.0
    }
}

fn parse_numeric_text(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let candidate = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1)
    } else {
        trimmed.to_string()
    };

    candidate.parse::<f64>().unwrap_or(0.0)
}

/// Reads an optional text field; blanks are treated as absent.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Builds canonical records from raw provider objects.
///
/// Ids are `{provider}-{stamp_ms}-{index}`, unique inside this batch only.
/// Category is always recomputed from the coerced consumption. Entries that
/// are not objects or have no name are dropped.
pub fn finalize_companies(items: Vec<Value>, provider: ProviderKind, stamp_ms: i64) -> Vec<Company> {
    let total = items.len();

    let companies: Vec<Company> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let Value::Object(obj) = item else {
                tracing::warn!("Skipping non-object record at index {}", index);
                return None;
            };

            let Some(name) = text_field(&obj, "name") else {
                tracing::warn!("Skipping record without a name at index {}", index);
                return None;
            };

            let consumption = coerce_consumption(obj.get("estimatedConsumptionGWh"));

            Some(Company {
                id: format!("{}-{}-{}", provider, stamp_ms, index),
                name,
                vat_number: text_field(&obj, "vatNumber"),
                address: text_field(&obj, "address").unwrap_or_default(),
                city: text_field(&obj, "city").unwrap_or_default(),
                province: text_field(&obj, "province").unwrap_or_default(),
                industry: text_field(&obj, "industry").unwrap_or_default(),
                estimated_consumption_gwh: consumption,
                category: EnergyCategory::from_consumption(consumption),
                website: text_field(&obj, "website"),
                phone: text_field(&obj, "phone"),
                email: text_field(&obj, "email"),
            })
        })
        .collect();

    if companies.len() < total {
        tracing::debug!(
            "Normalized {} of {} {} records",
            companies.len(),
            total,
            provider
        );
    }

    companies
}
