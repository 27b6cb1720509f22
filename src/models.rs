use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consumption above this many GWh/year marks a company as a high consumer.
pub const HIGH_CONSUMPTION_THRESHOLD_GWH: f64 = 1.5;

// ============ Companies ============

/// Energy consumption class of a company.
///
/// Always derived from the estimated consumption, never taken from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnergyCategory {
    Low,
    High,
}

impl EnergyCategory {
    /// `High` iff `gwh > 1.5`, `Low` otherwise (NaN included).
    pub fn from_consumption(gwh: f64) -> Self {
        if gwh > HIGH_CONSUMPTION_THRESHOLD_GWH {
            EnergyCategory::High
        } else {
            EnergyCategory::Low
        }
    }
}

/// A lead: one company record as generated or extracted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    /// Synthetic id, unique within the batch that produced it.
    pub id: String,
    /// Company name (never empty).
    pub name: String,
    /// Italian VAT number (P.IVA), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    /// Free-text industry description.
    #[serde(default)]
    pub industry: String,
    /// Estimated annual electricity consumption in GWh (finite, non-negative).
    #[serde(rename = "estimatedConsumptionGWh")]
    pub estimated_consumption_gwh: f64,
    pub category: EnergyCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ============ Search ============

/// The twelve provinces of Lombardy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Province {
    Bergamo,
    Brescia,
    Como,
    Cremona,
    Lecco,
    Lodi,
    Mantova,
    Milano,
    #[serde(rename = "Monza e della Brianza")]
    MonzaBrianza,
    Pavia,
    Sondrio,
    Varese,
}

impl Province {
    pub const ALL: [Province; 12] = [
        Province::Bergamo,
        Province::Brescia,
        Province::Como,
        Province::Cremona,
        Province::Lecco,
        Province::Lodi,
        Province::Mantova,
        Province::Milano,
        Province::MonzaBrianza,
        Province::Pavia,
        Province::Sondrio,
        Province::Varese,
    ];

    /// Italian display name, as used in prompts and on the wire.
    pub fn display_name(&self) -> &'static str {
        match self {
            Province::Bergamo => "Bergamo",
            Province::Brescia => "Brescia",
            Province::Como => "Como",
            Province::Cremona => "Cremona",
            Province::Lecco => "Lecco",
            Province::Lodi => "Lodi",
            Province::Mantova => "Mantova",
            Province::Milano => "Milano",
            Province::MonzaBrianza => "Monza e della Brianza",
            Province::Pavia => "Pavia",
            Province::Sondrio => "Sondrio",
            Province::Varese => "Varese",
        }
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Geographic filter for a lead search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub province: Province,
    /// Target municipality; equals the province name when none was given.
    pub city: String,
    /// Industry hint. Accepted and kept, but not used by the prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

impl SearchFilters {
    pub fn new(province: Province, city: Option<&str>, industry: Option<String>) -> Self {
        let city = city
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| province.display_name().to_string());

        Self {
            province,
            city,
            industry,
        }
    }
}

/// Body of a search request; `city` may be omitted or blank.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub province: Province,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl SearchRequest {
    pub fn into_filters(self) -> SearchFilters {
        SearchFilters::new(self.province, self.city.as_deref(), self.industry)
    }
}

/// Body of a free-text extraction request.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDataRequest {
    pub text: String,
}

// ============ Providers ============

/// Which hosted model answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Cerebras,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Cerebras => "cerebras",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-selected provider plus the optional user-supplied key.
///
/// The key is only meaningful for Cerebras; Gemini always uses the server
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    #[serde(rename = "apiKey", default)]
    pub api_key: String,
}

/// Provider config as returned by the API, with the key masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigView {
    pub provider: ProviderKind,
    pub has_api_key: bool,
    pub api_key_hint: Option<String>,
}

impl From<&ProviderConfig> for ProviderConfigView {
    fn from(config: &ProviderConfig) -> Self {
        let key = config.api_key.trim();
        let api_key_hint = if key.is_empty() {
            None
        } else {
            let tail: String = key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            Some(format!("****{}", tail))
        };

        Self {
            provider: config.provider,
            has_api_key: api_key_hint.is_some(),
            api_key_hint,
        }
    }
}

/// Body of `PUT /api/v1/config`.
///
/// An omitted `apiKey` keeps the stored one, since clients only ever see it
/// masked.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfigUpdate {
    pub provider: ProviderKind,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

impl ProviderConfigUpdate {
    pub fn apply_to(self, current: &ProviderConfig) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider,
            api_key: self
                .api_key
                .map(|k| k.trim().to_string())
                .unwrap_or_else(|| current.api_key.clone()),
        }
    }
}

// ============ Chat ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One entry of the session chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Body of a chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}
