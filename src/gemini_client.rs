use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Company, ProviderKind};
use crate::normalize::{finalize_companies, parse_company_payload};
use serde::Deserialize;
use serde_json::{json, Value};

/// Thinking budget granted to the lead generation model.
const THINKING_BUDGET: u32 = 32_768;

/// Client for the Gemini `generateContent` REST endpoint.
///
/// Lead generation uses schema-constrained JSON output; chat uses the
/// Google Search tool and returns grounding citations.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    chat_model: String,
}

/// Web source backing a grounded chat answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: Option<String>,
    pub uri: String,
}

/// Chat answer text plus the sources the model grounded it on.
#[derive(Debug, Clone, Default)]
pub struct GroundedAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    /// Answer text of the first candidate, thought summaries excluded.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Web citations with a URI, in the order the provider listed them.
    fn citations(&self) -> Vec<Citation> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| {
                        let uri = web.uri.as_deref()?.trim();
                        (!uri.is_empty()).then(|| Citation {
                            title: web.title.clone().filter(|t| !t.trim().is_empty()),
                            uri: uri.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Output schema for lead generation.
pub fn company_response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "vatNumber": { "type": "STRING" },
                "address": { "type": "STRING" },
                "city": { "type": "STRING" },
                "province": { "type": "STRING" },
                "industry": { "type": "STRING" },
                "estimatedConsumptionGWh": { "type": "NUMBER" },
                "category": { "type": "STRING" }
            },
            "required": ["name", "industry", "estimatedConsumptionGWh", "category"]
        }
    })
}

impl GeminiClient {
    /// Creates a new `GeminiClient` sharing the given HTTP client.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            chat_model: config.gemini_chat_model.clone(),
        }
    }

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        body: &Value,
    ) -> Result<GenerateContentResponse, AppError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        tracing::info!("Calling Gemini model {}", model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::from_transport(ProviderKind::Gemini, e))?;

        if !response.status().is_success() {
            return Err(AppError::from_provider_response(ProviderKind::Gemini, response).await);
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AppError::from_transport(ProviderKind::Gemini, e))
    }

    /// Generates company records for `prompt` under the output schema.
    pub async fn generate_companies(
        &self,
        api_key: &str,
        prompt: &str,
    ) -> Result<Vec<Company>, AppError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": company_response_schema(),
                "thinkingConfig": { "thinkingBudget": THINKING_BUDGET }
            }
        });

        let response = self.generate_content(api_key, &self.model, &body).await?;
        let items = parse_company_payload(&response.text())?;
        let companies = finalize_companies(
            items,
            ProviderKind::Gemini,
            chrono::Utc::now().timestamp_millis(),
        );

        tracing::info!("Gemini returned {} companies", companies.len());
        Ok(companies)
    }

    /// Answers `message` with Google Search grounding.
    pub async fn chat_with_search(
        &self,
        api_key: &str,
        message: &str,
    ) -> Result<GroundedAnswer, AppError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": message }] }],
            "tools": [{ "google_search": {} }]
        });

        let response = self
            .generate_content(api_key, &self.chat_model, &body)
            .await?;

        Ok(GroundedAnswer {
            text: response.text(),
            citations: response.citations(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_thoughts_and_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "[{\"name\":" },
                    { "text": "\"Acme\"}]" }
                ]}
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "[{\"name\":\"Acme\"}]");
    }

    #[test]
    fn test_no_candidates_is_empty_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.text(), "");
        assert!(response.citations().is_empty());
    }

    #[test]
    fn test_citations_require_uri() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "answer" }] },
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://a.example", "title": "A" } },
                    { "web": { "title": "No link" } },
                    { "retrievedContext": {} },
                    { "web": { "uri": "https://b.example" } }
                ]}
            }]
        }))
        .unwrap();

        assert_eq!(
            response.citations(),
            vec![
                Citation {
                    title: Some("A".to_string()),
                    uri: "https://a.example".to_string()
                },
                Citation {
                    title: None,
                    uri: "https://b.example".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_schema_required_fields() {
        let schema = company_response_schema();
        assert_eq!(
            schema["items"]["required"],
            json!(["name", "industry", "estimatedConsumptionGWh", "category"])
        );
        assert_eq!(
            schema["items"]["properties"]["estimatedConsumptionGWh"]["type"],
            "NUMBER"
        );
    }
}
