use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Company, ProviderKind};
use crate::normalize::{finalize_companies, parse_company_payload};
use crate::prompts::CEREBRAS_SYSTEM_PROMPT;
use serde::Deserialize;
use serde_json::{json, Value};

/// Client for the Cerebras OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct CerebrasClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CerebrasClient {
    /// Creates a new `CerebrasClient` sharing the given HTTP client.
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.cerebras_base_url.trim_end_matches('/').to_string(),
            model: config.cerebras_model.clone(),
        }
    }

    /// Sends one chat-completion request and returns the first choice text.
    async fn complete(&self, api_key: &str, body: &Value) -> Result<String, AppError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::info!("Calling Cerebras model {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::from_transport(ProviderKind::Cerebras, e))?;

        if !response.status().is_success() {
            return Err(AppError::from_provider_response(ProviderKind::Cerebras, response).await);
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_transport(ProviderKind::Cerebras, e))?;

        data.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| {
                AppError::ExternalApiError("Cerebras response contained no choices".to_string())
            })
    }

    /// Generates company records for `prompt` in JSON-object mode.
    ///
    /// The content may be a bare array or wrap it under `companies` or
    /// `results`; consumption is coerced and category recomputed.
    pub async fn generate_companies(
        &self,
        api_key: &str,
        prompt: &str,
    ) -> Result<Vec<Company>, AppError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": CEREBRAS_SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "response_format": { "type": "json_object" }
        });

        let content = self.complete(api_key, &body).await?;
        let items = parse_company_payload(&content)?;
        let companies = finalize_companies(
            items,
            ProviderKind::Cerebras,
            chrono::Utc::now().timestamp_millis(),
        );

        tracing::info!("Cerebras returned {} companies", companies.len());
        Ok(companies)
    }

    /// Plain single-turn chat; no web grounding is available here.
    pub async fn chat(&self, api_key: &str, message: &str) -> Result<String, AppError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": message }]
        });

        self.complete(api_key, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_base_url() {
        let config = Config {
            cerebras_base_url: "https://api.cerebras.ai/".to_string(),
            ..Config::default()
        };
        let client = CerebrasClient::new(reqwest::Client::new(), &config);
        assert_eq!(client.base_url, "https://api.cerebras.ai");
        assert_eq!(client.model, "llama-3.3-70b");
    }

    #[test]
    fn test_null_content_reads_as_empty() {
        let data: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        }))
        .unwrap();
        assert_eq!(data.choices[0].message.content, None);
    }
}
