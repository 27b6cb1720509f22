use crate::cerebras_client::CerebrasClient;
use crate::config::Config;
use crate::errors::AppError;
use crate::gemini_client::{Citation, GeminiClient};
use crate::models::{Company, ProviderKind, SearchFilters};
use crate::prompts;
use crate::provider_store::ResolvedProvider;
use std::time::Duration;

/// Builds prompts and dispatches them to the selected provider.
///
/// The provider is passed explicitly on every call; nothing here reads the
/// stored selection. Provider errors are returned already classified.
#[derive(Clone)]
pub struct InferenceService {
    gemini: GeminiClient,
    cerebras: CerebrasClient,
}

impl InferenceService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create provider HTTP client: {}", e))
            })?;

        Ok(Self {
            gemini: GeminiClient::new(client.clone(), config),
            cerebras: CerebrasClient::new(client, config),
        })
    }

    /// Generates leads for `filters`, asking the model to avoid
    /// `existing_names`.
    pub async fn search_companies(
        &self,
        provider: &ResolvedProvider,
        filters: &SearchFilters,
        existing_names: &[String],
    ) -> Result<Vec<Company>, AppError> {
        tracing::info!(
            "Searching companies in {} ({}) via {}, excluding {} known names",
            filters.city,
            filters.province,
            provider.kind,
            existing_names.len()
        );

        let prompt = prompts::search_prompt(filters, existing_names);
        self.dispatch(provider, &prompt).await
    }

    /// Extracts leads from pasted free text.
    pub async fn process_raw_data(
        &self,
        provider: &ResolvedProvider,
        raw: &str,
    ) -> Result<Vec<Company>, AppError> {
        tracing::info!(
            "Extracting companies from {} chars of raw text via {}",
            raw.len(),
            provider.kind
        );

        let prompt = prompts::raw_data_prompt(raw);
        self.dispatch(provider, &prompt).await
    }

    async fn dispatch(
        &self,
        provider: &ResolvedProvider,
        prompt: &str,
    ) -> Result<Vec<Company>, AppError> {
        match provider.kind {
            ProviderKind::Gemini => {
                self.gemini
                    .generate_companies(&provider.api_key, prompt)
                    .await
            }
            ProviderKind::Cerebras => {
                self.cerebras
                    .generate_companies(&provider.api_key, prompt)
                    .await
            }
        }
    }

    /// Single-turn chat. On Gemini the answer is search-grounded and any
    /// citations are appended as a source list.
    pub async fn chat_with_search(
        &self,
        provider: &ResolvedProvider,
        message: &str,
    ) -> Result<String, AppError> {
        match provider.kind {
            ProviderKind::Gemini => {
                let answer = self
                    .gemini
                    .chat_with_search(&provider.api_key, message)
                    .await?;
                tracing::debug!("Chat answer grounded on {} sources", answer.citations.len());
                Ok(append_citations(answer.text, &answer.citations))
            }
            ProviderKind::Cerebras => self.cerebras.chat(&provider.api_key, message).await,
        }
    }
}

/// Appends a Markdown source list; text is untouched without citations.
pub fn append_citations(mut text: String, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text;
    }

    let sources: String = citations
        .iter()
        .map(|c| format!("\n- [{}]({})", c.title.as_deref().unwrap_or("Source"), c.uri))
        .collect();

    text.push_str("\n\n**Fonti Verificate:**\n");
    text.push_str(&sources);
    text
}
