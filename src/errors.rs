use crate::models::ProviderKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The provider rejected the call for rate or quota reasons.
    QuotaExhausted { provider: ProviderKind },
    /// The provider rejected the credential.
    InvalidCredential { provider: ProviderKind },
    /// Any other provider failure, carrying the underlying message.
    ExternalApiError(String),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// The requested operation is already in flight.
    Conflict(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Maps a provider failure to its user-facing class.
    ///
    /// Upstream APIs do not expose a stable error taxonomy, so this inspects
    /// the HTTP status and the message text. Quota wins over credential
    /// problems; anything unrecognised is a generic failure.
    pub fn classify(provider: ProviderKind, status: Option<u16>, message: &str) -> Self {
        let msg = message.to_lowercase();

        if status == Some(429)
            || msg.contains("429")
            || msg.contains("quota")
            || msg.contains("limit")
        {
            return AppError::QuotaExhausted { provider };
        }

        if msg.contains("key") || msg.contains("unauthorized") {
            return AppError::InvalidCredential { provider };
        }

        AppError::ExternalApiError(message.to_string())
    }

    /// Classifies a non-success provider response.
    ///
    /// Both providers wrap details as `{"error": {"message": ...}}`; some
    /// Cerebras errors use a top-level `message`. Falls back to raw text.
    pub async fn from_provider_response(
        provider: ProviderKind,
        response: reqwest::Response,
    ) -> Self {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("{} returned {}", provider, status)
                } else {
                    body.clone()
                }
            });

        tracing::error!("{} returned {}: {}", provider, status, message);
        Self::classify(provider, Some(status.as_u16()), &message)
    }

    /// Classifies a transport-level failure (connect, timeout, body read).
    pub fn from_transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        tracing::error!("{} request failed: {}", provider, err);
        let status = err.status().map(|s| s.as_u16());
        Self::classify(provider, status, &format!("{} request failed: {}", provider, err))
    }

    /// Stable machine-readable class, used by clients to pick a treatment.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::QuotaExhausted { .. } => "quota_exhausted",
            AppError::InvalidCredential { .. } => "invalid_credential",
            AppError::ExternalApiError(_) => "provider_failure",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::InternalError(_) => "internal",
            AppError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Strips context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Message shown to the dashboard user.
    pub fn user_message(&self) -> String {
        match self.root() {
            AppError::QuotaExhausted { provider } => format!(
                "Quota esaurita su {}. Passa all'altro provider o attendi.",
                provider
            ),
            AppError::InvalidCredential { provider } => {
                format!("Chiave API non valida per {}.", provider)
            }
            AppError::ExternalApiError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::QuotaExhausted { provider } => write!(f, "Quota exhausted on {}", provider),
            AppError::InvalidCredential { provider } => {
                write!(f, "Invalid credential for {}", provider)
            }
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and a JSON
    /// body carrying the message and its `kind`.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::QuotaExhausted { provider } => {
                tracing::warn!("Quota exhausted on provider {}", provider);
                (StatusCode::TOO_MANY_REQUESTS, self.user_message())
            }
            AppError::InvalidCredential { provider } => {
                tracing::warn!("Provider {} rejected the credential", provider);
                (StatusCode::UNAUTHORIZED, self.user_message())
            }
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return (*source.clone()).into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    /// A provider answered with JSON we cannot use; the whole call fails.
    fn from(err: serde_json::Error) -> Self {
        AppError::ExternalApiError(format!("Malformed provider response: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for I/O errors (provider config file) to add context.
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::InternalError(e.to_string())),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::InternalError(e.to_string())),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_quota_regardless_of_text() {
        let err = AppError::classify(ProviderKind::Cerebras, Some(429), "Too many requests");
        assert!(matches!(err, AppError::QuotaExhausted { .. }));

        let err = AppError::classify(ProviderKind::Gemini, Some(429), "invalid api key");
        assert!(matches!(err, AppError::QuotaExhausted { .. }));
    }

    #[test]
    fn test_quota_and_limit_text() {
        let err = AppError::classify(ProviderKind::Gemini, Some(400), "Resource QUOTA exceeded");
        assert!(matches!(err, AppError::QuotaExhausted { .. }));

        let err = AppError::classify(ProviderKind::Gemini, None, "Rate limit reached");
        assert!(matches!(err, AppError::QuotaExhausted { .. }));

        let err = AppError::classify(ProviderKind::Gemini, None, "upstream said 429");
        assert!(matches!(err, AppError::QuotaExhausted { .. }));
    }

    #[test]
    fn test_credential_text() {
        let err = AppError::classify(ProviderKind::Cerebras, Some(401), "Wrong API Key provided");
        assert!(matches!(
            err,
            AppError::InvalidCredential {
                provider: ProviderKind::Cerebras
            }
        ));

        let err = AppError::classify(ProviderKind::Cerebras, Some(403), "Unauthorized");
        assert!(matches!(err, AppError::InvalidCredential { .. }));
    }

    #[test]
    fn test_everything_else_is_generic_with_message() {
        let err = AppError::classify(ProviderKind::Gemini, Some(500), "Backend exploded");
        match err {
            AppError::ExternalApiError(msg) => assert_eq!(msg, "Backend exploded"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_context_keeps_kind() {
        let err: Result<(), AppError> = Err(AppError::QuotaExhausted {
            provider: ProviderKind::Gemini,
        });
        let err = err.context("search failed").unwrap_err();
        assert_eq!(err.kind(), "quota_exhausted");
        assert!(matches!(err.root(), AppError::QuotaExhausted { .. }));
    }

    #[test]
    fn test_response_status_mapping() {
        let resp = AppError::QuotaExhausted {
            provider: ProviderKind::Gemini,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = AppError::ExternalApiError("boom".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = AppError::Conflict("busy".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
