use crate::errors::{AppError, ResultExt};
use crate::models::{ProviderConfig, ProviderKind};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Fixed file name of the persisted provider selection.
pub const PROVIDER_CONFIG_FILE: &str = "api_config.json";

/// Provider identity plus the credential to call it with.
///
/// Built per request from a config snapshot and handed to the orchestrator,
/// so edits made while a call is in flight never affect that call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub kind: ProviderKind,
    pub api_key: String,
}

impl ResolvedProvider {
    /// Picks the credential for the selected provider.
    ///
    /// Gemini always uses the server key; Cerebras uses the stored user key.
    pub fn resolve(config: &ProviderConfig, gemini_api_key: &str) -> Result<Self, AppError> {
        let api_key = match config.provider {
            ProviderKind::Gemini => gemini_api_key.to_string(),
            ProviderKind::Cerebras => config.api_key.trim().to_string(),
        };

        if api_key.is_empty() {
            return Err(AppError::InvalidCredential {
                provider: config.provider,
            });
        }

        Ok(Self {
            kind: config.provider,
            api_key,
        })
    }
}

/// File-backed provider selection, persisted across restarts.
pub struct ProviderStore {
    path: PathBuf,
    current: RwLock<ProviderConfig>,
}

impl ProviderStore {
    /// Loads the stored selection from `dir`, defaulting to Gemini when the
    /// file is missing or unreadable.
    pub async fn open(dir: &Path) -> Self {
        let path = dir.join(PROVIDER_CONFIG_FILE);
        let current = Self::read_file(&path).await;
        tracing::info!("Active provider: {}", current.provider);

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    async fn read_file(path: &Path) -> ProviderConfig {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<ProviderConfig>(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable provider config {}: {}",
                        path.display(),
                        e
                    );
                    ProviderConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProviderConfig::default(),
            Err(e) => {
                tracing::warn!("Failed to read provider config {}: {}", path.display(), e);
                ProviderConfig::default()
            }
        }
    }

    /// Owned copy of the current selection.
    pub async fn snapshot(&self) -> ProviderConfig {
        self.current.read().await.clone()
    }

    /// Replaces the selection and writes it to disk.
    pub async fn save(&self, config: ProviderConfig) -> Result<ProviderConfig, AppError> {
        let serialized = serde_json::to_string_pretty(&config)
            .map_err(|e| AppError::InternalError(format!("Failed to encode config: {}", e)))?;

        let mut current = self.current.write().await;
        tokio::fs::write(&self.path, serialized)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        *current = config.clone();

        tracing::info!("Provider switched to {}", config.provider);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_defaults_to_gemini() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProviderStore::open(dir.path()).await;
        assert_eq!(store.snapshot().await, ProviderConfig::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_defaults_to_gemini() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROVIDER_CONFIG_FILE), "{not json").unwrap();
        let store = ProviderStore::open(dir.path()).await;
        assert_eq!(store.snapshot().await.provider, ProviderKind::Gemini);
    }

    #[tokio::test]
    async fn test_save_persists_flat_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProviderStore::open(dir.path()).await;
        store
            .save(ProviderConfig {
                provider: ProviderKind::Cerebras,
                api_key: "csk-1".to_string(),
            })
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join(PROVIDER_CONFIG_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({"provider": "cerebras", "apiKey": "csk-1"}));

        let reopened = ProviderStore::open(dir.path()).await;
        assert_eq!(reopened.snapshot().await.provider, ProviderKind::Cerebras);
    }

    #[test]
    fn test_gemini_ignores_stored_key() {
        let config = ProviderConfig {
            provider: ProviderKind::Gemini,
            api_key: "user-key".to_string(),
        };
        let resolved = ResolvedProvider::resolve(&config, "server-key").unwrap();
        assert_eq!(resolved.api_key, "server-key");
    }

    #[test]
    fn test_cerebras_requires_key() {
        let config = ProviderConfig {
            provider: ProviderKind::Cerebras,
            api_key: "  ".to_string(),
        };
        let err = ResolvedProvider::resolve(&config, "server-key").unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidCredential {
                provider: ProviderKind::Cerebras
            }
        ));
    }
}
