//! Provider detection and endpoint layout.
//!
//! All supported backends speak the Chat Completions wire format; they differ
//! in URL layout and how the API key is presented.

const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Supported LLM providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// Deployment name (required for Azure)
        deployment_name: String,
        /// API version (e.g., "2024-08-01-preview")
        api_version: String,
    },
    /// Ollama's OpenAI-compatible endpoint (port 11434)
    Ollama,
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openai.azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("api.openai.com") {
            Self::OpenAI
        } else if lower.contains(":11434") || lower.contains("ollama") {
            Self::Ollama
        } else {
            Self::Generic
        }
    }

    /// Fill in Azure deployment details; other providers are returned unchanged.
    #[must_use]
    pub fn with_azure_deployment(
        self,
        deployment_name: Option<String>,
        api_version: Option<String>,
    ) -> Self {
        match (self, deployment_name) {
            (Self::AzureOpenAI { .. }, Some(deployment_name)) => Self::AzureOpenAI {
                deployment_name,
                api_version: api_version
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            (provider, _) => provider,
        }
    }

    /// Build the chat completions URL for this provider.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Whether the key goes in an `api-key` header instead of bearer auth.
    #[must_use]
    pub fn uses_api_key_header(&self) -> bool {
        matches!(self, Self::AzureOpenAI { .. })
    }
}
