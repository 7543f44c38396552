// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution
//
// Builds one adapter per configured (provider, model) pair and resolves
// model aliases to them. A call goes to exactly one adapter, once; failures
// surface to the caller unchanged so the audit log records what happened.

use crate::domain::config::{LLMProviderConfig, ModelConfig};
use crate::domain::llm::{
    ChatMessage, GenerationOptions, GenerationResponse, LLMError, LLMGateway, LLMProvider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

struct AliasTarget {
    provider_name: String,
    model: String,
    adapter: Arc<dyn LLMProvider>,
}

pub struct ProviderRegistry {
    aliases: HashMap<String, AliasTarget>,
}

impl ProviderRegistry {
    pub fn from_config(providers: &[LLMProviderConfig]) -> anyhow::Result<Self> {
        let mut aliases = HashMap::new();

        info!("Initializing LLM provider registry");

        for provider_config in providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            let api_key = match Self::resolve_api_key(&provider_config.api_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                    continue;
                }
            };

            for model_config in &provider_config.models {
                match Self::create_provider(provider_config, model_config, &api_key) {
                    Ok(adapter) => {
                        info!(
                            "Mapping alias '{}' -> {} ({})",
                            model_config.alias, model_config.model, provider_config.name
                        );
                        if aliases.contains_key(&model_config.alias) {
                            warn!(
                                "Alias '{}' redefined by provider '{}'",
                                model_config.alias, provider_config.name
                            );
                        }
                        aliases.insert(
                            model_config.alias.clone(),
                            AliasTarget {
                                provider_name: provider_config.name.clone(),
                                model: model_config.model.clone(),
                                adapter,
                            },
                        );
                    }
                    Err(e) => {
                        warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                    }
                }
            }
        }

        if aliases.is_empty() {
            warn!("No LLM providers configured - command analysis will fail until one is added");
        }

        Ok(Self { aliases })
    }

    /// Registry with an explicit adapter per alias
    pub fn with_providers(entries: Vec<(String, Arc<dyn LLMProvider>)>) -> Self {
        let aliases = entries
            .into_iter()
            .map(|(alias, adapter)| {
                (
                    alias.clone(),
                    AliasTarget {
                        provider_name: "custom".to_string(),
                        model: alias,
                        adapter,
                    },
                )
            })
            .collect();
        Self { aliases }
    }

    fn create_provider(
        config: &LLMProviderConfig,
        model: &ModelConfig,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let endpoint = config.endpoint.clone();
        let provider: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            "openai" | "openai-compatible" => Arc::new(OpenAIAdapter::new(
                endpoint,
                api_key.to_string(),
                model.model.clone(),
            )),
            "ollama" => Arc::new(OllamaAdapter::new(endpoint, model.model.clone())),
            "anthropic" => Arc::new(AnthropicAdapter::new(
                endpoint,
                api_key.to_string(),
                model.model.clone(),
            )),
            _ => anyhow::bail!("Unsupported provider type: {}", config.provider_type),
        };

        Ok(provider)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
        match key.as_deref() {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(k.to_string()),
            },
            // Local providers without auth
            None => Ok(String::new()),
        }
    }

    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();

        for (alias, target) in &self.aliases {
            info!("Health checking provider '{}' for alias '{}'", target.provider_name, alias);
            results.insert(alias.clone(), target.adapter.health_check().await);
        }

        results
    }

    pub fn available_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.aliases.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }
}

#[async_trait]
impl LLMGateway for ProviderRegistry {
    async fn generate(
        &self,
        model_alias: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let target = self.aliases.get(model_alias).ok_or_else(|| {
            LLMError::ModelNotFound(format!("Model alias '{}' not found", model_alias))
        })?;

        debug!(
            alias = model_alias,
            provider = %target.provider_name,
            model = %target.model,
            "Dispatching generation"
        );

        target.adapter.generate(messages, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ollama_config() -> LLMProviderConfig {
        LLMProviderConfig {
            name: "local".to_string(),
            provider_type: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            enabled: true,
            models: vec![
                ModelConfig {
                    alias: "default".to_string(),
                    model: "llama3.2".to_string(),
                    context_window: Some(8192),
                },
                ModelConfig {
                    alias: "fast".to_string(),
                    model: "qwen2.5:0.5b".to_string(),
                    context_window: None,
                },
            ],
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = ProviderRegistry::from_config(&[ollama_config()]).unwrap();
        assert!(registry.has_alias("default"));
        assert!(registry.has_alias("fast"));
        assert_eq!(registry.available_aliases(), vec!["default", "fast"]);
    }

    #[test]
    fn test_disabled_and_unknown_providers_are_skipped() {
        let mut disabled = ollama_config();
        disabled.enabled = false;
        let mut unknown = ollama_config();
        unknown.provider_type = "mystery".to_string();

        let registry = ProviderRegistry::from_config(&[disabled, unknown]).unwrap();
        assert!(registry.available_aliases().is_empty());
    }

    struct FailingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LLMError::RateLimit)
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generate_does_not_retry() {
        let provider = Arc::new(FailingProvider {
            calls: AtomicUsize::new(0),
        });
        let registry = ProviderRegistry::with_providers(vec![(
            "default".to_string(),
            provider.clone() as Arc<dyn LLMProvider>,
        )]);

        let result = registry
            .generate("default", &[ChatMessage::user("hi")], &GenerationOptions::default())
            .await;

        assert!(matches!(result, Err(LLMError::RateLimit)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = ProviderRegistry::with_providers(vec![]);
        let result = registry
            .generate("missing", &[ChatMessage::user("hi")], &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(LLMError::ModelNotFound(_))));
    }
}
