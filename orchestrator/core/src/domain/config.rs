// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Warden Configuration Manifest
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing a
// single Warden deployment:
// - The admin principal
// - LLM providers and the model alias used for command analysis
// - Backup sources, retention and cadence
// - Extra policy rules appended to the built-in table
// - Storage backend and logging

use crate::domain::policy::RuleDefinition;
use crate::domain::repository::{PostgresConfig, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "warden.dev/v1";
pub const KIND: &str = "WardenConfig";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfigManifest {
    /// API version (must be "warden.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "WardenConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: WardenConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name, shown in logs
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfigSpec {
    #[serde(default)]
    pub principal: PrincipalConfig,

    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrincipalConfig {
    /// The one identity allowed to issue commands (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
}

impl PrincipalConfig {
    /// Admin id with any `env:` indirection resolved. `None` when unset,
    /// empty, or pointing at a missing variable.
    pub fn resolved_admin_id(&self) -> Option<String> {
        let raw = self.admin_id.as_deref()?.trim();
        let value = match raw.strip_prefix("env:") {
            Some(var) => std::env::var(var).ok()?,
            None => raw.to_string(),
        };
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// "ollama", "openai", "anthropic" or "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias used by commands (e.g., "default", "fast")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,

    #[serde(default)]
    pub context_window: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Alias used when a command does not name one
    #[serde(default = "default_model_alias")]
    pub default_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory the include paths are relative to
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Paths under `source_root` to copy
    #[serde(default = "default_include_paths")]
    pub include_paths: Vec<String>,

    /// Directory or file names skipped wherever they appear
    #[serde(default = "default_exclude_names")]
    pub exclude_names: Vec<String>,

    #[serde(default = "default_snapshot_root")]
    pub snapshot_root: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_true")]
    pub hourly_enabled: bool,

    #[serde(default = "default_hourly_interval", with = "humantime_serde")]
    pub hourly_interval: Duration,

    #[serde(default = "default_true")]
    pub daily_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    /// Appended after the built-in rule table
    #[serde(default)]
    pub additional_rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}

fn default_model_alias() -> String {
    "default".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.3
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_include_paths() -> Vec<String> {
    vec!["src".to_string(), "config".to_string(), "data".to_string()]
}

fn default_exclude_names() -> Vec<String> {
    vec!["target".to_string(), "node_modules".to_string(), ".git".to_string()]
}

fn default_snapshot_root() -> PathBuf {
    PathBuf::from("./backups")
}

fn default_retention_days() -> u32 {
    30
}

fn default_hourly_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            default_model: default_model_alias(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            include_paths: default_include_paths(),
            exclude_names: default_exclude_names(),
            snapshot_root: default_snapshot_root(),
            retention_days: default_retention_days(),
            hourly_enabled: true,
            hourly_interval: default_hourly_interval(),
            daily_enabled: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            connection_string: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for WardenConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "warden".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: WardenConfigSpec::default(),
        }
    }
}

impl WardenConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. WARDEN_CONFIG_PATH environment variable
    /// 2. ./warden-config.yaml (working directory)
    /// 3. ~/.warden/config.yaml (user home)
    /// 4. /etc/warden/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WARDEN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./warden-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".warden").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/warden/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides on top of the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARDEN_ADMIN_ID") {
            tracing::info!("Environment override: WARDEN_ADMIN_ID");
            self.spec.principal.admin_id = Some(val);
        }

        if let Ok(val) = std::env::var("WARDEN_SOURCE_ROOT") {
            tracing::info!("Environment override: WARDEN_SOURCE_ROOT={}", val);
            self.spec.backup.source_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WARDEN_SNAPSHOT_ROOT") {
            tracing::info!("Environment override: WARDEN_SNAPSHOT_ROOT={}", val);
            self.spec.backup.snapshot_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WARDEN_RETENTION_DAYS") {
            match val.parse::<u32>() {
                Ok(days) => {
                    tracing::info!("Environment override: WARDEN_RETENTION_DAYS={}", days);
                    self.spec.backup.retention_days = days;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for WARDEN_RETENTION_DAYS: '{}'. Expected a whole number of days. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("WARDEN_DATABASE_URL") {
            tracing::info!("Environment override: WARDEN_DATABASE_URL");
            self.spec.storage.backend = "postgres".to_string();
            self.spec.storage.connection_string = Some(val);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        for provider in &self.spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }

            if provider.endpoint.is_empty() {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }

            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }

            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }

                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        if !self.spec.llm_providers.is_empty() {
            let alias = &self.spec.llm_selection.default_model;
            let known = self
                .spec
                .llm_providers
                .iter()
                .flat_map(|p| p.models.iter())
                .any(|m| &m.alias == alias);
            if !known {
                anyhow::bail!("Default model alias '{}' not found in llm_providers", alias);
            }
        }

        let backup = &self.spec.backup;
        if backup.retention_days == 0 {
            anyhow::bail!("spec.backup.retention_days must be at least 1");
        }

        if backup.hourly_interval.is_zero() {
            anyhow::bail!("spec.backup.hourly_interval must be greater than zero");
        }

        if backup.include_paths.is_empty() {
            anyhow::bail!("spec.backup.include_paths must list at least one path");
        }

        use crate::domain::path_sanitizer::PathSanitizer;
        let sanitizer = PathSanitizer::new();
        let snapshot_root = PathSanitizer::comparable(&backup.snapshot_root);
        for include in &backup.include_paths {
            let resolved = sanitizer
                .resolve_include(&backup.source_root, include)
                .map_err(|e| anyhow::anyhow!("Invalid include path '{}': {}", include, e))?;
            let resolved = PathSanitizer::comparable(&resolved);
            if PathSanitizer::is_within(&snapshot_root, &resolved) {
                anyhow::bail!(
                    "spec.backup.snapshot_root {} lies inside include path '{}'",
                    backup.snapshot_root.display(),
                    include
                );
            }
            if PathSanitizer::is_within(&resolved, &snapshot_root) {
                anyhow::bail!("Include path '{}' lies inside the snapshot root", include);
            }
        }

        for rule in &self.spec.policy.additional_rules {
            crate::domain::policy::PolicyRule::compile(rule)?;
        }

        self.storage_backend()?;

        Ok(())
    }

    /// Retention window as a chrono duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.spec.backup.retention_days))
    }

    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.spec.storage.backend.as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::InMemory),
            "postgres" | "postgresql" => {
                let raw = self
                    .spec
                    .storage
                    .connection_string
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.connection_string is required for postgres"))?;
                let connection_string = match raw.strip_prefix("env:") {
                    Some(var) => std::env::var(var)
                        .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var))?,
                    None => raw.to_string(),
                };
                Ok(StorageBackend::PostgreSQL(PostgresConfig { connection_string }))
            }
            other => anyhow::bail!("Unknown storage backend: '{}'. Use 'memory' or 'postgres'", other),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = WardenConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.backup.retention_days, 30);
        assert_eq!(manifest.spec.backup.hourly_interval, Duration::from_secs(3600));
        assert!(manifest.spec.principal.admin_id.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_manifest() {
        let yaml = r#"
apiVersion: warden.dev/v1
kind: WardenConfig
metadata:
  name: ops-box
spec:
  principal:
    admin_id: alice
  llm_providers:
    - name: local
      type: ollama
      endpoint: http://localhost:11434
      models:
        - alias: default
          model: llama3.2
  backup:
    source_root: /srv/app
    include_paths: [config, data/db]
    retention_days: 7
    hourly_interval: 30m
  policy:
    additional_rules:
      - name: prod-host
        pattern: '\bprod-db\b'
        severity: warning
        message: Targets the production database
  storage:
    backend: memory
"#;
        let manifest = WardenConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.principal.resolved_admin_id().as_deref(), Some("alice"));
        assert_eq!(manifest.spec.backup.include_paths.len(), 2);
        assert_eq!(manifest.spec.backup.hourly_interval, Duration::from_secs(1800));
        assert_eq!(manifest.spec.backup.exclude_names, default_exclude_names());
        assert_eq!(manifest.spec.policy.additional_rules[0].name, "prod-host");
        assert_eq!(manifest.retention(), chrono::Duration::days(7));
        assert!(matches!(manifest.storage_backend().unwrap(), StorageBackend::InMemory));
    }

    #[test]
    fn test_validation() {
        let mut manifest = WardenConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.backup.retention_days = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.backup.retention_days = 30;

        manifest.spec.backup.include_paths = vec!["../outside".to_string()];
        assert!(manifest.validate().is_err());
        manifest.spec.backup.include_paths.clear();
        assert!(manifest.validate().is_err());
        manifest.spec.backup.include_paths = vec!["backups".to_string()];
        manifest.spec.backup.snapshot_root = PathBuf::from("./backups");
        assert!(manifest.validate().is_err());
        manifest.spec.backup.include_paths = vec!["src".to_string()];

        manifest.spec.storage.backend = "postgres".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.storage.connection_string = Some("postgres://localhost/warden".to_string());
        assert!(manifest.validate().is_ok());

        manifest.spec.llm_providers.push(LLMProviderConfig {
            name: "local".to_string(),
            provider_type: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            enabled: true,
            models: vec![ModelConfig {
                alias: "fast".to_string(),
                model: "qwen2.5".to_string(),
                context_window: None,
            }],
        });
        // default alias "default" is not provided
        assert!(manifest.validate().is_err());
        manifest.spec.llm_selection.default_model = "fast".to_string();
        assert!(manifest.validate().is_ok());

        manifest.spec.llm_providers.push(LLMProviderConfig {
            name: "invalid".to_string(),
            provider_type: "openai".to_string(),
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            enabled: true,
            models: vec![],
        });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_snapshot_root_inside_include_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(app.join("data")).unwrap();

        let mut manifest = WardenConfigManifest::default();
        manifest.spec.backup.source_root = app.clone();
        manifest.spec.backup.include_paths = vec!["data".to_string()];

        manifest.spec.backup.snapshot_root = app.join("../app/data/backups");
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("inside include path 'data'"));

        manifest.spec.backup.snapshot_root = dir.path().join("backups");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_blank_admin_id_is_unbound() {
        let principal = PrincipalConfig {
            admin_id: Some("   ".to_string()),
        };
        assert!(principal.resolved_admin_id().is_none());
    }
}
