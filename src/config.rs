//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section is optional and falls back to built-in defaults. Secrets (API
//! keys) are referenced by env-var name in the config and resolved at
//! runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::batch::DEFAULT_CONCURRENCY;
use crate::engine::projector::{PanelMember, ReportSettings, DEFAULT_UNFORMATTED_FIELDS};
use crate::llm::openai::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OPENAI_API_URL};
use crate::storage::{DEFAULT_MASTER_FILE, DEFAULT_REPORT_FILE};
use crate::types::{PricingParams, QuoteError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub pricing: PricingConfig,
    pub extraction: ExtractionConfig,
    pub batch: BatchConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    pub broker_fee_pct: Decimal,
    pub commission_pct: Decimal,
    pub associate_split_pct: Decimal,
    /// Non-zero switches the broker fee to fixed mode.
    pub fixed_broker_fee: Decimal,
    pub strata_manager: Option<String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            broker_fee_pct: dec!(20),
            commission_pct: dec!(20),
            associate_split_pct: Decimal::ZERO,
            fixed_broker_fee: Decimal::ZERO,
            strata_manager: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub api_url: String,
    pub max_tokens: u32,
    /// Exemplar JSON replacing the built-in schema.
    pub schema_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_url: OPENAI_API_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            schema_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub unformatted_fields: Vec<String>,
    pub panel: Vec<PanelMember>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            unformatted_fields: DEFAULT_UNFORMATTED_FIELDS.iter().map(|f| f.to_string()).collect(),
            panel: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub master_path: PathBuf,
    pub report_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            master_path: PathBuf::from(DEFAULT_MASTER_FILE),
            report_path: PathBuf::from(DEFAULT_REPORT_FILE),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The extraction API key, if its env var is set and non-empty.
    pub fn api_key(&self) -> Option<SecretString> {
        Self::resolve_env(&self.extraction.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::new)
    }

    /// Validated pricing parameters.
    pub fn pricing_params(&self) -> Result<PricingParams, QuoteError> {
        let p = &self.pricing;
        PricingParams::new(
            p.broker_fee_pct,
            p.commission_pct,
            p.associate_split_pct,
            p.fixed_broker_fee,
            p.strata_manager.clone().filter(|s| !s.trim().is_empty()),
        )
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            unformatted_fields: self.report.unformatted_fields.iter().cloned().collect::<BTreeSet<_>>(),
            panel: self.report.panel.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BrokerFeeMode;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.pricing.broker_fee_pct, dec!(20));
        assert_eq!(cfg.extraction.model, "gpt-4o");
        assert_eq!(cfg.batch.concurrency, 4);
        assert_eq!(cfg.storage.master_path, PathBuf::from("combined_quotes.json"));
        assert!(cfg.report.unformatted_fields.contains(&"uwgst".to_string()));
    }

    #[test]
    fn test_partial_sections() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [pricing]
            broker_fee_pct = 15
            fixed_broker_fee = 450.50
            strata_manager = "Clearlake Strata"

            [[report.panel]]
            insurer = "CHU"
            underwriter = "QBE Insurance (Australia) Limited"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pricing.broker_fee_pct, dec!(15));
        assert_eq!(cfg.pricing.commission_pct, dec!(20));
        let params = cfg.pricing_params().unwrap();
        assert_eq!(params.fee_mode(), BrokerFeeMode::Fixed(dec!(450.50)));
        assert_eq!(params.strata_manager.as_deref(), Some("Clearlake Strata"));

        let settings = cfg.report_settings();
        assert_eq!(settings.panel.len(), 1);
        assert_eq!(settings.panel[0].insurer, "CHU");
        assert!(settings.unformatted_fields.contains("uw"));
    }

    #[test]
    fn test_invalid_pricing_rejected() {
        let cfg: AppConfig = toml::from_str("[pricing]\ncommission_pct = 120\n").unwrap();
        assert!(matches!(
            cfg.pricing_params(),
            Err(QuoteError::InvalidPricing { name: "commission_pct", .. })
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = AppConfig::load_or_default(Path::new("/nonexistent/strata_quotes.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_sample_config() {
        // config.toml sits at the crate root, the working dir for cargo test.
        let result = AppConfig::load(Path::new("config.toml"));
        if let Ok(cfg) = result {
            assert_eq!(cfg.extraction.provider, "openai");
            assert!(cfg.batch.concurrency >= 1);
            assert!(cfg.pricing_params().is_ok());
            assert!(!cfg.report.panel.is_empty());
        }
    }

    #[test]
    fn test_missing_api_key_env() {
        let mut cfg = AppConfig::default();
        cfg.extraction.api_key_env = "STRATA_QUOTES_TEST_UNSET_KEY_9F2C".to_string();
        assert!(cfg.api_key().is_none());
    }
}
