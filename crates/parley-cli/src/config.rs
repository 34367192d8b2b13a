//! CLI configuration
//!
//! Sources, later ones winning: an optional `--config` file,
//! `config/default`, `config/local`, then `PARLEY__SECTION__KEY`
//! environment variables. `.env` is loaded first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parley_crypto::KeyStore;
use parley_llm::{LLMRouter, ProviderKind, DEFAULT_ORACLE_TIMEOUT};
use parley_negotiation::{
    AppContext, EscalationConfig, NegotiationConfig, ProofService, RemoteAttestationClient,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub keystore: KeystoreSettings,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    #[serde(default)]
    pub escalation: EscalationSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// mistral, openai_compat, deterministic
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Upper bound for one oracle call
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreSettings {
    #[serde(default = "default_keystore_dir")]
    pub dir: PathBuf,
}

impl Default for KeystoreSettings {
    fn default() -> Self {
        Self {
            dir: default_keystore_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(flatten)]
    pub service: EscalationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// pretty or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_provider() -> String {
    "mistral".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    DEFAULT_ORACLE_TIMEOUT.as_secs()
}

fn default_keystore_dir() -> PathBuf {
    PathBuf::from("keys")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn open_keystore(&self) -> anyhow::Result<Arc<KeyStore>> {
        let store = KeyStore::open(&self.keystore.dir)
            .with_context(|| format!("opening key store at {}", self.keystore.dir.display()))?;
        Ok(Arc::new(store))
    }

    pub fn oracle(&self) -> Arc<LLMRouter> {
        let kind = ProviderKind::from_str(&self.llm.provider).unwrap_or_else(|| {
            tracing::warn!(provider = %self.llm.provider, "Unknown LLM provider, using mistral");
            ProviderKind::Mistral
        });
        Arc::new(LLMRouter::from_kind(kind).with_timeout(self.llm.timeout()))
    }

    /// Remote prover, when escalation is enabled
    pub fn proof_service(&self) -> anyhow::Result<Option<Arc<dyn ProofService>>> {
        if !self.escalation.enabled {
            return Ok(None);
        }
        let client = RemoteAttestationClient::new(self.escalation.service.clone())
            .context("building escalation client")?;
        Ok(Some(Arc::new(client)))
    }

    pub fn app_context(&self) -> anyhow::Result<AppContext> {
        let mut ctx = AppContext::new(self.oracle(), self.open_keystore()?)
            .with_config(self.negotiation.clone());
        if let Some(service) = self.proof_service()? {
            ctx = ctx.with_proof_service(service);
        }
        Ok(ctx)
    }
}
