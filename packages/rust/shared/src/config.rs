//! Application configuration for SiteForge.
//!
//! User config lives at `~/.siteforge/siteforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteForgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "siteforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".siteforge";

// ---------------------------------------------------------------------------
// Config structs (matching siteforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Retry policy applied by the stage executor.
    #[serde(default)]
    pub retry: RetrySettings,

    /// OpenRouter settings for the LLM-backed generator.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Stripe settings for the integration stage.
    #[serde(default)]
    pub stripe: StripeConfig,

    /// Booking link settings for the integration stage.
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Generator backend: "template" or "openrouter".
    #[serde(default = "default_generator")]
    pub generator: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            generator: default_generator(),
        }
    }
}

fn default_generator() -> String {
    "template".into()
}

/// A fully-resolved retry policy, in config units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per stage, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Wall-clock budget for a single attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_attempt_timeout_secs() -> u64 {
    90
}

/// Partial retry settings for one stage; unset fields fall back to `[retry]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<u64>,
}

/// `[retry]` section: the default policy plus `[retry.overrides.<stage>]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(flatten)]
    pub base: RetryConfig,

    /// Per-stage overrides keyed by stage id (`architect`, `copywriter`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, RetryOverride>,
}

impl RetrySettings {
    /// Resolve the effective retry config for a stage id.
    pub fn for_stage(&self, stage: &str) -> RetryConfig {
        let Some(ov) = self.overrides.get(stage) else {
            return self.base.clone();
        };
        RetryConfig {
            max_attempts: ov.max_attempts.unwrap_or(self.base.max_attempts),
            initial_backoff_ms: ov.initial_backoff_ms.unwrap_or(self.base.initial_backoff_ms),
            max_backoff_ms: ov.max_backoff_ms.unwrap_or(self.base.max_backoff_ms),
            backoff_multiplier: ov.backoff_multiplier.unwrap_or(self.base.backoff_multiplier),
            attempt_timeout_secs: ov
                .attempt_timeout_secs
                .unwrap_or(self.base.attempt_timeout_secs),
        }
    }
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,

    /// Chat completions endpoint.
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    /// Default model used by the text stages.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            base_url: default_openrouter_url(),
            default_model: default_model(),
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "openai/gpt-4o".into()
}

/// `[stripe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    /// Name of the env var holding the secret key.
    #[serde(default = "default_stripe_key_env")]
    pub api_key_env: String,

    /// REST API root.
    #[serde(default = "default_stripe_url")]
    pub base_url: String,

    /// ISO currency of the created price.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Price in the currency's minor unit.
    #[serde(default = "default_unit_amount")]
    pub unit_amount: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_stripe_key_env(),
            base_url: default_stripe_url(),
            currency: default_currency(),
            unit_amount: default_unit_amount(),
        }
    }
}

fn default_stripe_key_env() -> String {
    "STRIPE_SECRET_KEY".into()
}
fn default_stripe_url() -> String {
    "https://api.stripe.com/v1".into()
}
fn default_currency() -> String {
    "usd".into()
}
fn default_unit_amount() -> u64 {
    4_900
}

/// `[calendar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Booking links are `<booking_base_url>/<project-slug>`.
    #[serde(default = "default_booking_base_url")]
    pub booking_base_url: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            booking_base_url: default_booking_base_url(),
        }
    }
}

fn default_booking_base_url() -> String {
    "https://cal.com".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.siteforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.siteforge/siteforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteForgeError::Serialization(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by `var_name`.
pub fn read_api_key(var_name: &str, provider: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SiteForgeError::config(format!(
            "{provider} API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    read_api_key(&config.openrouter.api_key_env, "OpenRouter").map(|_| ())
}
