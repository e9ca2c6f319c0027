use clap::ValueEnum;
use config::{Config, File};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{BenchError, Result};

/// Run mode; selects which settings file is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Demo,
    Prod,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Demo => write!(f, "demo"),
            Mode::Prod => write!(f, "prod"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "demo" => Ok(Mode::Demo),
            "prod" => Ok(Mode::Prod),
            other => Err(BenchError::InvalidConfig(vec![format!(
                "invalid mode '{other}': must be 'demo' or 'prod'"
            )])),
        }
    }
}

/// OKX connection parameters, the `OKXDataSrc` section of the settings file.
///
/// All five fields are required and must be non-empty; both endpoints must
/// use a websocket scheme. Missing fields deserialize as empty strings so
/// that `validate` can report every offending field at once.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub url_pub: String,
    #[serde(default)]
    pub url_private: String,
    #[serde(default, rename = "API_key", alias = "api_key")]
    pub api_key: String,
    #[serde(default, rename = "API_secret", alias = "api_secret")]
    pub api_secret: String,
    #[serde(default, rename = "API_passphrase", alias = "api_passphrase")]
    pub api_passphrase: String,
}

impl ConnectorConfig {
    /// Built-in defaults used when the settings file cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            url_pub: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            url_private: "wss://ws.okx.com:8443/ws/v5/private".to_string(),
            api_key: "demo-api-key".to_string(),
            api_secret: "demo-api-secret".to_string(),
            api_passphrase: "demo-passphrase".to_string(),
        }
    }

    /// Validate all fields, collecting every violation rather than stopping
    /// at the first one.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let fields = [
            ("url_pub", &self.url_pub),
            ("url_private", &self.url_private),
            ("API_key", &self.api_key),
            ("API_secret", &self.api_secret),
            ("API_passphrase", &self.api_passphrase),
        ];

        for (field, value) in fields {
            if value.is_empty() {
                errors.push(format!("{field} is missing or empty"));
            }
        }

        for (field, value) in [("url_pub", &self.url_pub), ("url_private", &self.url_private)] {
            if !value.is_empty() && !is_ws_url(value) {
                errors.push(format!("{field} must start with ws:// or wss://, got '{value}'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// First characters of the API key for diagnostics, never the full value.
    pub fn masked_key(&self) -> String {
        let head: String = self.api_key.chars().take(8).collect();
        format!("{head}...")
    }
}

fn is_ws_url(url: &str) -> bool {
    url.starts_with("wss://") || url.starts_with("ws://")
}

/// Run parameters, the optional `run` section of the settings file
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Observation window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Dimension of the matrix handed to the inversion worker
    #[serde(default = "default_matrix_dim")]
    pub matrix_dim: usize,
    /// Maximum accepted residual of A·X − E
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Instrument subscribed on the books channel
    #[serde(default = "default_inst_id")]
    pub inst_id: String,
    /// How long workers may take to observe the stop flag
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

fn default_matrix_dim() -> usize {
    1000
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_inst_id() -> String {
    "BTC-USDT".to_string()
}

fn default_grace_secs() -> u64 {
    30
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            matrix_dim: default_matrix_dim(),
            tolerance: default_tolerance(),
            inst_id: default_inst_id(),
            grace_secs: default_grace_secs(),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "OKXDataSrc", alias = "okxdatasrc")]
    pub okx: ConnectorConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl AppConfig {
    /// Built-in configuration used when loading fails
    pub fn fallback() -> Self {
        Self {
            okx: ConnectorConfig::fallback(),
            run: RunConfig::default(),
        }
    }

    /// Load the settings for `mode`, falling back to the built-in defaults
    /// on any loader or validation failure. The fallback is surfaced as a
    /// warning so operators can tell which configuration actually ran.
    pub fn load_or_fallback(mode: Mode, config_dir: &Path) -> Self {
        let mut loader = SettingsLoader::new(mode, config_dir);
        match loader.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("configuration load failed: {e}; falling back to built-in defaults");
                Self::fallback()
            }
        }
    }
}

/// Loads and validates the mode-specific settings file.
///
/// Resolves `<config_dir>/<mode>.<ext>`; both JSON and TOML are accepted.
pub struct SettingsLoader {
    mode: Mode,
    config_dir: PathBuf,
    raw: Option<Config>,
}

impl SettingsLoader {
    pub fn new(mode: Mode, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            config_dir: config_dir.into(),
            raw: None,
        }
    }

    /// Path of the settings file, without extension
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(self.mode.to_string())
    }

    /// Load, parse, and validate the settings file
    pub fn load(&mut self) -> Result<AppConfig> {
        let raw = Config::builder()
            .add_source(File::from(self.config_file()))
            .build()?;

        let app: AppConfig = raw.clone().try_deserialize()?;

        let mut errors = string_type_violations(&raw);
        if let Err(mut field_errors) = app.okx.validate() {
            errors.append(&mut field_errors);
        }
        if !errors.is_empty() {
            return Err(BenchError::InvalidConfig(errors));
        }

        self.raw = Some(raw);
        info!(mode = %self.mode, "configuration loaded");
        Ok(app)
    }

    /// Diagnostic only: whether a settings file has been loaded successfully
    pub fn is_loaded(&self) -> bool {
        self.raw.is_some()
    }

    /// Diagnostic only: the raw parsed configuration tree
    pub fn raw(&self) -> Option<&Config> {
        self.raw.as_ref()
    }
}

/// The `config` crate coerces scalars to strings on demand, so a numeric
/// credential would deserialize silently. Check the declared types against
/// the parsed tree and name each field that is not an actual string.
fn string_type_violations(raw: &Config) -> Vec<String> {
    const FIELDS: [&str; 5] = [
        "url_pub",
        "url_private",
        "API_key",
        "API_secret",
        "API_passphrase",
    ];

    let mut errors = Vec::new();
    let tree: serde_json::Value = match raw.clone().try_deserialize() {
        Ok(tree) => tree,
        // a tree that cannot round-trip surfaces through try_deserialize
        Err(_) => return errors,
    };

    let section = tree.as_object().and_then(|root| {
        root.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("okxdatasrc"))
            .map(|(_, value)| value)
    });
    let Some(serde_json::Value::Object(section)) = section else {
        return errors;
    };

    for field in FIELDS {
        let entry = section
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field));
        if let Some((_, value)) = entry {
            if !value.is_string() {
                errors.push(format!("{field} must be a string"));
            }
        }
    }
    errors
}
