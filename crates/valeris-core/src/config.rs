// Configuration loading and parsing (valeris.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

/// Range keys accepted by `journal.default_range`.
pub const KNOWN_RANGES: &[&str] = &["today", "7d", "30d", "month", "year", "all"];

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub journal: JournalConfig,
    pub evaluation: EvaluationConfig,
    pub llm: LlmConfig,
    pub credentials: CredentialsConfig,
    pub capture_port: u16,
    pub server: ServerConfig,
    pub news: NewsConfig,
    pub brokers: BrokersConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// valeris.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire valeris.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ValerisFile {
    journal: JournalConfig,
    evaluation: EvaluationConfig,
    llm: LlmConfig,
    database: DatabaseSection,
    capture: CaptureSection,
    server: ServerConfig,
    news: NewsConfig,
    brokers: BrokersConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptureSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// The user the local journal acts as. Every query is scoped to it.
    pub user_id: String,
    pub display_name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_range")]
    pub default_range: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_range() -> String {
    "30d".to_string()
}

/// Funded-account challenge parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    pub account_size: f64,
    pub profit_target_pct: f64,
    pub max_drawdown_pct: f64,
    pub daily_loss_limit_pct: f64,
    pub min_trading_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub coach_max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    pub feed_url: String,
    pub max_articles: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokersConfig {
    pub etrade_base_url: String,
    pub schwab_base_url: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
    pub news_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/valeris.toml` and
/// (optionally) `config/credentials.toml`, both relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let main_path = config_dir.join("valeris.toml");
    let main_text = read_file(&main_path)?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    parse_config(&main_text, credentials).map_err(|e| match e {
        ConfigError::ParseError { source, .. } => ConfigError::ParseError {
            path: main_path,
            source,
        },
        other => other,
    })
}

/// Parse and validate the text of a valeris.toml file.
///
/// Parse errors carry an empty path; `load_config_from` fills it in.
pub fn parse_config(text: &str, credentials: CredentialsConfig) -> Result<Config, ConfigError> {
    let file: ValerisFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: PathBuf::new(),
        source: e,
    })?;

    let db_path = if file.database.path.trim().is_empty() {
        default_db_path()
    } else {
        file.database.path
    };

    let config = Config {
        journal: file.journal,
        evaluation: file.evaluation,
        llm: file.llm,
        credentials,
        capture_port: file.capture.port,
        server: file.server,
        news: file.news,
        brokers: file.brokers,
        db_path,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy every file in `defaults/` that `config/` lacks, except `.example`
/// templates. Existing files are left alone. Returns the files written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(copy_error(format!(
            "neither defaults/ nor config/ directory found in {}",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("cannot create {}: {e}", config_dir.display())))?;

    let mut sources = Vec::new();
    for entry in std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_error(format!("cannot list {}: {e}", defaults_dir.display())))?
    {
        let path = entry
            .map_err(|e| copy_error(format!("cannot list {}: {e}", defaults_dir.display())))?
            .path();
        let is_template = path.extension().is_some_and(|ext| ext == "example");
        if path.is_file() && !is_template {
            sources.push(path);
        }
    }

    let mut copied = Vec::new();
    for source in sources {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);
        if copy_if_missing(&source, &target)? {
            copied.push(target);
        }
    }
    Ok(copied)
}

/// Returns `false` when `target` already exists.
fn copy_if_missing(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    use std::io::Write;

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_error(format!("cannot create {}: {e}", target.display()))),
    };
    let content = std::fs::read(source)
        .map_err(|e| copy_error(format!("cannot read {}: {e}", source.display())))?;
    dest.write_all(&content)
        .map_err(|e| copy_error(format!("cannot write {}: {e}", target.display())))?;
    Ok(true)
}

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Loads config relative to the current working directory, copying
/// defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

/// Database location used when `database.path` is left empty.
pub fn default_db_path() -> String {
    directories::ProjectDirs::from("io", "Valeris", "valeris")
        .map(|dirs| dirs.data_dir().join("valeris.db"))
        .unwrap_or_else(|| PathBuf::from("valeris.db"))
        .to_string_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.journal.user_id.trim().is_empty() {
        return Err(invalid("journal.user_id", "must not be empty"));
    }

    if !KNOWN_RANGES.contains(&config.journal.default_range.as_str()) {
        return Err(invalid(
            "journal.default_range",
            format!(
                "must be one of {}, got `{}`",
                KNOWN_RANGES.join(", "),
                config.journal.default_range
            ),
        ));
    }

    let eval = &config.evaluation;
    if eval.account_size <= 0.0 {
        return Err(invalid(
            "evaluation.account_size",
            format!("must be > 0, got {}", eval.account_size),
        ));
    }

    let pct_fields: &[(&str, f64)] = &[
        ("evaluation.profit_target_pct", eval.profit_target_pct),
        ("evaluation.max_drawdown_pct", eval.max_drawdown_pct),
        ("evaluation.daily_loss_limit_pct", eval.daily_loss_limit_pct),
    ];
    for (name, val) in pct_fields {
        if !(*val > 0.0 && *val <= 100.0) {
            return Err(invalid(
                name,
                format!("must be in (0, 100], got {val}"),
            ));
        }
    }

    if config.llm.coach_max_tokens == 0 {
        return Err(invalid("llm.coach_max_tokens", "must be > 0"));
    }

    if config.news.max_articles == 0 {
        return Err(invalid("news.max_articles", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
