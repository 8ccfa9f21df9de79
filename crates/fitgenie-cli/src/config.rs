//! Configuration file management for fitgenie.
//!
//! Provides a TOML-based config file at `~/.config/fitgenie/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use fitgenie_core::generate::gemini::DEFAULT_MODEL;
use fitgenie_core::generate::{GeminiConfig, GeminiGenerator, GenerativeClient, RetryPolicy};
use fitgenie_core::orchestrator::{ChatOrchestrator, DEFAULT_MAX_ATTEMPTS};
use fitgenie_core::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, RateLimiter};
use fitgenie_core::store::ChatStore;
use fitgenie_core::token::{TOKEN_SECRET_ENV, TokenConfig};
use fitgenie_db::config::DbConfig;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_MODEL_ENV: &str = "FITGENIE_GEMINI_MODEL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    pub token_secret: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GeminiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW.as_secs(),
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fitgenie config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fitgenie` or
/// `~/.config/fitgenie`, including on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fitgenie");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fitgenie")
}

/// Return the path to the fitgenie config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FitgenieConfig {
    pub db_config: DbConfig,
    pub token_config: TokenConfig,
    /// `None` when no API key is configured anywhere. Only commands that
    /// call the model need it.
    pub gemini: Option<GeminiConfig>,
    pub pipeline: PipelineSection,
    pub rate_limit: RateLimitSection,
}

impl FitgenieConfig {
    /// Resolve configuration from the environment and the config file on
    /// disk (if any).
    ///
    /// - DB URL: `cli_db_url` > `FITGENIE_DATABASE_URL` > `database.url` > default
    /// - Token secret: `FITGENIE_TOKEN_SECRET` > `auth.token_secret` > error
    /// - Gemini key: `GEMINI_API_KEY` > `gemini.api_key` > none
    /// - Gemini model: `FITGENIE_GEMINI_MODEL` > `gemini.model` > default
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        Self::resolve_with(cli_db_url, load_config().ok())
    }

    /// Like [`Self::resolve`], with an already-loaded config file.
    pub fn resolve_with(cli_db_url: Option<&str>, file_config: Option<ConfigFile>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Some(url) = env(DbConfig::URL_ENV) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let mut db_config = DbConfig::new(db_url);
        if let Some(max) = file_config.as_ref().and_then(|c| c.database.max_connections) {
            db_config = db_config.with_max_connections(max);
        }

        let token_config = if let Some(secret_hex) = env(TOKEN_SECRET_ENV) {
            TokenConfig::from_hex(&secret_hex)
                .with_context(|| format!("{TOKEN_SECRET_ENV} env var is not valid hex"))?
        } else if let Some(ref cfg) = file_config {
            TokenConfig::from_hex(&cfg.auth.token_secret)
                .context("invalid hex in config file token_secret")?
        } else {
            bail!(
                "token secret not found; set {TOKEN_SECRET_ENV} or run `fitgenie init` to create a config file"
            );
        };

        let file_gemini = file_config.as_ref().map(|c| &c.gemini);
        let api_key = env(GEMINI_API_KEY_ENV)
            .or_else(|| file_gemini.and_then(|g| g.api_key.clone()))
            .filter(|k| !k.trim().is_empty());
        let model = env(GEMINI_MODEL_ENV)
            .or_else(|| file_gemini.and_then(|g| g.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let gemini = api_key.map(|key| GeminiConfig::new(key).with_model(model));

        let (pipeline, rate_limit) = file_config
            .as_ref()
            .map(|c| (c.pipeline, c.rate_limit))
            .unwrap_or_default();

        Ok(Self {
            db_config,
            token_config,
            gemini,
            pipeline,
            rate_limit,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.pipeline.attempt_timeout_secs.max(1)),
            ..RetryPolicy::default()
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            Duration::from_secs(self.rate_limit.window_secs.max(1)),
            self.rate_limit.max_requests,
        )
    }

    /// Build the chat pipeline on top of `store`, calling Gemini.
    pub fn orchestrator(&self, store: Arc<dyn ChatStore>) -> Result<ChatOrchestrator> {
        let Some(gemini) = self.gemini.clone() else {
            bail!(
                "Gemini API key not found; set {GEMINI_API_KEY_ENV} or add [gemini] api_key to {}",
                config_path().display()
            );
        };
        let generator = GeminiGenerator::new(gemini)?;
        tracing::info!(model = generator.model(), "using Gemini");
        let client = GenerativeClient::new(Arc::new(generator), self.retry_policy());
        Ok(ChatOrchestrator::new(store, client).with_max_attempts(self.pipeline.max_attempts))
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    const SECRET: &str = "aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55";

    fn clear_env() {
        for key in [
            DbConfig::URL_ENV,
            TOKEN_SECRET_ENV,
            GEMINI_API_KEY_ENV,
            GEMINI_MODEL_ENV,
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    fn sample_file() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://filehost:5432/filedb".to_string(),
                max_connections: Some(4),
            },
            auth: AuthSection {
                token_secret: "bb".repeat(32),
            },
            gemini: GeminiSection {
                api_key: Some("file-key".into()),
                model: Some("gemini-file-model".into()),
            },
            pipeline: PipelineSection {
                max_attempts: 5,
                attempt_timeout_secs: 12,
            },
            rate_limit: RateLimitSection {
                window_secs: 60,
                max_requests: 10,
            },
        }
    }

    #[test]
    fn generate_token_secret_is_64_hex_chars() {
        let secret = generate_token_secret();
        assert_eq!(secret.len(), 64);
        assert!(
            secret.chars().all(|c| c.is_ascii_hexdigit()),
            "expected all hex digits, got: {secret}"
        );
        assert_ne!(secret, generate_token_secret());
    }

    #[test]
    fn config_file_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let original = sample_file();
        std::fs::write(&path, toml::to_string_pretty(&original).unwrap()).unwrap();
        let loaded: ConfigFile = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.auth.token_secret, original.auth.token_secret);
        assert_eq!(loaded.gemini.api_key.as_deref(), Some("file-key"));
        assert_eq!(loaded.pipeline, original.pipeline);
        assert_eq!(loaded.rate_limit, original.rate_limit);
    }

    #[test]
    fn optional_sections_default() {
        let loaded: ConfigFile = toml::from_str(
            "[database]\nurl = \"postgresql://x/y\"\n\n[auth]\ntoken_secret = \"abcd\"\n",
        )
        .unwrap();
        assert!(loaded.gemini.api_key.is_none());
        assert_eq!(loaded.pipeline, PipelineSection::default());
        assert_eq!(loaded.pipeline.max_attempts, 3);
        assert_eq!(loaded.rate_limit.window_secs, 3600);
        assert_eq!(loaded.rate_limit.max_requests, 60);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = save_config(&sample_file());
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        result.unwrap();
        assert!(path.starts_with(tmp.path()));
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn cli_flag_overrides_all() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };

        let config =
            FitgenieConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(sample_file()))
                .unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_env();
    }

    #[test]
    fn env_overrides_config_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(TOKEN_SECRET_ENV, SECRET) };
        unsafe { std::env::set_var(GEMINI_API_KEY_ENV, "env-key") };
        unsafe { std::env::set_var(GEMINI_MODEL_ENV, "gemini-env-model") };

        let config = FitgenieConfig::resolve_with(None, Some(sample_file())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.token_config.secret, hex::decode(SECRET).unwrap());
        let gemini = config.gemini.unwrap();
        assert_eq!(gemini.api_key, "env-key");
        assert_eq!(gemini.model, "gemini-env-model");

        clear_env();
    }

    #[test]
    fn config_file_used_when_env_unset() {
        let _lock = lock_env();
        clear_env();

        let config = FitgenieConfig::resolve_with(None, Some(sample_file())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://filehost:5432/filedb");
        assert_eq!(config.token_config.secret, vec![0xbb; 32]);
        let gemini = config.gemini.as_ref().unwrap();
        assert_eq!(gemini.api_key, "file-key");
        assert_eq!(gemini.model, "gemini-file-model");
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(config.retry_policy().attempt_timeout, Duration::from_secs(12));
        assert_eq!(config.rate_limiter().max_requests(), 10);
        assert_eq!(config.db_config.max_connections, 4);

        let store: Arc<dyn ChatStore> = Arc::new(fitgenie_core::store::MemoryStore::new());
        assert!(config.orchestrator(store).is_ok());
    }

    #[test]
    fn oversized_rate_window_still_admits() {
        let _lock = lock_env();
        clear_env();

        let mut file = sample_file();
        file.rate_limit.window_secs = u64::MAX;
        let config = FitgenieConfig::resolve_with(None, Some(file)).unwrap();
        let limiter = config.rate_limiter();
        let key = fitgenie_core::rate_limit::RateKey::User(uuid::Uuid::new_v4());
        assert!(limiter.admit(key));
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(TOKEN_SECRET_ENV, SECRET) };

        let config = FitgenieConfig::resolve_with(None, None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(config.gemini.is_none());
        assert_eq!(config.pipeline, PipelineSection::default());
        assert_eq!(config.rate_limit, RateLimitSection::default());

        let store: Arc<dyn ChatStore> = Arc::new(fitgenie_core::store::MemoryStore::new());
        let err = config.orchestrator(store).err().expect("no api key");
        assert!(err.to_string().contains("Gemini API key not found"));

        clear_env();
    }

    #[test]
    fn errors_when_no_token_secret() {
        let _lock = lock_env();
        clear_env();

        let result = FitgenieConfig::resolve_with(Some("postgresql://localhost:5432/fitgenie"), None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("token secret not found"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("fitgenie/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
