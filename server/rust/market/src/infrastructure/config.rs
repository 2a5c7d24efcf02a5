use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;
use serde::Deserialize;
use tonmart_distributed_lock::{FallbackPolicy, LockOptions};
use tonmart_idempotency::IdempotencyConfig;
use tonmart_retry::RetryConfig;
use tonmart_telemetry::TelemetryConfig;

use crate::infrastructure::database::DatabaseConfig;

/// Config はアプリケーション全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// RedisConfig は分散ロック用 Redis の接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// 認証情報を含みうるため SecretString で保持する。
    pub url: SecretString,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "lock".to_string()
}

/// ロックストアに到達できない場合の振る舞い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockFallback {
    #[default]
    FailClosed,
    ProceedUnlocked,
}

impl From<LockFallback> for FallbackPolicy {
    fn from(value: LockFallback) -> Self {
        match value {
            LockFallback::FailClosed => FallbackPolicy::FailClosed,
            LockFallback::ProceedUnlocked => FallbackPolicy::ProceedUnlocked,
        }
    }
}

/// LockConfig は分散ロックの設定。
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_lock_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_lock_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub fallback: LockFallback,
    /// Redis が無い場合にプロセス内のロックで起動することを許可する。
    /// 複数インスタンス間では排他されないため、単一インスタンスの開発環境専用。
    #[serde(default)]
    pub allow_local_store: bool,
}

fn default_lock_ttl_secs() -> u64 {
    10
}

fn default_lock_wait_timeout_secs() -> u64 {
    10
}

fn default_lock_poll_interval_ms() -> u64 {
    50
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
            wait_timeout_secs: default_lock_wait_timeout_secs(),
            poll_interval_ms: default_lock_poll_interval_ms(),
            fallback: LockFallback::default(),
            allow_local_store: false,
        }
    }
}

impl LockConfig {
    pub fn to_options(&self) -> LockOptions {
        LockOptions::new()
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_wait_timeout(Duration::from_secs(self.wait_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_fallback(self.fallback.into())
    }
}

/// RetrySettings は外部呼び出しのリトライ設定。
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }
}

/// ObservabilityConfig はログ出力の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 未指定の場合は app.environment から決まる
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// YAML ファイルから設定を読み込む。
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }

    /// `CONFIG_PATH`（既定値 `config/config.yaml`）から設定を読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
        Self::load(path)
    }

    pub fn lock_options(&self) -> LockOptions {
        self.lock.to_options()
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.to_config()
    }

    pub fn idempotency_config(&self) -> IdempotencyConfig {
        self.idempotency.clone()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.app.name.clone(),
            version: self.app.version.clone(),
            environment: self.app.environment.clone(),
            log_level: self.observability.log_level.clone(),
            log_format: self.observability.log_format.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
app:
  name: "tonmart-market"
  version: "0.2.0"
  environment: "staging"
database:
  host: "localhost"
  name: "tonmart"
  user: "app"
  password: "secret"
redis:
  url: "redis://:pw@localhost:6379"
  key_prefix: "tonmart:lock"
lock:
  ttl_secs: 15
  wait_timeout_secs: 5
  fallback: "proceed_unlocked"
idempotency:
  ttl_secs: 3600
retry:
  max_attempts: 5
  initial_delay_ms: 200
observability:
  log_level: "debug"
  log_format: "text"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.app.name, "tonmart-market");
        assert_eq!(config.database.as_ref().unwrap().port, 5432);
        let redis = config.redis.as_ref().unwrap();
        assert_eq!(redis.url.expose_secret(), "redis://:pw@localhost:6379");
        assert_eq!(redis.key_prefix, "tonmart:lock");

        let options = config.lock_options();
        assert_eq!(options.ttl, Duration::from_secs(15));
        assert_eq!(options.wait_timeout, Duration::from_secs(5));
        assert_eq!(options.fallback, FallbackPolicy::ProceedUnlocked);

        assert_eq!(config.idempotency_config().ttl_secs, Some(3600));

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(200));
        assert_eq!(retry.max_delay, Duration::from_secs(30));

        let telemetry = config.telemetry_config();
        assert_eq!(telemetry.effective_log_level(), "debug");
        assert_eq!(telemetry.log_format, "text");
    }

    #[test]
    fn test_config_defaults() {
        let yaml = r#"
app:
  name: "tonmart-market"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.app.version, "0.1.0");
        assert_eq!(config.app.environment, "dev");
        assert!(config.database.is_none());
        assert!(config.redis.is_none());

        let options = config.lock_options();
        assert_eq!(options.ttl, Duration::from_secs(10));
        assert_eq!(options.wait_timeout, Duration::from_secs(10));
        assert_eq!(options.poll_interval, Duration::from_millis(50));
        assert_eq!(options.fallback, FallbackPolicy::FailClosed);
        assert!(!config.lock.allow_local_store);

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert!(!retry.jitter);

        assert_eq!(config.idempotency_config().ttl_secs, Some(86400));
        assert_eq!(config.telemetry_config().effective_log_level(), "debug");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app:\n  name: \"from-file\"\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.app.name, "from-file");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = Config::load("/nonexistent/tonmart/config.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
