pub mod logger;

#[cfg(test)]
mod tests;

use serde::Deserialize;
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

pub use logger::{build_filter, default_level_for, parse_log_level};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("ログフィルタが不正です: {0}")]
    InvalidFilter(String),
    #[error("tracing subscriber は既に初期化されています: {0}")]
    AlreadyInitialized(String),
}

fn default_service_name() -> String {
    "tonmart-market".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// TelemetryConfig は telemetry ライブラリの初期化設定を保持する。
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// 未指定の場合は environment から決める（dev: debug, staging: info, それ以外: warn）。
    #[serde(default)]
    pub log_level: Option<String>,
    /// ログ出力フォーマット。"text" の場合はプレーンテキスト、それ以外は JSON。
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            version: String::new(),
            environment: default_environment(),
            log_level: None,
            log_format: default_log_format(),
        }
    }
}

impl TelemetryConfig {
    pub fn effective_log_level(&self) -> &str {
        self.log_level
            .as_deref()
            .unwrap_or_else(|| default_level_for(&self.environment))
    }
}

/// init_telemetry は tracing-subscriber を初期化する。
///
/// `RUST_LOG` が設定されていればそちらを優先する。2 回目以降の呼び出しは
/// `AlreadyInitialized` を返す。
pub fn init_telemetry(cfg: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(cfg.effective_log_level())?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if cfg.log_format == "text" {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    };
    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        service = %cfg.service_name,
        version = %cfg.version,
        environment = %cfg.environment,
        "telemetry initialized"
    );
    Ok(())
}
