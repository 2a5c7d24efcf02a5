//! 構造化ログユーティリティ。
//! tracing クレートを使用し、JSON またはテキスト形式の構造化ログを出力する。
//!
//! # 使用例
//!
//! ```ignore
//! use tracing::{info, warn, error};
//!
//! info!(operation = "withdraw", key = %scope.key(), "操作をコミットしました");
//! warn!(key = %key, "lock dropped without release, releasing in background");
//! error!(error = %e, "コミットに失敗しました");
//! ```

use tracing_subscriber::EnvFilter;

use crate::TelemetryError;

/// 環境ごとの既定ログレベル。
///
/// - dev: debug
/// - staging: info
/// - prod: warn
pub fn default_level_for(environment: &str) -> &'static str {
    match environment {
        "dev" | "test" => "debug",
        "staging" => "info",
        _ => "warn",
    }
}

/// `RUST_LOG` があればそれを、無ければ `level` を使ってフィルタを作る。
pub fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| TelemetryError::InvalidFilter(e.to_string())),
    }
}

/// parse_log_level はログレベル文字列を tracing の Level に変換する。
pub fn parse_log_level(level: &str) -> tracing::Level {
    match level {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
