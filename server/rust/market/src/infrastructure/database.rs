use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// DatabaseConfig はデータベース接続設定。
///
/// パスワードは `SecretString` で保持し、Debug 出力には現れない。
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(default = "default_password")]
    pub password: SecretString,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_db_port() -> u16 {
    5432
}

fn default_password() -> SecretString {
    SecretString::new(String::new())
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_open_conns() -> u32 {
    25
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl DatabaseConfig {
    /// PostgreSQL接続URLを構築する。パスワードを含むため SecretString で返す。
    pub fn connection_url(&self) -> SecretString {
        SecretString::new(format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.name,
            self.ssl_mode
        ))
    }

    /// 接続プールを作成する。`DATABASE_URL` が設定されていればそちらを優先する。
    #[cfg(feature = "postgres")]
    pub async fn connect(&self) -> anyhow::Result<sqlx::PgPool> {
        use anyhow::Context;

        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => SecretString::new(url),
            Err(_) => self.connection_url(),
        };
        tracing::info!(host = %self.host, database = %self.name, "connecting to database");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_open_conns)
            .acquire_timeout(std::time::Duration::from_secs(self.connect_timeout_secs))
            .connect(url.expose_secret())
            .await
            .context("failed to connect to database")?;
        tracing::info!("database connection pool established");
        Ok(pool)
    }
}
