use crate::logger::{default_level_for, parse_log_level};
use crate::{init_telemetry, TelemetryConfig, TelemetryError};

#[test]
fn test_telemetry_config_default() {
    let cfg = TelemetryConfig::default();
    assert_eq!(cfg.service_name, "tonmart-market");
    assert_eq!(cfg.environment, "dev");
    assert_eq!(cfg.log_format, "json");
    assert_eq!(cfg.effective_log_level(), "debug");
}

#[test]
fn test_telemetry_config_from_yaml() {
    let yaml = r#"
service_name: "tonmart-market"
version: "0.1.0"
environment: "prod"
log_format: "text"
"#;
    let cfg: TelemetryConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.version, "0.1.0");
    assert_eq!(cfg.log_format, "text");
    assert_eq!(cfg.effective_log_level(), "warn");
}

#[test]
fn test_explicit_log_level_overrides_environment() {
    let cfg = TelemetryConfig {
        environment: "prod".to_string(),
        log_level: Some("info".to_string()),
        ..TelemetryConfig::default()
    };
    assert_eq!(cfg.effective_log_level(), "info");
}

#[test]
fn test_default_level_for_environment() {
    assert_eq!(default_level_for("dev"), "debug");
    assert_eq!(default_level_for("staging"), "info");
    assert_eq!(default_level_for("prod"), "warn");
}

#[test]
fn test_parse_log_level() {
    assert_eq!(parse_log_level("debug"), tracing::Level::DEBUG);
    assert_eq!(parse_log_level("warn"), tracing::Level::WARN);
    assert_eq!(parse_log_level("error"), tracing::Level::ERROR);
    assert_eq!(parse_log_level("unknown"), tracing::Level::INFO);
    assert_eq!(parse_log_level(""), tracing::Level::INFO);
}

#[test]
fn test_second_init_reports_already_initialized() {
    let cfg = TelemetryConfig {
        log_format: "text".to_string(),
        ..TelemetryConfig::default()
    };
    // 同じテストバイナリ内で先に初期化されている可能性があるため 1 回目の結果は問わない
    let _ = init_telemetry(&cfg);
    assert!(matches!(
        init_telemetry(&cfg),
        Err(TelemetryError::AlreadyInitialized(_))
    ));
}
