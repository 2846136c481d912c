//! Integration tests for pihole-core infrastructure

use std::time::Duration;
use tokio::time::sleep;
use pihole_core::{
    config_error, init_logging, validation_error, with_timeout, ErrorContext, ErrorKind,
    LogFormat, LoggingConfig, PersistedSession, PiholeConfig, PiholeError,
};

#[tokio::test]
async fn test_error_handling() {
    let error = config_error!("Missing base URL", "test_component");

    match &error {
        PiholeError::Config {
            message, context, ..
        } => {
            assert_eq!(message, "Missing base URL");
            assert_eq!(context.component, "test_component");
            assert!(!context.error_id.is_empty());
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected Config error"),
    }

    // Should not panic without a subscriber
    error.log();
    assert!(!error.is_recoverable());
    assert!(error.retry_delay_ms().is_none());

    let network_error = PiholeError::Network {
        message: "Connection refused".to_string(),
        source: None,
        context: ErrorContext::new("test"),
    };
    assert!(network_error.is_recoverable());
    assert!(network_error.retry_delay_ms().is_some());
}

#[tokio::test]
async fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_to_file: false,
        log_file_path: None,
        enable_performance_monitoring: false,
        filter_directives: vec!["pihole_core=debug".to_string()],
    };

    // A second initialisation in the same process must fail gracefully
    let _ = init_logging(&config);
    assert!(init_logging(&config).is_err());
}

#[tokio::test]
async fn test_file_logging_requires_path() {
    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..Default::default()
    };
    assert!(init_logging(&config).is_err());
}

#[tokio::test]
async fn test_timeout_mechanism() {
    let quick_operation = async {
        sleep(Duration::from_millis(10)).await;
        "Success"
    };

    let result = with_timeout(
        quick_operation,
        Duration::from_millis(200),
        "quick_test",
        "Request timed out",
    )
    .await;
    assert_eq!(result.unwrap(), "Success");

    let slow_operation = async {
        sleep(Duration::from_millis(300)).await;
        "Should not reach here"
    };

    let result = with_timeout(
        slow_operation,
        Duration::from_millis(50),
        "slow_test",
        "Request timed out",
    )
    .await;

    match result.unwrap_err() {
        PiholeError::RequestTimeout {
            message,
            operation,
            duration_ms,
            ..
        } => {
            assert_eq!(message, "Request timed out");
            assert_eq!(operation, "slow_test");
            assert_eq!(duration_ms, 50);
        }
        other => panic!("Expected RequestTimeout error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_config_validation() {
    let mut config = PiholeConfig::default();
    assert!(config.validate().is_ok());

    config.connection.timeout_seconds = 0;
    match config.validate().unwrap_err() {
        PiholeError::Config { message, .. } => assert!(message.contains("timeout_seconds")),
        other => panic!("Expected Config error, got {:?}", other),
    }

    config.connection.timeout_seconds = 5;
    config.session.expiry_safety_factor = 1.5;
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

    config.session.expiry_safety_factor = 0.8;
    config.connection.base_url = "   ".to_string();
    assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = PiholeConfig::default();
    config.connection.base_url = "https://pi.example.local".to_string();
    config.connection.api_token = "secret".to_string();
    config.session.request_spacing_ms = 0;
    config.save_to_file(&path).unwrap();

    let loaded = PiholeConfig::from_file(&path).unwrap();
    assert_eq!(loaded.connection.base_url, "https://pi.example.local");
    assert_eq!(loaded.connection.api_token, "secret");
    assert_eq!(loaded.session.request_spacing_ms, 0);
    assert_eq!(loaded.logging.format, LogFormat::Compact);
}

#[tokio::test]
async fn test_missing_config_file() {
    let result = PiholeConfig::from_file("/definitely/not/here/pihole.toml");
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Config);
}

#[tokio::test]
async fn test_error_macros() {
    let validation_err = validation_error!("Invalid duration", "duration", "validator");
    match validation_err {
        PiholeError::Validation {
            message,
            field,
            context,
        } => {
            assert_eq!(message, "Invalid duration");
            assert_eq!(field, Some("duration".to_string()));
            assert_eq!(context.component, "validator");
            assert!(!context.recovery_suggestions.is_empty());
        }
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_persisted_session_wire_format() {
    let record = PersistedSession {
        session_id: "S1".to_string(),
        csrf_token: "C1".to_string(),
        session_expiry: 1_700_000_000_000,
        base_url: "https://pi.example.local".to_string(),
    };

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "sessionId": "S1",
            "csrfToken": "C1",
            "sessionExpiry": 1_700_000_000_000i64,
            "baseUrl": "https://pi.example.local"
        })
    );

    assert!(record.is_usable_for("https://pi.example.local", 1_699_999_999_999));
    assert!(!record.is_usable_for("https://pi.example.local", 1_700_000_000_000));
    assert!(!record.is_usable_for("https://other.local", 0));
}
