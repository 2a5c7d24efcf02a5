use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use tonmart_retry::{
    with_retry, with_retry_classified, with_retry_if, RetryConfig, RetryError, Retryable,
};

#[derive(Debug, thiserror::Error, PartialEq)]
enum GatewayError {
    #[error("connection reset")]
    ConnectionReset,
    #[error("invalid wallet address")]
    InvalidAddress,
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::ConnectionReset)
    }
}

#[tokio::test]
async fn test_retry_succeeds_on_first_attempt() {
    let config = RetryConfig::new(3);
    let result: Result<&str, RetryError<GatewayError>> =
        with_retry(&config, || async { Ok("success") }).await;
    assert_eq!(result.unwrap(), "success");
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_third_attempt() {
    let counter = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::network();

    let counter_clone = counter.clone();
    let result = with_retry(&config, move || {
        let c = counter_clone.clone();
        async move {
            let attempt = c.fetch_add(1, Ordering::SeqCst);
            if attempt < 2 {
                Err(GatewayError::ConnectionReset)
            } else {
                Ok("success")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "success");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhausted_with_backoff_schedule() {
    let config = RetryConfig::new(3)
        .with_initial_delay(Duration::from_secs(1))
        .with_multiplier(2.0);
    let start = Instant::now();
    let attempts_at = Arc::new(Mutex::new(Vec::new()));

    let attempts_clone = attempts_at.clone();
    let result: Result<(), _> = with_retry(&config, move || {
        attempts_clone.lock().unwrap().push(start.elapsed());
        async { Err(GatewayError::ConnectionReset) }
    })
    .await;

    match result {
        Err(RetryError::ExhaustedRetries {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error, GatewayError::ConnectionReset);
        }
        _ => panic!("ExhaustedRetries エラーが期待される"),
    }

    // 1 回目は即時、2 回目は 1.0 秒後、3 回目はさらに 2.0 秒後
    let attempts_at = attempts_at.lock().unwrap().clone();
    assert_eq!(attempts_at.len(), 3);
    assert_eq!(attempts_at[0], Duration::ZERO);
    assert_close(attempts_at[1], Duration::from_secs(1));
    assert_close(attempts_at[2], Duration::from_secs(3));
}

fn assert_close(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(20);
    assert!(
        actual >= expected && actual <= expected + tolerance,
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_error_preserves_source() {
    let config = RetryConfig::new(2).with_initial_delay(Duration::from_millis(10));
    let err = with_retry(&config, || async {
        Err::<(), _>(GatewayError::ConnectionReset)
    })
    .await
    .unwrap_err();

    let source = std::error::Error::source(&err).expect("source が保持されていること");
    assert_eq!(source.to_string(), "connection reset");
    assert!(err.is_exhausted());
}

#[tokio::test]
async fn test_non_retryable_error_propagates_immediately() {
    let counter = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::new(5);

    let counter_clone = counter.clone();
    let result: Result<(), _> = with_retry_classified(&config, move || {
        counter_clone.fetch_add(1, Ordering::SeqCst);
        async { Err(GatewayError::InvalidAddress) }
    })
    .await;

    match result {
        Err(RetryError::NonRetryable { attempt, error }) => {
            assert_eq!(attempt, 1);
            assert_eq!(error, GatewayError::InvalidAddress);
        }
        _ => panic!("NonRetryable エラーが期待される"),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_if_stops_when_error_becomes_permanent() {
    let counter = Arc::new(AtomicU32::new(0));
    let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(10));

    let counter_clone = counter.clone();
    let result: Result<(), _> = with_retry_if(
        &config,
        |e: &GatewayError| *e == GatewayError::ConnectionReset,
        move || {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GatewayError::ConnectionReset)
                } else {
                    Err(GatewayError::InvalidAddress)
                }
            }
        },
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), 2);
    assert_eq!(err.into_inner(), GatewayError::InvalidAddress);
}

#[test]
fn test_compute_delay_exponential() {
    let config = RetryConfig::new(5)
        .with_initial_delay(Duration::from_millis(100))
        .with_multiplier(2.0)
        .with_max_delay(Duration::from_secs(30));

    assert_eq!(config.compute_delay(0).as_millis(), 100);
    assert_eq!(config.compute_delay(1).as_millis(), 200);
    assert_eq!(config.compute_delay(2).as_millis(), 400);
}

#[test]
fn test_compute_delay_capped_and_non_decreasing() {
    let config = RetryConfig::new(10)
        .with_initial_delay(Duration::from_millis(100))
        .with_multiplier(3.0)
        .with_max_delay(Duration::from_secs(1));

    let delays: Vec<Duration> = (0..8).map(|a| config.compute_delay(a)).collect();
    assert!(delays.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(*delays.last().unwrap(), Duration::from_secs(1));
}

#[test]
fn test_compute_delay_with_jitter_stays_within_ten_percent() {
    let config = RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(1000))
        .with_jitter(true);

    for _ in 0..20 {
        let delay = config.compute_delay(0).as_millis();
        assert!((900..=1100).contains(&delay), "delay {delay} out of range");
    }
}

#[test]
fn test_presets() {
    let network = RetryConfig::network();
    assert_eq!(network.max_attempts, 3);
    assert_eq!(network.initial_delay, Duration::from_secs(1));
    assert!(!network.jitter);

    let api = RetryConfig::api();
    assert_eq!(api.initial_delay, Duration::from_secs(2));
    assert_eq!(api.compute_delay(1), Duration::from_secs(4));
}
