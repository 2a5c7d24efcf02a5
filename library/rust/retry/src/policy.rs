use std::time::Duration;

/// 指数バックオフ付きリトライの設定。
///
/// `attempt` 回目（0 始まり）の失敗後の待機時間は
/// `initial_delay * multiplier^attempt` を `max_delay` で打ち切った値になる。
/// ジッターを有効にすると待機時間が単調増加しなくなるため、既定では無効。
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// ネットワークエラー（タイムアウト・接続断）向けのプリセット。
    pub fn network() -> Self {
        Self::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_multiplier(2.0)
    }

    /// 外部 API エラー（5xx・レートリミット）向けのプリセット。
    pub fn api() -> Self {
        Self::new(3)
            .with_initial_delay(Duration::from_secs(2))
            .with_multiplier(2.0)
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// `attempt` 回目（0 始まり）の失敗後に待つ時間を返す。
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay_ms = if self.jitter {
            let jitter_range = capped * 0.1;
            capped - jitter_range + (rand::random::<f64>() * jitter_range * 2.0)
        } else {
            capped
        };
        Duration::from_millis(delay_ms.round().max(0.0) as u64)
    }
}
