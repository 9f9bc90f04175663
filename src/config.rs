use std::time::Duration;

const DEFAULT_LOCK_WAIT_MS: u64 = 5_000;

/// Runtime settings for the engine, loaded from the environment with CLI
/// overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum time an operation waits to acquire a wallet row lock before
    /// failing `Busy`.
    pub lock_wait: Duration,
}

impl Settings {
    /// Loads settings. `lock_wait_ms` (from the CLI) takes precedence over
    /// the `WALLET_LOCK_WAIT_MS` environment variable.
    pub fn load(lock_wait_ms: Option<u64>) -> Self {
        let ms = lock_wait_ms
            .or_else(|| {
                std::env::var("WALLET_LOCK_WAIT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_LOCK_WAIT_MS);
        Self {
            lock_wait: Duration::from_millis(ms),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
        }
    }
}
