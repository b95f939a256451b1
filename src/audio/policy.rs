use std::time::Duration;

use crate::config::Config;

/// Reintentos de streams continuos (radio).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Un stream que duró al menos esto antes de fallar reinicia el contador.
    pub stable_after: Duration,
}

impl RetryPolicy {
    /// Backoff exponencial acotado: base, 2·base, 4·base ... hasta `max_backoff`.
    ///
    /// `attempt` empieza en 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// `backoff` más hasta un 20% de jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        backoff + backoff.mul_f64(fastrand::f64() * 0.2)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

/// Constantes de política de una sesión de guild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionPolicy {
    pub retry: RetryPolicy,
    pub idle_disconnect_after: Duration,
    pub max_queue_size: usize,
}

impl From<&Config> for SessionPolicy {
    fn from(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: config.radio_max_retries,
                base_backoff: config.radio_retry_backoff,
                max_backoff: config.radio_retry_backoff_max,
                stable_after: config.stream_stable_after,
            },
            idle_disconnect_after: config.idle_disconnect_after,
            max_queue_size: config.max_queue_size,
        }
    }
}
