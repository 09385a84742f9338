//! Timer-driven load progress.
//!
//! Backends don't report byte-level progress, so the UI gets a bounded
//! approximation: a fixed step every interval, capped below 100 until the
//! real operation completes. The ticker is torn down explicitly when the
//! load finishes, and on drop if the load future is abandoned.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shape of the fake progress curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Percentage added per tick
    pub step: u8,
    /// Highest value reported before completion
    pub cap: u8,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            step: 5,
            cap: 90,
        }
    }
}

/// Cancellable periodic task emitting progress values
pub(crate) struct ProgressTicker {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Spawn the ticker. `on_tick` receives each new value; returning
    /// `false` stops the ticker early.
    pub fn start<F>(config: ProgressConfig, on_tick: F) -> Self
    where
        F: Fn(u8) -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let cap = config.cap.min(99);

        let handle = tokio::spawn(async move {
            let mut progress = 0u8;
            let mut interval = tokio::time::interval(config.interval);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if progress >= cap {
                            continue;
                        }
                        progress = progress.saturating_add(config.step).min(cap);
                        if !on_tick(progress) {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for the task to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Progress ticker task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fast_config() -> ProgressConfig {
        ProgressConfig {
            interval: Duration::from_millis(5),
            step: 30,
            cap: 90,
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_capped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ticker = ProgressTicker::start(fast_config(), move |p| {
            sink.lock().unwrap().push(p);
            true
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        ticker.stop().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![30, 60, 90]);
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ticker = ProgressTicker::start(
            ProgressConfig {
                interval: Duration::from_millis(5),
                step: 1,
                cap: 90,
            },
            move |p| {
                sink.lock().unwrap().push(p);
                true
            },
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        ticker.stop().await;
        let count = seen.lock().unwrap().len();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(seen.lock().unwrap().len(), count);
    }

    #[tokio::test]
    async fn test_callback_can_stop_ticker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ticker = ProgressTicker::start(fast_config(), move |p| {
            sink.lock().unwrap().push(p);
            false
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        ticker.stop().await;
        assert_eq!(seen.lock().unwrap().clone(), vec![30]);
    }
}
