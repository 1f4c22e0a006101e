//! Jittered pacing between page interactions.
//!
//! Discovery fills and clicks run against live third-party sites, so each
//! interaction is separated by a short randomized pause. This is pacing,
//! not fingerprint evasion: the bounds are small and every pause is capped.

use rand::Rng;
use std::time::Duration;

/// Pause bounds applied between individual field fills.
pub const FILL_PAUSE_MS: (u64, u64) = (120, 400);

/// Pause bounds applied before clicking a control.
pub const CLICK_PAUSE_MS: (u64, u64) = (250, 900);

/// Sleep for a uniformly random duration in `[min_ms, max_ms]`.
pub async fn pause_between(min_ms: u64, max_ms: u64) {
    let ms = if max_ms > min_ms {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Standard pause before a form fill.
pub async fn before_fill() {
    pause_between(FILL_PAUSE_MS.0, FILL_PAUSE_MS.1).await;
}

/// Standard pause before a click.
pub async fn before_click() {
    pause_between(CLICK_PAUSE_MS.0, CLICK_PAUSE_MS.1).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_pause_respects_bounds() {
        let start = Instant::now();
        pause_between(10, 30).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
        // Generous upper bound to avoid scheduler flakiness.
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_degenerate_range() {
        // min == max must not panic.
        pause_between(5, 5).await;
    }
}
