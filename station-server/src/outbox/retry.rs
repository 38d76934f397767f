//! Retry Strategy
//!
//! Policy engine for the outbox dispatcher: exponential backoff, per-category
//! retry/dead-letter decisions, and adaptive batch sizing. Pure computation
//! apart from the batch-size counters, which live behind a mutex so the
//! strategy can be shared across dispatcher tasks.

use rand::Rng;
use shared::models::{DeadLetterReason, ErrorCategory};
use std::sync::Mutex;

/// Retry/backoff tuning. Defaults match the dispatcher's production profile.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Jitter fraction: the final delay is spread within ±this factor
    pub jitter_factor: f64,
    /// Default attempt ceiling for enqueued items
    pub max_attempts: i64,
    pub default_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Consecutive successes required before the batch size grows back
    pub recovery_threshold: u32,
    pub recovery_factor: f64,
    /// Failure ratios below this leave the batch size unchanged
    pub failure_ratio_floor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            jitter_factor: 0.1,
            max_attempts: 5,
            default_batch_size: 50,
            min_batch_size: 5,
            max_batch_size: 200,
            recovery_threshold: 3,
            recovery_factor: 1.5,
            failure_ratio_floor: 0.1,
        }
    }
}

/// Outcome of [`RetryStrategy::make_retry_decision`]
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay_ms`
    Retry { delay_ms: u64 },
    /// Park the item; no further automatic attempts
    DeadLetter { reason: DeadLetterReason },
}

#[derive(Debug)]
struct BatchState {
    current_size: usize,
    consecutive_successes: u32,
}

/// Shared retry policy. Cheap to clone behind an `Arc`.
#[derive(Debug)]
pub struct RetryStrategy {
    config: RetryConfig,
    batch: Mutex<BatchState>,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        let batch = Mutex::new(BatchState {
            current_size: config.default_batch_size,
            consecutive_successes: 0,
        });
        Self { config, batch }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Deterministic backoff: `base * multiplier^attempt`, capped, with the
    /// extended 1.5x penalty for unclassified failures. No jitter.
    fn raw_backoff(&self, attempt: i64, category: Option<ErrorCategory>) -> u64 {
        let exp = self.config.base_delay_ms as f64 * self.config.multiplier.powi(attempt as i32);
        let capped = exp.min(self.config.max_delay_ms as f64);
        let adjusted = match category {
            None | Some(ErrorCategory::Unknown) => capped * 1.5,
            Some(_) => capped,
        };
        adjusted as u64
    }

    /// Backoff delay with jitter applied
    pub fn calculate_backoff_delay(&self, attempt: i64, category: Option<ErrorCategory>) -> u64 {
        let delay = self.raw_backoff(attempt, category);
        if self.config.jitter_factor <= 0.0 || delay == 0 {
            return delay;
        }
        let spread = delay as f64 * self.config.jitter_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        (delay as f64 + offset).max(0.0) as u64
    }

    /// Epoch millis of the earliest next attempt
    pub fn calculate_retry_after(&self, attempt: i64, category: Option<ErrorCategory>) -> i64 {
        shared::util::now_millis() + self.calculate_backoff_delay(attempt, category) as i64
    }

    /// Decide the fate of a failed item.
    ///
    /// `attempt` is the count AFTER the failure being recorded. A future
    /// server-supplied `retry_after` (epoch millis) overrides the computed
    /// delay; an elapsed one falls back to backoff.
    pub fn make_retry_decision(
        &self,
        attempt: i64,
        max_attempts: i64,
        category: Option<ErrorCategory>,
        server_retry_after: Option<i64>,
    ) -> RetryDecision {
        let dead_letter = match category {
            Some(ErrorCategory::Structural) => Some(DeadLetterReason::StructuralFailure),
            Some(ErrorCategory::Permanent) if attempt >= max_attempts => {
                Some(DeadLetterReason::PermanentError)
            }
            Some(ErrorCategory::Conflict) if attempt >= max_attempts => {
                Some(DeadLetterReason::ConflictError)
            }
            Some(ErrorCategory::Transient) if attempt >= 2 * max_attempts => {
                Some(DeadLetterReason::MaxAttemptsExceeded)
            }
            Some(ErrorCategory::Unknown) | None if attempt >= max_attempts => {
                Some(DeadLetterReason::MaxAttemptsExceeded)
            }
            _ => None,
        };

        if let Some(reason) = dead_letter {
            return RetryDecision::DeadLetter { reason };
        }

        let now = shared::util::now_millis();
        let delay_ms = match server_retry_after {
            Some(at) if at > now => (at - now) as u64,
            _ => self.calculate_backoff_delay(attempt, category),
        };
        RetryDecision::Retry { delay_ms }
    }

    /// Whether enough time has passed since the last attempt.
    ///
    /// Uses the jitter-free backoff so the answer is deterministic for a
    /// given clock reading.
    pub fn is_ready_for_retry(
        &self,
        last_attempt_at: Option<i64>,
        attempt: i64,
        category: Option<ErrorCategory>,
        retry_after: Option<i64>,
    ) -> bool {
        let now = shared::util::now_millis();
        let Some(last) = last_attempt_at else {
            return true;
        };
        if let Some(at) = retry_after {
            return now >= at;
        }
        now - last >= self.raw_backoff(attempt, category) as i64
    }

    pub fn current_batch_size(&self) -> usize {
        self.batch.lock().unwrap().current_size
    }

    /// Record a fully-successful dispatch batch. After `recovery_threshold`
    /// consecutive clean batches the size grows by `recovery_factor`, capped
    /// at the default.
    pub fn record_batch_success(&self) {
        let mut state = self.batch.lock().unwrap();
        state.consecutive_successes += 1;
        if state.consecutive_successes >= self.config.recovery_threshold {
            state.consecutive_successes = 0;
            let grown = (state.current_size as f64 * self.config.recovery_factor).round() as usize;
            state.current_size = grown.min(self.config.default_batch_size);
        }
    }

    /// Record a batch containing failures. Shrinks proportionally to the
    /// failure ratio, floored at `min_batch_size`; ratios under the floor
    /// threshold are treated as noise.
    pub fn record_batch_failure(&self, failure_ratio: f64) {
        let mut state = self.batch.lock().unwrap();
        state.consecutive_successes = 0;
        if failure_ratio < self.config.failure_ratio_floor {
            return;
        }
        let shrunk = (state.current_size as f64 * (1.0 - failure_ratio.min(1.0))).round() as usize;
        state.current_size = shrunk.max(self.config.min_batch_size);
    }

    pub fn reset_batch_size(&self) {
        let mut state = self.batch.lock().unwrap();
        state.current_size = self.config.default_batch_size;
        state.consecutive_successes = 0;
    }

    pub fn set_batch_size(&self, size: usize) {
        let mut state = self.batch.lock().unwrap();
        state.current_size = size.clamp(self.config.min_batch_size, self.config.max_batch_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jitterless() -> RetryStrategy {
        RetryStrategy::new(RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn test_backoff_progression() {
        let strategy = jitterless();
        assert_eq!(strategy.calculate_backoff_delay(0, Some(ErrorCategory::Transient)), 1000);
        assert_eq!(strategy.calculate_backoff_delay(1, Some(ErrorCategory::Transient)), 2000);
        assert_eq!(strategy.calculate_backoff_delay(2, Some(ErrorCategory::Transient)), 4000);
    }

    #[test]
    fn test_unknown_category_extended_delay() {
        let strategy = jitterless();
        assert_eq!(strategy.calculate_backoff_delay(2, Some(ErrorCategory::Unknown)), 6000);
        assert_eq!(strategy.calculate_backoff_delay(2, None), 6000);
    }

    #[test]
    fn test_backoff_capped() {
        let strategy = jitterless();
        // 1000 * 2^20 far exceeds the 300s cap
        assert_eq!(strategy.calculate_backoff_delay(20, Some(ErrorCategory::Transient)), 300_000);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let strategy = RetryStrategy::new(RetryConfig {
            jitter_factor: 0.1,
            ..RetryConfig::default()
        });
        for _ in 0..100 {
            let delay = strategy.calculate_backoff_delay(2, Some(ErrorCategory::Transient));
            assert!((3600..=4400).contains(&delay), "delay {delay} outside jitter bounds");
        }
    }

    #[test]
    fn test_structural_always_dead_letters() {
        let strategy = jitterless();
        for attempt in [0, 1, 100] {
            let decision =
                strategy.make_retry_decision(attempt, 5, Some(ErrorCategory::Structural), None);
            assert_eq!(
                decision,
                RetryDecision::DeadLetter { reason: DeadLetterReason::StructuralFailure }
            );
        }
    }

    #[test]
    fn test_permanent_and_conflict_windows() {
        let strategy = jitterless();
        assert!(matches!(
            strategy.make_retry_decision(4, 5, Some(ErrorCategory::Permanent), None),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(
            strategy.make_retry_decision(5, 5, Some(ErrorCategory::Permanent), None),
            RetryDecision::DeadLetter { reason: DeadLetterReason::PermanentError }
        );
        assert_eq!(
            strategy.make_retry_decision(5, 5, Some(ErrorCategory::Conflict), None),
            RetryDecision::DeadLetter { reason: DeadLetterReason::ConflictError }
        );
    }

    #[test]
    fn test_transient_extended_window() {
        let strategy = jitterless();
        // Past the normal ceiling but inside 2x
        assert!(matches!(
            strategy.make_retry_decision(9, 5, Some(ErrorCategory::Transient), None),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(
            strategy.make_retry_decision(10, 5, Some(ErrorCategory::Transient), None),
            RetryDecision::DeadLetter { reason: DeadLetterReason::MaxAttemptsExceeded }
        );
    }

    #[test]
    fn test_unknown_normal_window() {
        let strategy = jitterless();
        assert_eq!(
            strategy.make_retry_decision(5, 5, None, None),
            RetryDecision::DeadLetter { reason: DeadLetterReason::MaxAttemptsExceeded }
        );
    }

    #[test]
    fn test_server_retry_after_honored_when_future() {
        let strategy = jitterless();
        let future = shared::util::now_millis() + 60_000;
        match strategy.make_retry_decision(1, 5, Some(ErrorCategory::Transient), Some(future)) {
            RetryDecision::Retry { delay_ms } => {
                assert!((59_000..=60_000).contains(&delay_ms), "delay {delay_ms}");
            }
            other => panic!("expected Retry, got {other:?}"),
        }

        // Elapsed server hint falls back to computed backoff
        let past = shared::util::now_millis() - 1000;
        match strategy.make_retry_decision(1, 5, Some(ErrorCategory::Transient), Some(past)) {
            RetryDecision::Retry { delay_ms } => assert_eq!(delay_ms, 2000),
            other => panic!("expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn test_is_ready_for_retry() {
        let strategy = jitterless();
        assert!(strategy.is_ready_for_retry(None, 0, None, None));

        let now = shared::util::now_millis();
        assert!(!strategy.is_ready_for_retry(Some(now), 1, None, Some(now + 60_000)));
        assert!(strategy.is_ready_for_retry(Some(now), 1, None, Some(now - 1)));

        // No explicit hold: compare elapsed time against raw backoff (2000ms
        // at attempt 1 for a classified category)
        assert!(strategy.is_ready_for_retry(
            Some(now - 3000),
            1,
            Some(ErrorCategory::Transient),
            None
        ));
        assert!(!strategy.is_ready_for_retry(
            Some(now - 1000),
            1,
            Some(ErrorCategory::Transient),
            None
        ));
    }

    #[test]
    fn test_batch_shrink_and_recovery() {
        let strategy = jitterless();
        assert_eq!(strategy.current_batch_size(), 50);

        // Small failure ratios are noise
        strategy.record_batch_failure(0.05);
        assert_eq!(strategy.current_batch_size(), 50);

        strategy.record_batch_failure(0.5);
        assert_eq!(strategy.current_batch_size(), 25);

        // Total failure slams to the floor
        strategy.record_batch_failure(1.0);
        assert_eq!(strategy.current_batch_size(), 5);

        // Three clean batches grow by 1.5x
        strategy.record_batch_success();
        strategy.record_batch_success();
        assert_eq!(strategy.current_batch_size(), 5);
        strategy.record_batch_success();
        assert_eq!(strategy.current_batch_size(), 8);

        // Recovery never exceeds the default
        for _ in 0..30 {
            strategy.record_batch_success();
        }
        assert_eq!(strategy.current_batch_size(), 50);
    }

    #[test]
    fn test_set_batch_size_clamps() {
        let strategy = jitterless();
        strategy.set_batch_size(1000);
        assert_eq!(strategy.current_batch_size(), 200);
        strategy.set_batch_size(1);
        assert_eq!(strategy.current_batch_size(), 5);
        strategy.reset_batch_size();
        assert_eq!(strategy.current_batch_size(), 50);
    }
}
