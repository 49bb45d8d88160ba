//! # Rate Scheduler Module
//!
//! Admission control for calls against the embeddings API, which enforces
//! two independent per-minute quotas (a request count and a token count)
//! on top of whatever concurrency the caller runs.
//!
//! ## Key Components
//!
//! - `RateScheduler`: dual-budget scheduler with an in-flight cap
//! - `Permit`: RAII guard for one admitted call
//!
//! ## Semantics
//!
//! Both budgets replenish in full at fixed window boundaries rather than
//! trickling back continuously; this mirrors how the upstream API accounts
//! its quotas. Completing a call frees its in-flight slot but returns
//! nothing to the token budget, so sustained throughput is bounded by the
//! window refill.
//!
//! The scheduler performs no I/O of its own. [`RateScheduler::admit`]
//! never fails; it only ever suspends the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Dual-budget rate scheduler with a hard in-flight cap
pub struct RateScheduler {
    state: Mutex<BudgetState>,
    in_flight: Arc<Semaphore>,
    requests_per_window: u32,
    tokens_per_window: u64,
    window: Duration,
}

/// Remaining budget within the current window
struct BudgetState {
    window_started: Instant,
    requests_left: u32,
    tokens_left: u64,
}

impl BudgetState {
    /// Advance past any fully elapsed windows, refilling budgets in full.
    /// Refill is all-at-once at the boundary, never incremental.
    fn refill_elapsed(&mut self, now: Instant, requests: u32, tokens: u64, window: Duration) {
        if now.duration_since(self.window_started) < window {
            return;
        }
        let elapsed = now.duration_since(self.window_started);
        let windows = elapsed.as_nanos() / window.as_nanos().max(1);
        self.window_started += window * windows as u32;
        self.requests_left = requests;
        self.tokens_left = tokens;
    }
}

/// Guard for one admitted call.
///
/// Dropping the permit frees the in-flight slot. The tokens reserved at
/// admission are not returned; they come back only at the window refill.
pub struct Permit {
    _in_flight: OwnedSemaphorePermit,
}

impl RateScheduler {
    /// Create a scheduler with the given per-window budgets and in-flight cap
    pub fn new(
        requests_per_window: u32,
        tokens_per_window: u64,
        max_in_flight: usize,
        window: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                window_started: Instant::now(),
                requests_left: requests_per_window,
                tokens_left: tokens_per_window,
            }),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            requests_per_window,
            tokens_per_window,
            window,
        }
    }

    /// Admit one call of the given token weight.
    ///
    /// Suspends until an in-flight slot is free and the current window has
    /// both a request slot and sufficient tokens remaining, then reserves
    /// all three atomically. A weight above the full token budget is still
    /// admitted once an untouched window is available, so oversized calls
    /// wait at most one window rather than deadlocking.
    pub async fn admit(&self, weight: u64) -> Permit {
        let in_flight = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .expect("in-flight semaphore never closed");

        // Oversized requests are satisfied by a full window.
        let required = weight.min(self.tokens_per_window);

        loop {
            let now = Instant::now();
            let mut state = self.state.lock().await;
            state.refill_elapsed(
                now,
                self.requests_per_window,
                self.tokens_per_window,
                self.window,
            );

            if state.requests_left >= 1 && state.tokens_left >= required {
                state.requests_left -= 1;
                state.tokens_left = state.tokens_left.saturating_sub(weight);
                return Permit {
                    _in_flight: in_flight,
                };
            }

            // Budget exhausted; wait out the rest of the window.
            let boundary = state.window_started + self.window;
            debug!(
                "Rate budget exhausted ({} requests, {} tokens left; need {}). Waiting for window refill.",
                state.requests_left, state.tokens_left, required
            );
            drop(state);
            tokio::time::sleep_until(boundary).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_admits_within_budget_without_waiting() {
        let scheduler = RateScheduler::new(5, 1000, 5, Duration::from_secs(60));
        let before = Instant::now();
        for _ in 0..5 {
            let _permit = scheduler.admit(100).await;
        }
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_budget_blocks_extra_call_until_window() {
        // Budget of N requests per window: the (N+1)th admission must not
        // complete before the next window boundary.
        let scheduler = Arc::new(RateScheduler::new(3, 1_000_000, 10, Duration::from_secs(60)));

        for _ in 0..3 {
            let _permit = scheduler.admit(1).await;
        }

        let sched = scheduler.clone();
        let extra = tokio::spawn(async move {
            let _permit = sched.admit(1).await;
            Instant::now()
        });

        let start = Instant::now();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!extra.is_finished());

        tokio::time::advance(Duration::from_secs(2)).await;
        let completed_at = extra.await.unwrap();
        assert!(completed_at.duration_since(start) >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_budget_depletes_independently_of_requests() {
        let scheduler = Arc::new(RateScheduler::new(100, 500, 10, Duration::from_secs(60)));

        // Two calls drain the token budget while plenty of requests remain.
        let _a = scheduler.admit(300).await;
        let _b = scheduler.admit(200).await;

        let sched = scheduler.clone();
        let blocked = tokio::spawn(async move {
            let _permit = sched.admit(1).await;
        });

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!blocked.is_finished());

        tokio::time::advance(Duration::from_secs(31)).await;
        blocked.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_weight_takes_full_window_without_deadlock() {
        let scheduler = Arc::new(RateScheduler::new(10, 100, 10, Duration::from_secs(60)));

        // Fresh window is full, so the oversized call goes straight through
        // and pins the budget to zero.
        let _big = scheduler.admit(1000).await;

        let sched = scheduler.clone();
        let next = tokio::spawn(async move {
            let _permit = sched.admit(1).await;
        });

        tokio::time::advance(Duration::from_secs(61)).await;
        next.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_drop_frees_in_flight_slot_only() {
        let scheduler = Arc::new(RateScheduler::new(100, 1_000_000, 1, Duration::from_secs(60)));

        let first = scheduler.admit(10).await;

        let sched = scheduler.clone();
        let second = tokio::spawn(async move {
            let _permit = sched.admit(10).await;
        });

        // Capped at one in-flight call; the second waits on the slot even
        // though both budgets have room.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!second.is_finished());

        drop(first);
        second.await.unwrap();
    }
}
