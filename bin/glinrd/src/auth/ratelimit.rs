//! Per-IP auth rate limiting (spec.md §6 `AUTH_RL_PER_MIN`, §8 "Auth rate
//! limit"): a `DashMap`-backed registry, the same shape as
//! [`glinr_cache::KeyedLocks`], tracking a rolling failure count per
//! remote address and escalating into an exponential backoff once that
//! count crosses the configured ceiling.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);
const BACKOFF_FLOOR: Duration = Duration::from_secs(60);
const BACKOFF_CAP: Duration = Duration::from_secs(60 * 60);

struct IpState {
  window_start: Instant,
  attempts: u32,
  backoff: Duration,
  blocked_until: Option<Instant>,
}

impl Default for IpState {
  fn default() -> Self {
    Self {
      window_start: Instant::now(),
      attempts: 0,
      backoff: Duration::ZERO,
      blocked_until: None,
    }
  }
}

/// Outcome of [`AuthRateLimiter::check`]: either the request may proceed,
/// or it is currently blocked with a `Retry-After` duration.
pub enum RateLimitDecision {
  Allow,
  Blocked(Duration),
}

#[derive(Default)]
pub struct AuthRateLimiter {
  ips: DashMap<String, Mutex<IpState>>,
}

impl AuthRateLimiter {
  /// Checked before a login attempt is processed.
  pub async fn check(&self, ip: &str) -> RateLimitDecision {
    let entry = self.ips.entry(ip.to_string()).or_default();
    let mut state = entry.lock().await;
    match state.blocked_until {
      Some(until) if until > Instant::now() => RateLimitDecision::Blocked(until - Instant::now()),
      _ => {
        state.blocked_until = None;
        RateLimitDecision::Allow
      }
    }
  }

  /// Records a failed login from `ip`. Once attempts within the rolling
  /// [`WINDOW`] exceed `per_min`, escalates the backoff (floor 1 minute,
  /// factor 2, cap 1 hour — spec.md §8).
  pub async fn record_failure(&self, ip: &str, per_min: u32) {
    let entry = self.ips.entry(ip.to_string()).or_default();
    let mut state = entry.lock().await;

    if state.window_start.elapsed() >= WINDOW {
      state.window_start = Instant::now();
      state.attempts = 0;
    }
    state.attempts += 1;

    if state.attempts > per_min {
      state.backoff = if state.backoff.is_zero() {
        BACKOFF_FLOOR
      } else {
        (state.backoff * 2).min(BACKOFF_CAP)
      };
      state.blocked_until = Some(Instant::now() + state.backoff);
    }
  }

  /// A successful login clears all backoff state for `ip` (spec.md §8
  /// "clearing on success").
  pub async fn record_success(&self, ip: &str) {
    if let Some(entry) = self.ips.get(ip) {
      let mut state = entry.lock().await;
      state.attempts = 0;
      state.backoff = Duration::ZERO;
      state.blocked_until = None;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn allows_until_threshold_then_blocks() {
    let limiter = AuthRateLimiter::default();
    for _ in 0..3 {
      limiter.record_failure("1.2.3.4", 3).await;
    }
    assert!(matches!(
      limiter.check("1.2.3.4").await,
      RateLimitDecision::Allow
    ));
    limiter.record_failure("1.2.3.4", 3).await;
    assert!(matches!(
      limiter.check("1.2.3.4").await,
      RateLimitDecision::Blocked(_)
    ));
  }

  #[tokio::test]
  async fn success_clears_backoff() {
    let limiter = AuthRateLimiter::default();
    for _ in 0..5 {
      limiter.record_failure("5.6.7.8", 1).await;
    }
    assert!(matches!(
      limiter.check("5.6.7.8").await,
      RateLimitDecision::Blocked(_)
    ));
    limiter.record_success("5.6.7.8").await;
    assert!(matches!(
      limiter.check("5.6.7.8").await,
      RateLimitDecision::Allow
    ));
  }
}
