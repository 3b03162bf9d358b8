//! Pure crash-loop arithmetic (spec.md §4.4, §8 "Crash-loop math"), kept
//! free of I/O so the sliding-window edge cases are easy to test directly.

const WINDOW_MS: i64 = 10 * 60 * 1000;
const THRESHOLD: i64 = 5;

/// Result of folding one observed restart (with its exit code) into a
/// service's restart-window accounting.
pub struct RestartOutcome {
  pub restart_count: i64,
  pub window_start: i64,
  pub should_crash_loop: bool,
}

/// Folds one observed restart into the sliding window (spec.md §4.4):
/// resets the window and counter when the prior window is null or expired,
/// otherwise increments, then checks the crash-loop predicate.
pub fn apply_restart(
  prior_restart_count: i64,
  prior_window_start: Option<i64>,
  exit_code: i32,
  now_ms: i64,
) -> RestartOutcome {
  let window_expired = prior_window_start
    .map(|start| now_ms - start >= WINDOW_MS)
    .unwrap_or(true);

  let (restart_count, window_start) = if window_expired {
    (1, now_ms)
  } else {
    (prior_restart_count + 1, prior_window_start.unwrap())
  };

  let should_crash_loop =
    exit_code != 0 && restart_count >= THRESHOLD && now_ms - window_start < WINDOW_MS;

  RestartOutcome {
    restart_count,
    window_start,
    should_crash_loop,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fifth_nonzero_exit_within_window_latches() {
    let mut count = 0i64;
    let mut window: Option<i64> = None;
    let mut last = RestartOutcome {
      restart_count: 0,
      window_start: 0,
      should_crash_loop: false,
    };
    for tick in 0..5 {
      last = apply_restart(count, window, 1, tick * 1000);
      count = last.restart_count;
      window = Some(last.window_start);
    }
    assert_eq!(last.restart_count, 5);
    assert!(last.should_crash_loop);
  }

  #[test]
  fn zero_exit_code_never_latches() {
    let mut count = 0i64;
    let mut window: Option<i64> = None;
    let mut last_latched = false;
    for tick in 0..10 {
      let outcome = apply_restart(count, window, 0, tick * 1000);
      count = outcome.restart_count;
      window = Some(outcome.window_start);
      last_latched = outcome.should_crash_loop;
    }
    assert!(!last_latched);
  }

  #[test]
  fn window_reset_after_ten_minutes_requires_fresh_burst() {
    let first = apply_restart(0, None, 1, 0);
    assert_eq!(first.restart_count, 1);

    // four more quick restarts, still inside the window: latches at five.
    let mut count = first.restart_count;
    let mut window = Some(first.window_start);
    let mut outcome = first;
    for tick in 1..5 {
      outcome = apply_restart(count, window, 1, tick * 1000);
      count = outcome.restart_count;
      window = Some(outcome.window_start);
    }
    assert!(outcome.should_crash_loop);

    // an event arriving after the window expires resets the counter.
    let reset = apply_restart(count, window, 1, window.unwrap() + WINDOW_MS + 1);
    assert_eq!(reset.restart_count, 1);
    assert!(!reset.should_crash_loop);
  }
}
