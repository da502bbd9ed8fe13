//! Discovery window computation.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::SearchWindow;

/// Compute the discovery window `[now - min_age - lookback, now - min_age]`.
///
/// The `min_age` offset is a hard requirement, not a tuning knob: querying
/// the near-real-time band is forbidden by the data license, so the window
/// must always end `min_age` in the past.
pub fn search_window(now: DateTime<Utc>, min_age: Duration, lookback: Duration) -> SearchWindow {
    let end = now - min_age;
    SearchWindow {
        start: end - lookback,
        end,
    }
}
