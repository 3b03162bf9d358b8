//! Service lifecycle: desired-state transitions and the crash-loop
//! governor (spec.md §4.4).

pub mod crashloop;
pub mod governor;
