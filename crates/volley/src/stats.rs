//! Stats Counter
//!
//! Process-wide running/done/failed tallies shared by every worker.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Session lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A session started its script
    Running,
    /// A running session finished its script
    Done,
    /// A running session failed
    Failed,
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatCounts {
    /// Sessions currently running
    pub running: u64,
    /// Sessions that completed their script
    pub done: u64,
    /// Sessions that failed
    pub failed: u64,
}

impl StatCounts {
    /// Sessions that reached a terminal state
    #[must_use]
    pub const fn finished(&self) -> u64 {
        self.done + self.failed
    }
}

impl fmt::Display for StatCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Running: {}, Failed: {}, Done: {}",
            self.running, self.failed, self.done
        )
    }
}

/// Thread-safe session counters
///
/// All three counters move together under one lock, so a snapshot never shows
/// a session as both running and finished.
#[derive(Debug, Default)]
pub struct Stats {
    counts: Mutex<StatCounts>,
}

impl Stats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition
    pub fn transition(&self, transition: Transition) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        match transition {
            Transition::Running => counts.running += 1,
            Transition::Done => {
                counts.running = counts.running.saturating_sub(1);
                counts.done += 1;
            }
            Transition::Failed => {
                counts.running = counts.running.saturating_sub(1);
                counts.failed += 1;
            }
        }
    }

    /// Current counters
    #[must_use]
    pub fn counts(&self) -> StatCounts {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.counts().fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_transitions() {
        let stats = Stats::new();
        stats.transition(Transition::Running);
        stats.transition(Transition::Running);
        stats.transition(Transition::Done);
        assert_eq!(
            stats.counts(),
            StatCounts {
                running: 1,
                done: 1,
                failed: 0
            }
        );
        stats.transition(Transition::Failed);
        assert_eq!(stats.counts().running, 0);
        assert_eq!(stats.counts().failed, 1);
        assert_eq!(stats.counts().finished(), 2);
    }

    #[test]
    fn test_display() {
        let stats = Stats::new();
        stats.transition(Transition::Running);
        assert_eq!(stats.to_string(), "Running: 1, Failed: 0, Done: 0");
    }

    #[test]
    fn test_concurrent_transitions_balance() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.transition(Transition::Running);
                        if i % 2 == 0 {
                            stats.transition(Transition::Done);
                        } else {
                            stats.transition(Transition::Failed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let counts = stats.counts();
        assert_eq!(counts.running, 0);
        assert_eq!(counts.done, 400);
        assert_eq!(counts.failed, 400);
    }
}
