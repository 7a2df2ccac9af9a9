//! Throttling for repeated warnings
//!
//! A unit that keeps failing the same way is reconciled over and over. The
//! filter only lets a warning through once it has been seen often enough and
//! for long enough.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::WarningConfig;

#[derive(Debug, Clone, Copy)]
struct Entry {
    enter_time: Instant,
    count: u32,
}

/// Per-name warning gate, shared across concurrent reconciles
#[derive(Debug)]
pub struct WarningFilter {
    count_threshold: u32,
    time_threshold: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl WarningFilter {
    pub fn new(count_threshold: u32, time_threshold: Duration) -> Self {
        Self {
            count_threshold,
            time_threshold,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &WarningConfig) -> Self {
        Self::new(config.count_threshold, config.time_threshold)
    }

    /// Record an occurrence; returns a message once both thresholds are met
    pub fn warning(&self, name: &str) -> Option<String> {
        self.warning_at(name, Instant::now())
    }

    /// [`warning`](Self::warning) with an explicit clock
    pub fn warning_at(&self, name: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(name.to_string()).or_insert(Entry {
            enter_time: now,
            count: 0,
        });
        entry.count = entry.count.saturating_add(1);

        let elapsed = now.saturating_duration_since(entry.enter_time);
        if entry.count >= self.count_threshold && elapsed >= self.time_threshold {
            Some(format!(
                "'{}' has been warning for {} ({} times)",
                name,
                humantime_serde::re::humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
                entry.count
            ))
        } else {
            None
        }
    }

    /// Forget a name once its problem is resolved
    pub fn clear(&self, name: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Number of names currently tracked
    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for WarningFilter {
    fn default() -> Self {
        Self::from_config(&WarningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WarningFilter {
        WarningFilter::new(3, Duration::from_secs(60))
    }

    #[test]
    fn test_count_alone_does_not_warn() {
        let filter = filter();
        let start = Instant::now();
        for i in 0..3 {
            assert!(filter.warning_at("web", start + Duration::from_secs(i)).is_none());
        }
    }

    #[test]
    fn test_count_and_time_warn() {
        let filter = filter();
        let start = Instant::now();
        assert!(filter.warning_at("web", start).is_none());
        assert!(filter.warning_at("web", start + Duration::from_secs(30)).is_none());

        let message = filter.warning_at("web", start + Duration::from_secs(60)).unwrap();
        assert!(message.contains("'web'"));
        assert!(message.contains("3 times"));

        // Keeps emitting while the problem persists
        assert!(filter.warning_at("web", start + Duration::from_secs(61)).is_some());
    }

    #[test]
    fn test_time_alone_does_not_warn() {
        let filter = filter();
        let start = Instant::now();
        assert!(filter.warning_at("web", start).is_none());
        assert!(filter.warning_at("web", start + Duration::from_secs(600)).is_none());
    }

    #[test]
    fn test_clear_resets_both_gates() {
        let filter = filter();
        let start = Instant::now();
        filter.warning_at("web", start);
        filter.warning_at("web", start + Duration::from_secs(30));
        filter.clear("web");
        assert_eq!(filter.tracked(), 0);

        // Third call overall, well past the threshold, but tracking restarted
        assert!(filter.warning_at("web", start + Duration::from_secs(90)).is_none());
    }

    #[test]
    fn test_names_are_independent() {
        let filter = filter();
        let start = Instant::now();
        filter.warning_at("a", start);
        filter.warning_at("a", start);
        assert!(filter.warning_at("b", start + Duration::from_secs(120)).is_none());
        assert_eq!(filter.tracked(), 2);
    }
}
