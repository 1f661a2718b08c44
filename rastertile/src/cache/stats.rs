//! Cache statistics tracking and reporting.

use std::fmt;

use crate::config::format_size;

/// Snapshot of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Dereferences served from a resident value
    pub hits: u64,
    /// Successful calls to a generator
    pub generations: u64,
    /// Generator calls that returned an error or panicked
    pub failed_generations: u64,
    /// Values dropped to stay within budget
    pub evictions: u64,
    pub resident_bytes: usize,
    pub resident_entries: usize,
    pub max_bytes: usize,
}

impl CacheStats {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    /// Fraction of dereferences served without generating (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.generations;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_generation(&mut self) {
        self.generations += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_generations += 1;
    }

    pub(crate) fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache Statistics")?;
        writeln!(f, "  Entries:      {}", self.resident_entries)?;
        writeln!(
            f,
            "  Resident:     {} of {}",
            format_size(self.resident_bytes),
            format_size(self.max_bytes)
        )?;
        writeln!(f, "  Hits:         {}", self.hits)?;
        writeln!(f, "  Generations:  {}", self.generations)?;
        writeln!(f, "  Failures:     {}", self.failed_generations)?;
        writeln!(f, "  Evictions:    {}", self.evictions)?;
        write!(f, "  Hit Rate:     {:.1}%", self.hit_rate() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::new(10).hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_generations_as_misses() {
        let mut stats = CacheStats::new(10);
        stats.record_generation();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_do_not_affect_hit_rate() {
        let mut stats = CacheStats::new(10);
        stats.record_hit();
        stats.record_failure();
        assert_eq!(stats.hit_rate(), 1.0);
        assert_eq!(stats.failed_generations, 1);
    }

    #[test]
    fn test_display() {
        let mut stats = CacheStats::new(2 * 1024 * 1024);
        stats.resident_bytes = 1024 * 1024;
        stats.resident_entries = 4;
        stats.record_evictions(3);
        let text = stats.to_string();
        assert!(text.contains("Entries:      4"));
        assert!(text.contains("Resident:     1MB of 2MB"));
        assert!(text.contains("Evictions:    3"));
    }
}
