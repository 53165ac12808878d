//! Weaving counters (thread-safe, advisory only).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Rewrite-path counters. Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct WeaveStats {
    /// Classes offered to `rewrite`
    pub classes_seen: Arc<AtomicU64>,
    /// Classes returned modified
    pub classes_woven: Arc<AtomicU64>,
    /// Classes returned unchanged (no match, skip rule, or cached)
    pub classes_unchanged: Arc<AtomicU64>,
    /// Definitions that failed to parse (returned unchanged)
    pub parse_failures: Arc<AtomicU64>,
    /// Ancestors that could not be resolved during matching
    pub missing_ancestors: Arc<AtomicU64>,
    /// Methods that received hook or guard code
    pub methods_woven: Arc<AtomicU64>,
    /// Capability mixins injected
    pub mixins_injected: Arc<AtomicU64>,
}

impl Default for WeaveStats {
    fn default() -> Self {
        Self {
            classes_seen: Arc::new(AtomicU64::new(0)),
            classes_woven: Arc::new(AtomicU64::new(0)),
            classes_unchanged: Arc::new(AtomicU64::new(0)),
            parse_failures: Arc::new(AtomicU64::new(0)),
            missing_ancestors: Arc::new(AtomicU64::new(0)),
            methods_woven: Arc::new(AtomicU64::new(0)),
            mixins_injected: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl WeaveStats {
    pub fn record_class_seen(&self) {
        self.classes_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_class_woven(&self) {
        self.classes_woven.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_class_unchanged(&self) {
        self.classes_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_ancestor(&self) {
        self.missing_ancestors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_method_woven(&self) {
        self.methods_woven.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mixin_injected(&self) {
        self.mixins_injected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            classes_seen: self.classes_seen.load(Ordering::Relaxed),
            classes_woven: self.classes_woven.load(Ordering::Relaxed),
            classes_unchanged: self.classes_unchanged.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            missing_ancestors: self.missing_ancestors.load(Ordering::Relaxed),
            methods_woven: self.methods_woven.load(Ordering::Relaxed),
            mixins_injected: self.mixins_injected.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.classes_seen.store(0, Ordering::Relaxed);
        self.classes_woven.store(0, Ordering::Relaxed);
        self.classes_unchanged.store(0, Ordering::Relaxed);
        self.parse_failures.store(0, Ordering::Relaxed);
        self.missing_ancestors.store(0, Ordering::Relaxed);
        self.methods_woven.store(0, Ordering::Relaxed);
        self.mixins_injected.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of counters (for reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub classes_seen: u64,
    pub classes_woven: u64,
    pub classes_unchanged: u64,
    pub parse_failures: u64,
    pub missing_ancestors: u64,
    pub methods_woven: u64,
    pub mixins_injected: u64,
}

impl StatsSnapshot {
    /// Fraction of offered classes that came back modified.
    pub fn woven_rate(&self) -> f64 {
        if self.classes_seen == 0 {
            return 0.0;
        }
        self.classes_woven as f64 / self.classes_seen as f64
    }

    /// Human-readable report.
    pub fn format_report(&self) -> String {
        format!(
            "Weave stats:\n\
             \x20 classes seen:      {}\n\
             \x20 classes woven:     {} ({:.1}%)\n\
             \x20 classes unchanged: {}\n\
             \x20 parse failures:    {}\n\
             \x20 missing ancestors: {}\n\
             \x20 methods woven:     {}\n\
             \x20 mixins injected:   {}",
            self.classes_seen,
            self.classes_woven,
            self.woven_rate() * 100.0,
            self.classes_unchanged,
            self.parse_failures,
            self.missing_ancestors,
            self.methods_woven,
            self.mixins_injected,
        )
    }
}
