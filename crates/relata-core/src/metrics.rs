use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stage counters for one fallback stage name.
#[derive(Debug, Default)]
struct StageCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    result_count: AtomicU64,
}

/// Stage-level observability for planning, fallback execution and failures.
/// Every record call is gated on the enabled flag so a disabled instance
/// costs a single branch.
pub struct QueryMetrics {
    enabled: bool,
    plans_total: AtomicU64,
    plan_cache_hits: AtomicU64,
    plan_generation_failures: AtomicU64,
    plan_duration_ms_total: AtomicU64,
    execution_failures: AtomicU64,
    execution_failure_ms_total: AtomicU64,
    stages: DashMap<String, StageCounters>,
}

impl QueryMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            plans_total: AtomicU64::new(0),
            plan_cache_hits: AtomicU64::new(0),
            plan_generation_failures: AtomicU64::new(0),
            plan_duration_ms_total: AtomicU64::new(0),
            execution_failures: AtomicU64::new(0),
            execution_failure_ms_total: AtomicU64::new(0),
            stages: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn record_plan(&self, duration_ms: u64, cache_hit: bool, generation_succeeded: bool) {
        if !self.enabled {
            return;
        }
        self.plans_total.fetch_add(1, Ordering::Relaxed);
        self.plan_duration_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
        if cache_hit {
            self.plan_cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if !generation_succeeded {
            self.plan_generation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_fallback_stage(&self, stage: &str, success: bool, result_count: usize) {
        if !self.enabled {
            return;
        }
        let counters = self.stages.entry(stage.to_string()).or_default();
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        }
        counters.result_count.fetch_add(result_count as u64, Ordering::Relaxed);
        tracing::debug!(stage, success, result_count, "Recorded fallback stage");
    }

    pub fn record_execution_failure(&self, duration_ms: u64) {
        if !self.enabled {
            return;
        }
        self.execution_failures.fetch_add(1, Ordering::Relaxed);
        self.execution_failure_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_total: self.plans_total.load(Ordering::Relaxed),
            plan_cache_hits: self.plan_cache_hits.load(Ordering::Relaxed),
            plan_generation_failures: self.plan_generation_failures.load(Ordering::Relaxed),
            plan_duration_ms_total: self.plan_duration_ms_total.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
            stages: self
                .stages
                .iter()
                .map(|entry| {
                    (
                        entry.key().clone(),
                        StageSnapshot {
                            attempts: entry.attempts.load(Ordering::Relaxed),
                            successes: entry.successes.load(Ordering::Relaxed),
                            result_count: entry.result_count.load(Ordering::Relaxed),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub result_count: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub plans_total: u64,
    pub plan_cache_hits: u64,
    pub plan_generation_failures: u64,
    pub plan_duration_ms_total: u64,
    pub execution_failures: u64,
    pub stages: std::collections::HashMap<String, StageSnapshot>,
}

impl MetricsSnapshot {
    pub fn stage(&self, name: &str) -> StageSnapshot {
        self.stages.get(name).cloned().unwrap_or(StageSnapshot {
            attempts: 0,
            successes: 0,
            result_count: 0,
        })
    }
}
