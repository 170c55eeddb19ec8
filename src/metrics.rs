//! 逐帧决策耗时统计
//!
//! 渲染循环每帧记录一次「查询注视 + 帧决策」的耗时（微秒），
//! 并统计超出帧预算（1 / 刷新率）的次数。计数器均为无锁原子量。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const LATENCY_BUCKETS: [u64; 6] = [100, 500, 1_000, 5_000, 10_000, u64::MAX];
const BUCKET_MIDPOINTS: [f64; 6] = [50.0, 300.0, 750.0, 3000.0, 7500.0, 15000.0];

pub struct FrameTimingMetrics {
    budget_us: u64,
    frames: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    over_budget: AtomicU64,
    latency_buckets: [AtomicU64; 6],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTimingSnapshot {
    pub frames: u64,
    pub total_latency_us: u64,
    pub max_latency_us: u64,
    pub over_budget: u64,
    pub budget_us: u64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

impl FrameTimingSnapshot {
    pub fn mean_latency_us(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_latency_us as f64 / self.frames as f64
        }
    }
}

impl FrameTimingMetrics {
    /// `refresh_rate_hz` 决定单帧预算
    pub fn new(refresh_rate_hz: f64) -> Self {
        let budget_us = if refresh_rate_hz > 0.0 {
            (1_000_000.0 / refresh_rate_hz) as u64
        } else {
            u64::MAX
        };
        Self {
            budget_us,
            frames: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            over_budget: AtomicU64::new(0),
            latency_buckets: Default::default(),
        }
    }

    pub fn budget_us(&self) -> u64 {
        self.budget_us
    }

    pub fn record(&self, latency_us: u64) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(latency_us, Ordering::Relaxed);
        if latency_us > self.budget_us {
            let n = self.over_budget.fetch_add(1, Ordering::Relaxed) + 1;
            if n.is_power_of_two() {
                tracing::warn!(
                    latency_us,
                    budget_us = self.budget_us,
                    over_budget = n,
                    "Frame decision exceeded frame budget"
                );
            }
        }
        for (i, &threshold) in LATENCY_BUCKETS.iter().enumerate() {
            if latency_us <= threshold {
                self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    fn percentiles(counts: &[u64; 6]) -> (f64, f64, f64) {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let percentile = |pct: f64| -> f64 {
            let target = (pct / 100.0 * total as f64).ceil() as u64;
            let mut cumulative = 0u64;
            for (i, &count) in counts.iter().enumerate() {
                cumulative += count;
                if cumulative >= target {
                    return BUCKET_MIDPOINTS[i];
                }
            }
            BUCKET_MIDPOINTS[5]
        };
        (percentile(50.0), percentile(95.0), percentile(99.0))
    }

    fn build_snapshot(&self, load: impl Fn(&AtomicU64) -> u64) -> FrameTimingSnapshot {
        let mut counts = [0u64; 6];
        for (slot, bucket) in counts.iter_mut().zip(&self.latency_buckets) {
            *slot = load(bucket);
        }
        let (p50_us, p95_us, p99_us) = Self::percentiles(&counts);
        FrameTimingSnapshot {
            frames: load(&self.frames),
            total_latency_us: load(&self.total_latency_us),
            max_latency_us: load(&self.max_latency_us),
            over_budget: load(&self.over_budget),
            budget_us: self.budget_us,
            p50_us,
            p95_us,
            p99_us,
        }
    }

    pub fn snapshot(&self) -> FrameTimingSnapshot {
        self.build_snapshot(|a| a.load(Ordering::Relaxed))
    }

    /// 每个试次结束时取出并清零
    pub fn snapshot_and_reset(&self) -> FrameTimingSnapshot {
        self.build_snapshot(|a| a.swap(0, Ordering::Relaxed))
    }
}
