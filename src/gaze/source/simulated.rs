//! 模拟眼动仪
//!
//! 以眼动仪采样率向 `TrackerHandle` 推送合成的双眼样本：注视保持一段时间后
//! 跳到当前目标智能体上，叠加噪声并随机丢失，直到收到关闭信号。
//! 当前跟随的试次通过 watch 通道下发，为 None 时推送丢失样本。

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::gaze::source::live::TrackerHandle;
use crate::gaze::types::{EyeSample, GazePoint, RawTrackerSample};
use crate::gaze::units::DisplayGeometry;
use crate::trial::trajectory::AgentTrajectories;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub rate_hz: f64,
    /// 每个样本叠加的噪声幅度（度）
    pub noise_deg: f64,
    pub dropout_probability: f64,
    /// 两次跳视之间的注视保持时长（毫秒）
    pub hold_ms: f64,
    pub target_agent: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            noise_deg: 0.05,
            dropout_probability: 0.02,
            hold_ms: 250.0,
            target_agent: 0,
            seed: None,
        }
    }
}

/// 模拟器当前跟随的试次
#[derive(Debug, Clone)]
pub struct SimulatedTarget {
    pub trajectories: Arc<AgentTrajectories>,
    pub refresh_hz: f64,
    pub started_at: Instant,
}

impl SimulatedTarget {
    pub fn new(trajectories: Arc<AgentTrajectories>, refresh_hz: f64) -> Self {
        Self {
            trajectories,
            refresh_hz,
            started_at: Instant::now(),
        }
    }

    fn frame_now(&self) -> i64 {
        (self.started_at.elapsed().as_secs_f64() * self.refresh_hz) as i64
    }
}

pub struct SimulatedTracker {
    config: SimulationConfig,
    geometry: DisplayGeometry,
    handle: TrackerHandle,
    rng: StdRng,
    hold: GazePoint,
    last_jump: Option<Instant>,
    epoch: Instant,
}

impl SimulatedTracker {
    pub fn new(config: SimulationConfig, geometry: DisplayGeometry, handle: TrackerHandle) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            geometry,
            handle,
            rng,
            hold: GazePoint::INVALID,
            last_jump: None,
            epoch: Instant::now(),
        }
    }

    /// 启动后台推送任务
    pub fn spawn(
        mut self,
        mut target_rx: watch::Receiver<Option<SimulatedTarget>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs_f64(1.0 / self.config.rate_hz.max(1.0));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(
                rate_hz = self.config.rate_hz,
                target_agent = self.config.target_agent,
                "Simulated tracker started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    changed = target_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.hold = GazePoint::INVALID;
                        self.last_jump = None;
                    }
                    _ = ticker.tick() => {
                        let target = target_rx.borrow().clone();
                        let sample = self.next_sample(target.as_ref());
                        if !self.handle.push(sample) && self.handle.is_closed() {
                            break;
                        }
                    }
                }
            }

            tracing::info!(dropped = self.handle.dropped(), "Simulated tracker stopped");
        })
    }

    /// 生成下一个样本（不依赖运行时，便于单测）
    pub fn next_sample(&mut self, target: Option<&SimulatedTarget>) -> RawTrackerSample {
        let now = Instant::now();
        let timestamp_us = now.duration_since(self.epoch).as_micros() as i64;

        let Some(target) = target else {
            return RawTrackerSample {
                timestamp_us,
                left: EyeSample::lost(),
                right: EyeSample::lost(),
            };
        };

        if self.rng.gen_bool(self.config.dropout_probability.clamp(0.0, 1.0)) {
            return RawTrackerSample {
                timestamp_us,
                left: EyeSample::lost(),
                right: EyeSample::lost(),
            };
        }

        let due = self
            .last_jump
            .map_or(true, |t| now.duration_since(t).as_secs_f64() * 1000.0 >= self.config.hold_ms);
        if due || !self.hold.is_valid() {
            self.hold = target
                .trajectories
                .position(target.frame_now(), self.config.target_agent);
            self.last_jump = Some(now);
        }

        let jitter_left = self.jitter(self.hold);
        let jitter_right = self.jitter(self.hold);
        let left = self.geometry.deg_to_eye(jitter_left);
        let right = self.geometry.deg_to_eye(jitter_right);
        RawTrackerSample {
            timestamp_us,
            left,
            right,
        }
    }

    /// 三个均匀分布之和近似高斯噪声
    fn jitter(&mut self, point: GazePoint) -> GazePoint {
        let amplitude = self.config.noise_deg;
        let mut noise = || {
            let s: f64 = (0..3).map(|_| self.rng.gen_range(-1.0f64..=1.0)).sum();
            s / 3.0 * amplitude
        };
        let dx = noise();
        let dy = noise();
        GazePoint::new(point.x + dx, point.y + dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::source::live::tracker_channel;

    fn target() -> SimulatedTarget {
        let trajectories = AgentTrajectories::new(vec![vec![[3.0, -2.0], [0.0, 0.0]]; 100])
            .expect("valid buffer");
        SimulatedTarget::new(Arc::new(trajectories), 75.0)
    }

    #[test]
    fn follows_target_agent_within_noise() {
        let (handle, _rx) = tracker_channel(8);
        let geometry = DisplayGeometry::default();
        let mut sim = SimulatedTracker::new(
            SimulationConfig {
                dropout_probability: 0.0,
                seed: Some(7),
                ..SimulationConfig::default()
            },
            geometry,
            handle,
        );
        let t = target();
        for _ in 0..20 {
            let s = sim.next_sample(Some(&t));
            let p = geometry.eye_to_deg(&s.left);
            assert!((p.x - 3.0).abs() <= 0.05 + 1e-9);
            assert!((p.y + 2.0).abs() <= 0.05 + 1e-9);
        }
    }

    #[test]
    fn eyes_get_independent_noise() {
        let (handle, _rx) = tracker_channel(8);
        let mut sim = SimulatedTracker::new(
            SimulationConfig {
                dropout_probability: 0.0,
                seed: Some(11),
                ..SimulationConfig::default()
            },
            DisplayGeometry::default(),
            handle,
        );
        let t = target();
        let differs = (0..10)
            .map(|_| sim.next_sample(Some(&t)))
            .any(|s| s.left != s.right);
        assert!(differs);
    }

    #[test]
    fn no_target_means_lost_eyes() {
        let (handle, _rx) = tracker_channel(8);
        let mut sim = SimulatedTracker::new(SimulationConfig::default(), DisplayGeometry::default(), handle);
        let s = sim.next_sample(None);
        assert!(!s.left.is_valid());
        assert!(!s.right.is_valid());
    }

    #[tokio::test]
    async fn spawned_task_stops_on_shutdown() {
        let (handle, mut rx) = tracker_channel(256);
        let (target_tx, target_rx) = watch::channel(Some(target()));
        let (shutdown_tx, _) = broadcast::channel::<()>(2);
        let sim = SimulatedTracker::new(
            SimulationConfig {
                rate_hz: 500.0,
                seed: Some(1),
                ..SimulationConfig::default()
            },
            DisplayGeometry::default(),
            handle,
        );
        let task = sim.spawn(target_rx, shutdown_tx.subscribe());

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("sample within timeout");
        assert!(first.is_some());

        shutdown_tx.send(()).expect("send shutdown");
        task.await.expect("task joins");
        drop(target_tx);
    }
}
