//! 录制回放眼动源
//!
//! 试次开始时对整段录制样本预计算注视结果，之后每帧按已流逝时间查表。
//! 已流逝时间可以取墙钟，也可以按渲染帧数推算（无节拍回放和测试使用后者）。

use std::sync::Arc;
use std::time::Instant;

use crate::error::SourceError;
use crate::gaze::fixation::{FixationFilter, FixationParams};
use crate::gaze::recording::Recording;
use crate::gaze::source::{precompute_fixations, GazeSource, PrecomputedFixation, SourceKind};
use crate::gaze::types::{FixationReport, GazePoint, GazeSample};
use crate::gaze::units::{DisplayGeometry, Units};

/// 回放时间基准
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayClock {
    /// 自 `begin_trial` 起的墙钟时间
    Wall,
    /// 按已查询帧数 / 刷新率推算
    Frames { refresh_hz: f64 },
}

pub struct RecordedReplay {
    recording: Arc<Recording>,
    params: FixationParams,
    geometry: DisplayGeometry,
    clock: ReplayClock,
    /// 每帧额外扣除的延迟（毫秒），模拟慢速渲染
    lag_ms: f64,
    trial: Option<usize>,
    timestamps: Vec<f64>,
    fixations: Vec<PrecomputedFixation>,
    frames_queried: u64,
    started_at: Option<Instant>,
}

impl RecordedReplay {
    pub fn new(recording: Arc<Recording>, params: FixationParams, geometry: DisplayGeometry) -> Self {
        Self {
            recording,
            params,
            geometry,
            clock: ReplayClock::Wall,
            lag_ms: 0.0,
            trial: None,
            timestamps: Vec::new(),
            fixations: Vec::new(),
            frames_queried: 0,
            started_at: None,
        }
    }

    pub fn with_clock(mut self, clock: ReplayClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lag_ms(mut self, lag_ms: f64) -> Self {
        self.lag_ms = lag_ms.max(0.0);
        self
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// 正在回放的试次；试次结束后为 None
    pub fn current_trial(&self) -> Option<usize> {
        self.trial
    }

    fn elapsed_ms(&self) -> f64 {
        match self.clock {
            ReplayClock::Wall => self
                .started_at
                .map(|t0| t0.elapsed().as_secs_f64() * 1000.0)
                .unwrap_or(0.0),
            ReplayClock::Frames { refresh_hz } => {
                self.frames_queried as f64 * 1000.0 / refresh_hz
            }
        }
    }

    /// 时间戳严格早于 `t_ms` 的最后一个样本的注视结果
    pub fn fixation_at(&self, t_ms: f64) -> FixationReport {
        if self.fixations.is_empty() {
            return FixationReport::no_signal();
        }
        let n = self.timestamps.partition_point(|ts| *ts < t_ms);
        let index = n.saturating_sub(1);
        self.fixations[index].report(&self.params)
    }
}

impl GazeSource for RecordedReplay {
    fn kind(&self) -> SourceKind {
        SourceKind::Recorded
    }

    fn begin_trial(&mut self, trial: usize) -> Result<(), SourceError> {
        let recorded = self
            .recording
            .trial(trial)
            .ok_or(SourceError::TrialOutOfRange {
                trial,
                available: self.recording.trials.len(),
            })?;
        if recorded.samples.is_empty() {
            return Err(SourceError::EmptyTrial { trial });
        }

        let params = FixationParams {
            sample_rate_hz: recorded.sample_rate_hz,
            ..self.params
        };
        let mut filter = FixationFilter::new(params);
        // 首个样本按无效处理
        let gaze = recorded.samples.iter().enumerate().map(|(i, s)| {
            if i == 0 {
                GazePoint::INVALID
            } else {
                s.position()
            }
        });
        self.fixations = precompute_fixations(&mut filter, gaze);
        self.timestamps = recorded.samples.iter().map(|s| s.timestamp_ms).collect();
        self.params = params;
        self.trial = Some(trial);
        self.frames_queried = 0;
        self.started_at = Some(Instant::now());

        tracing::debug!(
            trial,
            samples = self.fixations.len(),
            duration_ms = recorded.duration_ms(),
            "Replay trial prepared"
        );
        Ok(())
    }

    /// 回放源的样本全部来自录制，外部推入的样本被忽略
    fn process_sample(&mut self, _sample: GazeSample) {}

    fn current_fixation(&mut self, units: Units) -> FixationReport {
        let t = self.elapsed_ms() - self.frames_queried as f64 * self.lag_ms;
        self.frames_queried += 1;
        let report = self.fixation_at(t);
        FixationReport {
            gaze: self.geometry.convert(report.gaze, units),
            centroid: self.geometry.convert(report.centroid, units),
            ..report
        }
    }

    fn end_trial(&mut self) {
        if let Some(trial) = self.trial.take() {
            tracing::debug!(
                trial,
                frames = self.frames_queried,
                elapsed_ms = self.elapsed_ms(),
                "Replay trial finished"
            );
        }
        self.started_at = None;
    }
}
