//! 在线注视检测模块
//!
//! 因果流式滤波：对注视坐标做指数平滑（AR(1)），以平滑后位移乘采样率
//! 估计角速度，超过速度阈值即判定为扫视并以当前样本重新开始注视。
//! 扫视后的前 5 个样本累加作为注视中心估计。
//!
//! 状态转换：
//! 无数据（NaN）→ 首个有效样本初始化 → 稳态平滑 →（超速）扫视重置 → 稳态平滑 ...
//! 任一状态遇到无效样本都回到无数据。

use serde::Serialize;

use crate::constants::FIXATION_WINDOW_SAMPLES;
use crate::gaze::types::{FixationReport, GazePoint};
use crate::gaze::units::{DisplayGeometry, Units};

/// 滤波参数，由实验配置派生，试次内不可变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixationParams {
    /// 指数平滑系数，取值 [0,1)
    pub theta: f64,
    /// 速度阈值（度/秒）；为 0 时关闭注视提取
    pub velocity_threshold: f64,
    /// 最短注视时长（秒）
    pub min_duration_secs: f64,
    /// 眼动仪采样率（Hz）
    pub sample_rate_hz: f64,
}

/// 注视状态：平滑位置、前导样本累加和、注视持续样本数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixationState {
    pub smoothed: GazePoint,
    pub running_sum: GazePoint,
    pub duration_samples: u32,
}

impl FixationState {
    pub fn reset() -> Self {
        Self {
            smoothed: GazePoint::INVALID,
            running_sum: GazePoint::INVALID,
            duration_samples: 0,
        }
    }

    fn start_at(gaze: GazePoint) -> Self {
        Self {
            smoothed: gaze,
            running_sum: gaze,
            duration_samples: 1,
        }
    }
}

impl Default for FixationState {
    fn default() -> Self {
        Self::reset()
    }
}

/// 注视检测器
#[derive(Debug, Clone)]
pub struct FixationFilter {
    params: FixationParams,
    state: FixationState,
    last_gaze: GazePoint,
    samples_seen: u64,
}

impl FixationFilter {
    pub fn new(params: FixationParams) -> Self {
        Self {
            params,
            state: FixationState::reset(),
            last_gaze: GazePoint::INVALID,
            samples_seen: 0,
        }
    }

    pub fn params(&self) -> &FixationParams {
        &self.params
    }

    pub fn state(&self) -> &FixationState {
        &self.state
    }

    pub fn last_gaze(&self) -> GazePoint {
        self.last_gaze
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// 输入一个样本（度数，NaN 表示丢失）
    pub fn process_sample(&mut self, gaze: GazePoint) {
        self.last_gaze = gaze;
        self.samples_seen += 1;

        if self.params.velocity_threshold == 0.0 {
            return;
        }

        if !gaze.is_valid() {
            self.state = FixationState::reset();
            return;
        }

        if !self.state.smoothed.is_valid() {
            self.state = FixationState::start_at(gaze);
            return;
        }

        let old = self.state.smoothed;
        let smoothed = old
            .scale(self.params.theta)
            .add(&gaze.scale(1.0 - self.params.theta));
        let speed = smoothed.sub(&old).norm() * self.params.sample_rate_hz;

        if speed > self.params.velocity_threshold {
            self.state = FixationState::start_at(gaze);
            return;
        }

        self.state.smoothed = smoothed;
        if self.state.duration_samples < FIXATION_WINDOW_SAMPLES {
            self.state.running_sum = self.state.running_sum.add(&gaze);
        }
        self.state.duration_samples += 1;
    }

    /// 注视中心：累加和固定除以 5（样本不足 5 个时偏向原点）
    pub fn centroid(&self) -> GazePoint {
        let window = FIXATION_WINDOW_SAMPLES as f64;
        GazePoint::new(
            self.state.running_sum.x / window,
            self.state.running_sum.y / window,
        )
    }

    pub fn duration_secs(&self) -> f64 {
        self.state.duration_samples as f64 / self.params.sample_rate_hz
    }

    pub fn is_fixating(&self) -> bool {
        self.duration_secs() > self.params.min_duration_secs
    }

    /// 当前注视三元组（度数）
    pub fn current_fixation(&self) -> FixationReport {
        FixationReport {
            gaze: self.last_gaze,
            centroid: self.centroid(),
            is_fixating: self.is_fixating(),
            frames_advanced: 0,
        }
    }

    /// 当前注视三元组，按显示单位换算
    pub fn current_fixation_in(&self, geometry: &DisplayGeometry, units: Units) -> FixationReport {
        let report = self.current_fixation();
        FixationReport {
            gaze: geometry.convert(report.gaze, units),
            centroid: geometry.convert(report.centroid, units),
            ..report
        }
    }

    /// 试次间完全重置
    pub fn reset(&mut self) {
        self.state = FixationState::reset();
        self.last_gaze = GazePoint::INVALID;
        self.samples_seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FixationParams {
        FixationParams {
            theta: 0.6,
            velocity_threshold: 18.0,
            min_duration_secs: 0.1,
            sample_rate_hz: 60.0,
        }
    }

    #[test]
    fn first_valid_sample_initializes() {
        let mut f = FixationFilter::new(params());
        f.process_sample(GazePoint::new(1.0, 2.0));
        assert_eq!(f.state().duration_samples, 1);
        assert_eq!(f.state().running_sum, GazePoint::new(1.0, 2.0));
        assert_eq!(f.state().smoothed, GazePoint::new(1.0, 2.0));
    }

    #[test]
    fn invalid_sample_resets_state() {
        let mut f = FixationFilter::new(params());
        for _ in 0..10 {
            f.process_sample(GazePoint::new(1.0, 1.0));
        }
        assert!(f.is_fixating());
        f.process_sample(GazePoint::INVALID);
        assert_eq!(f.state().duration_samples, 0);
        assert!(!f.centroid().is_valid());
        assert!(!f.is_fixating());
    }

    #[test]
    fn large_jump_is_a_saccade() {
        let mut f = FixationFilter::new(params());
        f.process_sample(GazePoint::new(0.0, 0.0));
        f.process_sample(GazePoint::new(0.0, 0.0));
        f.process_sample(GazePoint::new(10.0, 0.0));
        assert_eq!(f.state().duration_samples, 1);
        assert_eq!(f.state().running_sum, GazePoint::new(10.0, 0.0));
    }

    #[test]
    fn centroid_divides_by_five_even_when_short() {
        let mut f = FixationFilter::new(params());
        f.process_sample(GazePoint::new(5.0, 5.0));
        f.process_sample(GazePoint::new(5.0, 5.0));
        assert_eq!(f.centroid(), GazePoint::new(2.0, 2.0));
    }

    #[test]
    fn fixation_needs_min_duration() {
        let mut f = FixationFilter::new(params());
        // 60 Hz 下 6 个样本 = 0.1 s，需严格大于
        for _ in 0..6 {
            f.process_sample(GazePoint::new(0.0, 0.0));
        }
        assert!(!f.is_fixating());
        f.process_sample(GazePoint::new(0.0, 0.0));
        assert!(f.is_fixating());
    }

    #[test]
    fn zero_threshold_disables_extraction() {
        let mut f = FixationFilter::new(FixationParams {
            velocity_threshold: 0.0,
            ..params()
        });
        f.process_sample(GazePoint::new(3.0, 3.0));
        assert_eq!(f.last_gaze(), GazePoint::new(3.0, 3.0));
        assert_eq!(f.state().duration_samples, 0);
    }
}
