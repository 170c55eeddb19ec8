//! 实验参数
//!
//! 整个会话只有一份 `ExperimentConfig`：启动时从默认值、可选 JSON 文件与环境变量
//! 合成，校验一次后以 `Arc` 共享。所有以秒表示的阈值在 `FrameThresholds` 中统一
//! 换算为帧数，换算使用的刷新率与渲染循环相同。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ExperimentEnvConfig;
use crate::constants::{
    DEFAULT_FIXATION_MIN_DURATION_SECS, DEFAULT_FIXATION_VELOCITY_THRESHOLD,
    DEFAULT_MAX_TRIAL_SECS, DEFAULT_REFRESH_RATE_HZ, DEFAULT_REPLAY_TOLERANCE_FRAMES,
    DEFAULT_THETA, DEFAULT_TRACKER_RATE_HZ,
};
use crate::error::{RecordingError, SetupError};
use crate::gaze::fixation::FixationParams;
use crate::gaze::units::{DisplayGeometry, Units};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixationConfig {
    pub theta: f64,
    /// 扫视速度阈值（度/秒），0 关闭注视提取
    pub velocity_threshold: f64,
    pub min_duration_secs: f64,
}

impl Default for FixationConfig {
    fn default() -> Self {
        Self {
            theta: DEFAULT_THETA,
            velocity_threshold: DEFAULT_FIXATION_VELOCITY_THRESHOLD,
            min_duration_secs: DEFAULT_FIXATION_MIN_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardColors {
    pub start: [f64; 3],
    pub end: [f64; 3],
    /// 每帧沿 start→end 方向移动的比例
    pub oscillation: f64,
}

impl Default for RewardColors {
    fn default() -> Self {
        Self {
            start: [0.0, -1.0, 1.0],
            end: [1.0, 1.0, 1.0],
            oscillation: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    #[serde(default)]
    pub fixation: FixationConfig,
    pub refresh_rate_hz: f64,
    pub tracker_rate_hz: f64,
    /// 连续无信号超过该时长（秒）需要注意力吸引
    pub criterion_secs: f64,
    /// 注视中心与目标的判定半径（度）
    pub fix_radius_deg: f64,
    /// 触发奖励所需的连续追踪注视次数，按难度阶段索引
    pub sac_to_reward: [u32; 2],
    pub max_sac_per_pursuit: u32,
    pub blink_tolerance_secs: f64,
    pub reward_duration_secs: f64,
    pub max_nr_rewards: u32,
    pub init_block_secs: f64,
    /// 渲染到注视数据可用之间的帧数
    pub data_lag_frames: i64,
    pub max_fix_interval_secs: f64,
    #[serde(default = "default_max_trial_secs")]
    pub max_trial_secs: f64,
    #[serde(default = "default_target_agents")]
    pub target_agents: Vec<usize>,
    #[serde(default)]
    pub reward_colors: RewardColors,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub display: DisplayGeometry,
    #[serde(default = "default_replay_tolerance_frames")]
    pub replay_tolerance_frames: i64,
}

fn default_max_trial_secs() -> f64 {
    DEFAULT_MAX_TRIAL_SECS
}

fn default_target_agents() -> Vec<usize> {
    vec![0, 1]
}

fn default_replay_tolerance_frames() -> i64 {
    DEFAULT_REPLAY_TOLERANCE_FRAMES
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            fixation: FixationConfig::default(),
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
            tracker_rate_hz: DEFAULT_TRACKER_RATE_HZ,
            criterion_secs: 6.0,
            fix_radius_deg: 3.0,
            sac_to_reward: [3, 5],
            max_sac_per_pursuit: 12,
            blink_tolerance_secs: 0.2,
            reward_duration_secs: 2.5,
            max_nr_rewards: 1,
            init_block_secs: 1.0,
            data_lag_frames: 14,
            max_fix_interval_secs: 2.0,
            max_trial_secs: DEFAULT_MAX_TRIAL_SECS,
            target_agents: default_target_agents(),
            reward_colors: RewardColors::default(),
            units: Units::Deg,
            display: DisplayGeometry::default(),
            replay_tolerance_frames: DEFAULT_REPLAY_TOLERANCE_FRAMES,
        }
    }
}

/// 以帧计的阈值，比较时保留小数（如 2.5 s × 75 Hz = 187.5 帧）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameThresholds {
    pub criterion: f64,
    pub blink_tolerance: f64,
    pub reward_iterations: f64,
    pub init_block: f64,
    pub max_fix_interval: f64,
    pub data_lag: i64,
    pub sac_to_reward: [u32; 2],
    pub max_sac_per_pursuit: u32,
    pub max_nr_rewards: u32,
    pub fix_radius_deg: f64,
    pub max_trial_frames: usize,
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

impl ExperimentConfig {
    /// 读取 JSON 配置文件，缺省字段使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(RecordingError::from)?;
        let config: ExperimentConfig = serde_json::from_str(&raw).map_err(RecordingError::from)?;
        tracing::info!(path = %path.as_ref().display(), "Experiment config loaded");
        Ok(config)
    }

    /// 在已有配置上叠加环境变量覆盖
    pub fn with_env(mut self, env: &ExperimentEnvConfig) -> Self {
        if let Some(v) = env.theta {
            self.fixation.theta = v;
        }
        if let Some(v) = env.velocity_threshold {
            self.fixation.velocity_threshold = v;
        }
        if let Some(v) = env.min_duration_secs {
            self.fixation.min_duration_secs = v;
        }
        if let Some(v) = env.refresh_rate_hz {
            self.refresh_rate_hz = v;
        }
        if let Some(v) = env.tracker_rate_hz {
            self.tracker_rate_hz = v;
        }
        if let Some(v) = env.criterion_secs {
            self.criterion_secs = v;
        }
        if let Some(v) = env.fix_radius_deg {
            self.fix_radius_deg = v;
        }
        if let Some(v) = env.sac_to_reward_easy {
            self.sac_to_reward[0] = v;
        }
        if let Some(v) = env.sac_to_reward_difficult {
            self.sac_to_reward[1] = v;
        }
        if let Some(v) = env.max_sac_per_pursuit {
            self.max_sac_per_pursuit = v;
        }
        if let Some(v) = env.blink_tolerance_secs {
            self.blink_tolerance_secs = v;
        }
        if let Some(v) = env.reward_duration_secs {
            self.reward_duration_secs = v;
        }
        if let Some(v) = env.max_nr_rewards {
            self.max_nr_rewards = v;
        }
        if let Some(v) = env.init_block_secs {
            self.init_block_secs = v;
        }
        if let Some(v) = env.data_lag_frames {
            self.data_lag_frames = v;
        }
        if let Some(v) = env.max_fix_interval_secs {
            self.max_fix_interval_secs = v;
        }
        if let Some(v) = env.max_trial_secs {
            self.max_trial_secs = v;
        }
        if let Some(units) = env.units {
            self.units = units;
        }
        self
    }

    /// 默认值或配置文件，再叠加环境变量，最后校验
    pub fn from_env(env: &ExperimentEnvConfig) -> Result<Self, SetupError> {
        let base = match env.config_path.as_deref() {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = base.with_env(env);
        config.validate().map_err(SetupError::InvalidConfig)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.fixation.theta) {
            return Err("fixation.theta must be in [0,1)".to_string());
        }
        if !non_negative(self.fixation.velocity_threshold) {
            return Err("fixation.velocityThreshold must be finite and >= 0".to_string());
        }
        if !non_negative(self.fixation.min_duration_secs) {
            return Err("fixation.minDurationSecs must be finite and >= 0".to_string());
        }
        if !positive(self.refresh_rate_hz) || !positive(self.tracker_rate_hz) {
            return Err("refreshRateHz and trackerRateHz must be finite and > 0".to_string());
        }
        if !positive(self.fix_radius_deg) {
            return Err("fixRadiusDeg must be finite and > 0".to_string());
        }
        if self.sac_to_reward.contains(&0) {
            return Err("sacToReward entries must be >= 1".to_string());
        }
        if self.max_sac_per_pursuit == 0 || self.max_nr_rewards == 0 {
            return Err("maxSacPerPursuit and maxNrRewards must be >= 1".to_string());
        }
        for (name, secs) in [
            ("criterionSecs", self.criterion_secs),
            ("blinkToleranceSecs", self.blink_tolerance_secs),
            ("rewardDurationSecs", self.reward_duration_secs),
            ("initBlockSecs", self.init_block_secs),
            ("maxFixIntervalSecs", self.max_fix_interval_secs),
        ] {
            if !non_negative(secs) {
                return Err(format!("{name} must be finite and >= 0"));
            }
        }
        if !positive(self.max_trial_secs) {
            return Err("maxTrialSecs must be finite and > 0".to_string());
        }
        if self.data_lag_frames < 0 {
            return Err("dataLagFrames must be >= 0".to_string());
        }
        if self.target_agents.is_empty() {
            return Err("targetAgents must not be empty".to_string());
        }
        if !positive(self.display.distance_cm) || !positive(self.display.cm_per_pixel) {
            return Err("display geometry must be positive".to_string());
        }
        let colors = &self.reward_colors;
        if colors.start.iter().chain(&colors.end).any(|c| !c.is_finite()) {
            return Err("rewardColors must be finite".to_string());
        }
        if !(0.0..=1.0).contains(&self.reward_colors.oscillation) {
            return Err("rewardColors.oscillation must be in [0,1]".to_string());
        }
        if self.replay_tolerance_frames < 0 {
            return Err("replayToleranceFrames must be >= 0".to_string());
        }
        Ok(())
    }

    /// 秒 × 刷新率，所有帧阈值只在这里换算
    pub fn thresholds(&self) -> FrameThresholds {
        let hz = self.refresh_rate_hz;
        FrameThresholds {
            criterion: self.criterion_secs * hz,
            blink_tolerance: self.blink_tolerance_secs * hz,
            reward_iterations: self.reward_duration_secs * hz,
            init_block: self.init_block_secs * hz,
            max_fix_interval: self.max_fix_interval_secs * hz,
            data_lag: self.data_lag_frames,
            sac_to_reward: self.sac_to_reward,
            max_sac_per_pursuit: self.max_sac_per_pursuit,
            max_nr_rewards: self.max_nr_rewards,
            fix_radius_deg: self.fix_radius_deg,
            max_trial_frames: (self.max_trial_secs * hz) as usize,
        }
    }

    pub fn fixation_params(&self, sample_rate_hz: f64) -> FixationParams {
        FixationParams {
            theta: self.fixation.theta,
            velocity_threshold: self.fixation.velocity_threshold,
            min_duration_secs: self.fixation.min_duration_secs,
            sample_rate_hz,
        }
    }

    pub fn tracker_fixation_params(&self) -> FixationParams {
        self.fixation_params(self.tracker_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn thresholds_scale_with_refresh_rate() {
        let t = ExperimentConfig::default().thresholds();
        assert_eq!(t.criterion, 450.0);
        assert_eq!(t.blink_tolerance, 15.0);
        assert_eq!(t.reward_iterations, 187.5);
        assert_eq!(t.init_block, 75.0);
        assert_eq!(t.max_fix_interval, 150.0);
        assert_eq!(t.max_trial_frames, 9000);

        let fast = ExperimentConfig {
            refresh_rate_hz: 60.0,
            ..ExperimentConfig::default()
        }
        .thresholds();
        assert_eq!(fast.criterion, 360.0);
    }

    #[test]
    fn rejects_out_of_range_theta() {
        let cfg = ExperimentConfig {
            fixation: FixationConfig {
                theta: 1.0,
                ..FixationConfig::default()
            },
            ..ExperimentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_reward_threshold() {
        let cfg = ExperimentConfig {
            sac_to_reward: [0, 5],
            ..ExperimentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let bad = [
            ExperimentConfig {
                refresh_rate_hz: f64::NAN,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                refresh_rate_hz: f64::INFINITY,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                tracker_rate_hz: f64::NAN,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                criterion_secs: f64::NAN,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                reward_duration_secs: f64::INFINITY,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                blink_tolerance_secs: -0.1,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                fix_radius_deg: f64::NAN,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                max_trial_secs: f64::INFINITY,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                fixation: FixationConfig {
                    min_duration_secs: f64::NAN,
                    ..FixationConfig::default()
                },
                ..ExperimentConfig::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "accepted {cfg:?}");
        }
    }

    #[test]
    fn env_overrides_apply_on_top() {
        let env = ExperimentEnvConfig {
            theta: Some(0.5),
            sac_to_reward_difficult: Some(6),
            data_lag_frames: Some(0),
            units: Some(Units::Pix),
            ..ExperimentEnvConfig::default()
        };
        let cfg = ExperimentConfig::default().with_env(&env);
        assert_eq!(cfg.fixation.theta, 0.5);
        assert_eq!(cfg.sac_to_reward, [3, 6]);
        assert_eq!(cfg.data_lag_frames, 0);
        assert_eq!(cfg.units, Units::Pix);
        assert_eq!(cfg.max_sac_per_pursuit, 12);
    }

    #[test]
    fn json_fields_are_camel_case_with_defaults() {
        let raw = r#"{
            "refreshRateHz": 60.0,
            "trackerRateHz": 120.0,
            "criterionSecs": 6.0,
            "fixRadiusDeg": 2.5,
            "sacToReward": [2, 4],
            "maxSacPerPursuit": 10,
            "blinkToleranceSecs": 0.2,
            "rewardDurationSecs": 2.0,
            "maxNrRewards": 2,
            "initBlockSecs": 1.0,
            "dataLagFrames": 10,
            "maxFixIntervalSecs": 2.0
        }"#;
        let cfg: ExperimentConfig = serde_json::from_str(raw).expect("parse");
        assert_eq!(cfg.sac_to_reward, [2, 4]);
        assert_eq!(cfg.target_agents, vec![0, 1]);
        assert_eq!(cfg.fixation, FixationConfig::default());
        assert!(cfg.validate().is_ok());
    }
}
