//! 注视触发的试次控制器
//!
//! 每个渲染帧调用一次 `frame_decision`，读取数据源最新的注视状态，
//! 维护追踪计数、奖励与注意力吸引状态，返回本帧决策。
//!
//! 每帧处理顺序：
//! 1. 信号状态与眨眼计数
//! 2. 眨眼超时：清零追踪计数并关闭奖励
//! 3. 按延迟帧判断目标是否在注视半径内
//! 4. 注视起止边沿：注视开始时更新追踪计数（奖励期间延长奖励）
//! 5. 试次开始的屏蔽期内计数钳制在阈值以下
//! 6. 达到阈值开启奖励
//! 7. 奖励推进或到期关闭
//! 8. 连续无信号计时，超过阈值需要注意力吸引
//! 9. 结束判定与难度阶段推进

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::gaze::types::FixationReport;
use crate::trial::config::{ExperimentConfig, FrameThresholds};
use crate::trial::event::EventKind;
use crate::trial::reward::{RewardOscillator, Rgb};
use crate::trial::state::{GazeStatus, Phase, TrialControlState};
use crate::trial::trajectory::AgentTrajectories;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameDecision {
    Continue,
    TriggerReward,
    EndReward,
    TrialFinished,
}

pub struct GazeContingentController {
    thresholds: FrameThresholds,
    targets: Vec<usize>,
    trajectories: Arc<AgentTrajectories>,
    state: TrialControlState,
    colors: RewardOscillator,
    reward_color: Option<Rgb>,
    events: Vec<(i64, EventKind)>,
}

impl GazeContingentController {
    pub fn new(
        config: &ExperimentConfig,
        trajectories: Arc<AgentTrajectories>,
        phase: Phase,
    ) -> Result<Self, SetupError> {
        config.validate().map_err(SetupError::InvalidConfig)?;
        trajectories.require_targets(&config.target_agents)?;
        let thresholds = config.thresholds();
        Ok(Self {
            thresholds,
            targets: config.target_agents.clone(),
            trajectories,
            state: TrialControlState::new(phase),
            colors: RewardOscillator::new(&config.reward_colors),
            reward_color: None,
            events: Vec::new(),
        })
    }

    pub fn state(&self) -> &TrialControlState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn thresholds(&self) -> &FrameThresholds {
        &self.thresholds
    }

    /// 本帧应渲染的奖励颜色；无奖励或测试阶段为 None
    pub fn reward_color(&self) -> Option<Rgb> {
        self.reward_color
    }

    pub fn attention_catcher_needed(&self) -> bool {
        self.state.attention_catcher
    }

    pub fn drain_events(&mut self) -> Vec<(i64, EventKind)> {
        std::mem::take(&mut self.events)
    }

    fn reward_threshold(&self) -> u32 {
        self.thresholds.sac_to_reward[self.state.phase.threshold_index()]
    }

    /// 延迟帧下是否有目标落在注视半径内；延迟帧为负时视为无目标
    fn targets_in_view(&self, frame: i64, report: &FixationReport) -> bool {
        let lagged = frame - self.thresholds.data_lag;
        if lagged < 0 {
            return false;
        }
        self.targets.iter().any(|&agent| {
            let position = self.trajectories.position(lagged, agent);
            report.centroid.distance(&position) < self.thresholds.fix_radius_deg
        })
    }

    fn turn_on_reward(&mut self, frame: i64) {
        self.state.reward_iter = 1;
        self.colors.restart();
        self.events.push((frame, EventKind::RewardOn));
        tracing::debug!(frame, phase = self.state.phase.level(), "Reward on");
    }

    fn turn_off_reward(&mut self, frame: i64) {
        self.state.reward_iter = 0;
        self.state.nr_rewards += 1;
        self.reward_color = None;
        self.events.push((frame, EventKind::RewardOff));
        tracing::debug!(frame, rewards = self.state.nr_rewards, "Reward off");
    }

    /// 逐帧决策；结束后的调用直接返回 `TrialFinished`
    pub fn frame_decision(&mut self, frame: i64, report: &FixationReport) -> FrameDecision {
        if self.state.finished {
            return FrameDecision::TrialFinished;
        }
        let mut transition: Option<FrameDecision> = None;

        // 1. 信号状态
        if !report.gaze.is_valid() {
            self.state.status = GazeStatus::NoSignal;
            self.state.blink_count += 1;
        } else if self.state.status == GazeStatus::NoSignal {
            self.state.status = GazeStatus::Saccade;
            self.state.blink_count = 0;
        }

        // 2. 眨眼超时
        if self.state.blink_count as f64 >= self.thresholds.blink_tolerance {
            self.state.sac_per_pursuit = 0;
            if self.state.reward_active() {
                self.turn_off_reward(frame);
                transition = Some(FrameDecision::EndReward);
            }
        }

        // 3. 目标是否在视野内
        let in_view = self.targets_in_view(frame, report);

        // 4. 注视边沿
        if !report.is_fixating && self.state.status == GazeStatus::Fixation {
            self.state.status = GazeStatus::Saccade;
        } else if report.is_fixating && self.state.status == GazeStatus::Saccade {
            self.state.status = GazeStatus::Fixation;
            let reward_active = self.state.reward_active();
            let first_fix = !reward_active
                && (!self.state.pursued
                    || (frame - self.state.last_fix_frame) as f64
                        > self.thresholds.max_fix_interval);

            self.state.pursued = if first_fix || reward_active {
                in_view
            } else {
                in_view && self.state.pursued
            };

            if self.state.pursued {
                self.state.sac_per_pursuit = if first_fix {
                    1
                } else {
                    self.state.sac_per_pursuit + 1
                };
                self.events.push((
                    frame,
                    EventKind::PursuitSaccade {
                        count: self.state.sac_per_pursuit,
                        x: report.centroid.x,
                        y: report.centroid.y,
                    },
                ));
                // 奖励期间的追踪注视延长奖励，颜色振荡不重置
                if self.state.reward_iter > 1 {
                    self.state.reward_iter = 1;
                }
            }
            self.state.last_fix_frame = frame;
        }

        // 5. 屏蔽期
        let threshold = self.reward_threshold();
        if (frame as f64) < self.thresholds.init_block && self.state.sac_per_pursuit >= threshold {
            self.state.sac_per_pursuit = threshold - 1;
        }

        // 6. 开启奖励
        if self.state.sac_per_pursuit >= threshold && !self.state.reward_active() {
            self.turn_on_reward(frame);
            transition = Some(FrameDecision::TriggerReward);
        }

        // 7. 奖励推进
        if self.state.reward_active() {
            if (self.state.reward_iter as f64) < self.thresholds.reward_iterations {
                if self.state.phase.renders_reward() {
                    self.reward_color = Some(self.colors.advance());
                }
                self.state.reward_iter += 1;
            } else {
                self.turn_off_reward(frame);
                transition = Some(FrameDecision::EndReward);
            }
        }

        // 8. 注意力吸引
        if self.state.status == GazeStatus::NoSignal {
            self.state.time_not_looking += 1;
        } else {
            self.state.time_not_looking = 0;
        }
        self.state.attention_catcher =
            self.state.time_not_looking as f64 > self.thresholds.criterion;

        // 9. 结束判定
        let finished = self.state.attention_catcher
            || self.state.sac_per_pursuit >= self.thresholds.max_sac_per_pursuit
            || self.state.nr_rewards >= self.thresholds.max_nr_rewards;

        if finished && !self.state.attention_catcher && self.state.nr_rewards > 0 {
            let from = self.state.phase;
            self.state.phase = from.advanced();
            self.events.push((
                frame,
                EventKind::PhaseAdvanced {
                    from: from.level(),
                    to: self.state.phase.level(),
                },
            ));
        }
        if self.state.attention_catcher {
            if self.state.reward_active() {
                self.turn_off_reward(frame);
            }
            self.events.push((frame, EventKind::AttentionCatcher));
        }

        if finished {
            self.state.finished = true;
            tracing::debug!(
                frame,
                attention_catcher = self.state.attention_catcher,
                sac_per_pursuit = self.state.sac_per_pursuit,
                rewards = self.state.nr_rewards,
                phase = self.state.phase.level(),
                "Trial finished"
            );
            return FrameDecision::TrialFinished;
        }
        transition.unwrap_or(FrameDecision::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::types::GazePoint;

    fn still_agents(frames: usize) -> Arc<AgentTrajectories> {
        Arc::new(
            AgentTrajectories::new(vec![vec![[0.0, 0.0], [10.0, 10.0], [-10.0, 5.0]]; frames])
                .expect("valid buffer"),
        )
    }

    fn looking_at(x: f64, y: f64, fixating: bool) -> FixationReport {
        FixationReport {
            gaze: GazePoint::new(x, y),
            centroid: GazePoint::new(x, y),
            is_fixating: fixating,
            frames_advanced: 0,
        }
    }

    #[test]
    fn missing_target_agent_is_rejected() {
        let trajectories =
            Arc::new(AgentTrajectories::new(vec![vec![[0.0, 0.0]]; 10]).expect("valid buffer"));
        let result =
            GazeContingentController::new(&ExperimentConfig::default(), trajectories, Phase::EASY);
        assert!(matches!(
            result,
            Err(SetupError::MissingTargetAgent { agent: 1, agents: 1 })
        ));
    }

    #[test]
    fn no_target_in_view_before_lag_elapses() {
        let config = ExperimentConfig::default();
        let c = GazeContingentController::new(&config, still_agents(100), Phase::EASY)
            .expect("controller");
        let report = looking_at(0.0, 0.0, true);
        assert!(!c.targets_in_view(13, &report));
        assert!(c.targets_in_view(14, &report));
    }

    #[test]
    fn nan_centroid_is_never_in_view() {
        let config = ExperimentConfig::default();
        let c = GazeContingentController::new(&config, still_agents(100), Phase::EASY)
            .expect("controller");
        let report = FixationReport {
            centroid: GazePoint::INVALID,
            ..looking_at(0.0, 0.0, true)
        };
        assert!(!c.targets_in_view(50, &report));
    }

    #[test]
    fn fixation_away_from_targets_does_not_count() {
        let config = ExperimentConfig::default();
        let mut c = GazeContingentController::new(&config, still_agents(400), Phase::EASY)
            .expect("controller");
        for f in 100..110 {
            c.frame_decision(f, &looking_at(-10.0, 5.0, f % 2 == 0));
        }
        assert_eq!(c.state().sac_per_pursuit, 0);
        assert!(!c.state().pursued);
    }

    #[test]
    fn test_phase_runs_reward_without_color() {
        let config = ExperimentConfig::default();
        let mut c = GazeContingentController::new(&config, still_agents(400), Phase::TEST)
            .expect("controller");
        let mut frame = 100;
        let mut decision = FrameDecision::Continue;
        for _ in 0..5 {
            c.frame_decision(frame, &looking_at(0.0, 0.0, false));
            frame += 1;
            decision = c.frame_decision(frame, &looking_at(0.0, 0.0, true));
            frame += 1;
            if decision == FrameDecision::TriggerReward {
                break;
            }
        }
        assert_eq!(decision, FrameDecision::TriggerReward);
        assert!(c.state().reward_active());
        assert!(c.reward_color().is_none());
    }

    #[test]
    fn zero_reward_threshold_is_rejected() {
        let config = ExperimentConfig {
            sac_to_reward: [0, 5],
            ..ExperimentConfig::default()
        };
        let result = GazeContingentController::new(&config, still_agents(100), Phase::EASY);
        assert!(matches!(result, Err(SetupError::InvalidConfig(_))));
    }

    #[test]
    fn non_finite_refresh_rate_is_rejected() {
        for rate in [f64::NAN, f64::INFINITY] {
            let config = ExperimentConfig {
                refresh_rate_hz: rate,
                ..ExperimentConfig::default()
            };
            let result = GazeContingentController::new(&config, still_agents(100), Phase::EASY);
            assert!(matches!(result, Err(SetupError::InvalidConfig(_))));
        }
    }

    #[test]
    fn finished_controller_is_sticky() {
        let config = ExperimentConfig {
            criterion_secs: 0.0,
            ..ExperimentConfig::default()
        };
        let mut c = GazeContingentController::new(&config, still_agents(10), Phase::EASY)
            .expect("controller");
        let lost = FixationReport::no_signal();
        assert_eq!(c.frame_decision(0, &lost), FrameDecision::TrialFinished);
        assert_eq!(
            c.frame_decision(1, &looking_at(0.0, 0.0, true)),
            FrameDecision::TrialFinished
        );
        assert_eq!(c.state().time_not_looking, 1);
    }
}
