//! 试次行为
//!
//! 三种试次共用同一个逐帧接口：
//! - `Behavioral`：不看注视，外部响应信号（鼠标/按键）触发结束
//! - `GazeContingent`：注视触发的试次控制器
//! - `ReplayDriven`：对录制数据运行控制器，并与录制中的奖励消息逐条对比

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::gaze::recording::RecordedTrial;
use crate::gaze::types::FixationReport;
use crate::trial::controller::{FrameDecision, GazeContingentController};
use crate::trial::event::EventKind;
use crate::trial::reward::Rgb;
use crate::trial::state::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BehaviorKind {
    Behavioral,
    GazeContingent,
    ReplayDriven,
}

impl BehaviorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Behavioral => "behavioral",
            Self::GazeContingent => "gaze_contingent",
            Self::ReplayDriven => "replay_driven",
        }
    }
}

/// 录制中的一条奖励消息，已换算为帧号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTransition {
    pub frame: i64,
    pub text: String,
    #[serde(skip)]
    matched: bool,
}

impl ExpectedTransition {
    pub fn new(frame: i64, text: impl Into<String>) -> Self {
        Self {
            frame,
            text: text.into(),
            matched: false,
        }
    }

    /// 取出试次中的奖励开/关消息，时间戳按刷新率换算为帧号
    pub fn from_recorded(trial: &RecordedTrial, refresh_hz: f64) -> Vec<Self> {
        let t0 = trial.samples.first().map_or(0.0, |s| s.timestamp_ms);
        trial
            .messages
            .iter()
            .filter(|m| m.text == "Reward On" || m.text == "Reward Off")
            .map(|m| Self::new(((m.timestamp_ms - t0) * refresh_hz / 1000.0).round() as i64, m.text.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DivergenceKind {
    /// 控制器做出了录制中没有的决策
    Unexpected,
    /// 录制中的决策没有被复现
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayDivergence {
    pub kind: DivergenceKind,
    pub frame: i64,
    pub text: String,
}

pub struct ReplayComparison {
    controller: GazeContingentController,
    expected: Vec<ExpectedTransition>,
    tolerance_frames: i64,
    divergences: Vec<ReplayDivergence>,
    pending: Vec<(i64, EventKind)>,
}

impl ReplayComparison {
    pub fn new(
        controller: GazeContingentController,
        expected: Vec<ExpectedTransition>,
        tolerance_frames: i64,
    ) -> Self {
        Self {
            controller,
            expected,
            tolerance_frames,
            divergences: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn divergences(&self) -> &[ReplayDivergence] {
        &self.divergences
    }

    fn observe(&mut self, frame: i64, kind: &EventKind) {
        let text = match kind {
            EventKind::RewardOn | EventKind::RewardOff => kind.message_text().unwrap_or_default(),
            _ => return,
        };
        let tolerance = self.tolerance_frames;
        let hit = self
            .expected
            .iter_mut()
            .find(|e| !e.matched && e.text == text && (e.frame - frame).abs() <= tolerance);
        match hit {
            Some(expected) => expected.matched = true,
            None => {
                tracing::debug!(frame, text, "Replay decision not in recording");
                self.record(DivergenceKind::Unexpected, frame, text.to_string(), None);
            }
        }
    }

    fn record(&mut self, kind: DivergenceKind, frame: i64, text: String, frame_offset: Option<i64>) {
        self.pending.push((
            frame,
            EventKind::ReplayDivergence {
                expected: text.clone(),
                frame_offset,
            },
        ));
        self.divergences.push(ReplayDivergence { kind, frame, text });
    }

    /// 试次结束：截至 `last_frame` 仍未复现的录制决策计为缺失
    fn finish(&mut self, last_frame: i64) {
        let missing: Vec<(i64, String)> = self
            .expected
            .iter()
            .filter(|e| !e.matched && e.frame <= last_frame + self.tolerance_frames)
            .map(|e| (e.frame, e.text.clone()))
            .collect();
        for (frame, text) in missing {
            self.record(DivergenceKind::Missing, frame, text, Some(last_frame - frame));
        }
    }

    fn frame_decision(&mut self, frame: i64, report: &FixationReport) -> FrameDecision {
        let decision = self.controller.frame_decision(frame, report);
        for (f, kind) in self.controller.drain_events() {
            self.observe(f, &kind);
            self.pending.push((f, kind));
        }
        decision
    }
}

pub enum TrialBehavior {
    Behavioral {
        response: Arc<AtomicBool>,
        pending: Vec<(i64, EventKind)>,
    },
    GazeContingent(GazeContingentController),
    ReplayDriven(Box<ReplayComparison>),
}

impl TrialBehavior {
    pub fn behavioral(response: Arc<AtomicBool>) -> Self {
        // 上一个试次遗留的响应不算数
        response.store(false, Ordering::SeqCst);
        Self::Behavioral {
            response,
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> BehaviorKind {
        match self {
            Self::Behavioral { .. } => BehaviorKind::Behavioral,
            Self::GazeContingent(_) => BehaviorKind::GazeContingent,
            Self::ReplayDriven(_) => BehaviorKind::ReplayDriven,
        }
    }

    pub fn frame_decision(&mut self, frame: i64, report: &FixationReport) -> FrameDecision {
        match self {
            Self::Behavioral { response, pending } => {
                if response.swap(false, Ordering::SeqCst) {
                    pending.push((frame, EventKind::Response));
                    FrameDecision::TrialFinished
                } else {
                    FrameDecision::Continue
                }
            }
            Self::GazeContingent(controller) => controller.frame_decision(frame, report),
            Self::ReplayDriven(comparison) => comparison.frame_decision(frame, report),
        }
    }

    pub fn drain_events(&mut self) -> Vec<(i64, EventKind)> {
        match self {
            Self::Behavioral { pending, .. } => std::mem::take(pending),
            Self::GazeContingent(controller) => controller.drain_events(),
            Self::ReplayDriven(comparison) => std::mem::take(&mut comparison.pending),
        }
    }

    /// 试次结束时调用，回放对比在此补记缺失的决策
    pub fn finish(&mut self, last_frame: i64) {
        if let Self::ReplayDriven(comparison) = self {
            comparison.finish(last_frame);
        }
    }

    pub fn controller(&self) -> Option<&GazeContingentController> {
        match self {
            Self::Behavioral { .. } => None,
            Self::GazeContingent(controller) => Some(controller),
            Self::ReplayDriven(comparison) => Some(&comparison.controller),
        }
    }

    /// 试次结束后的难度阶段；行为试次不改变阶段
    pub fn phase(&self) -> Option<Phase> {
        self.controller().map(GazeContingentController::phase)
    }

    pub fn reward_color(&self) -> Option<Rgb> {
        self.controller().and_then(GazeContingentController::reward_color)
    }

    pub fn attention_catcher_needed(&self) -> bool {
        self.controller()
            .is_some_and(GazeContingentController::attention_catcher_needed)
    }

    pub fn divergences(&self) -> &[ReplayDivergence] {
        match self {
            Self::ReplayDriven(comparison) => comparison.divergences(),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::config::ExperimentConfig;
    use crate::trial::trajectory::AgentTrajectories;

    fn controller() -> GazeContingentController {
        let trajectories = Arc::new(
            AgentTrajectories::new(vec![vec![[0.0, 0.0], [8.0, 8.0]]; 500]).expect("valid buffer"),
        );
        GazeContingentController::new(&ExperimentConfig::default(), trajectories, Phase::EASY)
            .expect("controller")
    }

    #[test]
    fn behavioral_finishes_on_response() {
        let response = Arc::new(AtomicBool::new(true));
        let mut b = TrialBehavior::behavioral(Arc::clone(&response));
        let report = FixationReport::no_signal();
        assert_eq!(b.frame_decision(0, &report), FrameDecision::Continue);
        response.store(true, Ordering::SeqCst);
        assert_eq!(b.frame_decision(1, &report), FrameDecision::TrialFinished);
        assert_eq!(b.drain_events(), vec![(1, EventKind::Response)]);
        assert!(b.phase().is_none());
    }

    #[test]
    fn unmatched_expectation_is_reported_missing() {
        let mut b = TrialBehavior::ReplayDriven(Box::new(ReplayComparison::new(
            controller(),
            vec![ExpectedTransition::new(5, "Reward On")],
            2,
        )));
        for f in 0..10 {
            b.frame_decision(f, &FixationReport::no_signal());
        }
        b.finish(9);
        assert_eq!(b.divergences().len(), 1);
        assert_eq!(b.divergences()[0].kind, DivergenceKind::Missing);
    }

    #[test]
    fn expectations_from_recording_use_frame_numbers() {
        use crate::gaze::recording::{RecordedMessage, RecordedSample};
        let trial = RecordedTrial {
            trial: 0,
            sample_rate_hz: 60.0,
            samples: vec![RecordedSample::binocular(1000.0, None, None)],
            messages: vec![
                RecordedMessage {
                    timestamp_ms: 3000.0,
                    text: "Reward On".to_string(),
                },
                RecordedMessage {
                    timestamp_ms: 3100.0,
                    text: "1th Saccade 0.1 0.2".to_string(),
                },
            ],
        };
        let expected = ExpectedTransition::from_recorded(&trial, 75.0);
        assert_eq!(expected, vec![ExpectedTransition::new(150, "Reward On")]);
    }
}
