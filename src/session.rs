//! 会话驱动（无界面渲染循环）
//!
//! 按刷新率逐帧运行试次：查询数据源注视状态、应用回放源的额外帧推进、
//! 调用试次行为的逐帧决策并计时。难度阶段与「下一试次前显示注意力吸引」
//! 标志在试次之间传递。

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{RecordingError, SetupError, SourceError};
use crate::gaze::recording::Recording;
use crate::gaze::source::simulated::SimulatedTarget;
use crate::gaze::source::GazeSource;
use crate::gaze::types::FixationReport;
use crate::gaze::units::Units;
use crate::metrics::{FrameTimingMetrics, FrameTimingSnapshot};
use crate::trial::behavior::{
    BehaviorKind, ExpectedTransition, ReplayComparison, ReplayDivergence, TrialBehavior,
};
use crate::trial::config::ExperimentConfig;
use crate::trial::controller::{FrameDecision, GazeContingentController};
use crate::trial::event::{EventKind, SessionEvent};
use crate::trial::state::Phase;
use crate::trial::trajectory::AgentTrajectories;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Pacing {
    /// 按刷新率节拍运行
    RealTime,
    /// 不等待，尽快运行（回放与测试）
    Unpaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrialOutcome {
    Finished,
    AttentionCatcher,
    /// 轨迹播放完毕仍未结束
    Omission,
    /// 收到关闭信号
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSummary {
    pub session_id: Uuid,
    pub trial: usize,
    pub behavior: BehaviorKind,
    pub outcome: TrialOutcome,
    pub last_frame: i64,
    pub phase_before: u8,
    pub phase_after: u8,
    pub rewards: u32,
    pub sac_per_pursuit: u32,
    /// 渲染了奖励颜色的帧数，测试阶段为 0
    pub reward_frames: u32,
    /// 试次开始前是否显示了注意力吸引
    pub attention_catcher_shown: bool,
    pub last_fixation: Option<FixationReport>,
    pub divergences: Vec<ReplayDivergence>,
    pub timing: FrameTimingSnapshot,
}

/// 会话整体输出
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_phase: u8,
    pub trials: Vec<TrialSummary>,
    pub events: Vec<SessionEvent>,
}

impl SessionReport {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: Arc<ExperimentConfig>,
    source: Box<dyn GazeSource>,
    recording: Option<Arc<Recording>>,
    simulation: Option<watch::Sender<Option<SimulatedTarget>>>,
    shutdown_rx: Option<broadcast::Receiver<()>>,
    phase: Phase,
    show_attention_catcher: bool,
    response: Arc<AtomicBool>,
    events: Vec<SessionEvent>,
    metrics: FrameTimingMetrics,
    summaries: Vec<TrialSummary>,
}

impl Session {
    pub fn new(config: Arc<ExperimentConfig>, source: Box<dyn GazeSource>) -> Self {
        let metrics = FrameTimingMetrics::new(config.refresh_rate_hz);
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            source,
            recording: None,
            simulation: None,
            shutdown_rx: None,
            phase: Phase::EASY,
            show_attention_catcher: true,
            response: Arc::new(AtomicBool::new(false)),
            events: Vec::new(),
            metrics,
            summaries: Vec::new(),
        }
    }

    /// 回放对比试次所需的录制数据
    pub fn with_recording(mut self, recording: Arc<Recording>) -> Self {
        self.recording = Some(recording);
        self
    }

    /// 试次开始/结束时通知模拟眼动仪切换跟随目标
    pub fn with_simulation(mut self, tx: watch::Sender<Option<SimulatedTarget>>) -> Self {
        self.simulation = Some(tx);
        self
    }

    pub fn with_shutdown(mut self, rx: broadcast::Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn show_attention_catcher(&self) -> bool {
        self.show_attention_catcher
    }

    /// 行为试次的外部响应信号（由界面侧置位）
    pub fn response_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.response)
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn summaries(&self) -> &[TrialSummary] {
        &self.summaries
    }

    pub fn source(&self) -> &dyn GazeSource {
        self.source.as_ref()
    }

    pub fn into_report(self) -> SessionReport {
        SessionReport {
            session_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            final_phase: self.phase.level(),
            trials: self.summaries,
            events: self.events,
        }
    }

    fn log(&mut self, trial: usize, frame: i64, kind: EventKind) {
        self.events.push(SessionEvent::now(trial, frame, kind));
    }

    fn shutdown_requested(&mut self) -> bool {
        match self.shutdown_rx.as_mut().map(|rx| rx.try_recv()) {
            Some(Ok(())) | Some(Err(TryRecvError::Lagged(_))) => true,
            Some(Err(TryRecvError::Empty)) | Some(Err(TryRecvError::Closed)) | None => false,
        }
    }

    fn build_behavior(
        &self,
        trial: usize,
        trajectories: &Arc<AgentTrajectories>,
        kind: BehaviorKind,
    ) -> Result<TrialBehavior, SetupError> {
        self.config.validate().map_err(SetupError::InvalidConfig)?;
        match kind {
            BehaviorKind::Behavioral => Ok(TrialBehavior::behavioral(self.response_signal())),
            BehaviorKind::GazeContingent => Ok(TrialBehavior::GazeContingent(
                GazeContingentController::new(&self.config, Arc::clone(trajectories), self.phase)?,
            )),
            BehaviorKind::ReplayDriven => {
                let recording = self.recording.as_ref().ok_or(SetupError::MissingRecording)?;
                let recorded = recording.trial(trial).ok_or(SourceError::TrialOutOfRange {
                    trial,
                    available: recording.trials.len(),
                })?;
                let expected =
                    ExpectedTransition::from_recorded(recorded, self.config.refresh_rate_hz);
                let controller =
                    GazeContingentController::new(&self.config, Arc::clone(trajectories), self.phase)?;
                Ok(TrialBehavior::ReplayDriven(Box::new(ReplayComparison::new(
                    controller,
                    expected,
                    self.config.replay_tolerance_frames,
                ))))
            }
        }
    }

    /// 运行一个试次，直到结束决策、轨迹播放完毕或收到关闭信号
    pub async fn run_trial(
        &mut self,
        trial: usize,
        trajectories: Arc<AgentTrajectories>,
        kind: BehaviorKind,
        pacing: Pacing,
    ) -> Result<TrialSummary, SetupError> {
        // 前置条件在触碰数据源之前检查
        let mut behavior = self.build_behavior(trial, &trajectories, kind)?;
        self.source.begin_trial(trial)?;
        if let Some(tx) = &self.simulation {
            tx.send_replace(Some(SimulatedTarget::new(
                Arc::clone(&trajectories),
                self.config.refresh_rate_hz,
            )));
        }

        let phase_before = self.phase;
        let attention_catcher_shown = self.show_attention_catcher;
        self.log(trial, 0, EventKind::TrialStart);
        self.log(trial, 0, EventKind::Phase { level: phase_before.level() });
        tracing::info!(
            session = %self.id,
            trial,
            behavior = kind.as_str(),
            source = self.source.kind().as_str(),
            phase = phase_before.level(),
            attention_catcher = attention_catcher_shown,
            frames = trajectories.frame_count(),
            "Trial started"
        );

        let mut ticker = match pacing {
            Pacing::RealTime => {
                let period = Duration::from_secs_f64(1.0 / self.config.refresh_rate_hz);
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                Some(interval)
            }
            Pacing::Unpaced => None,
        };

        let nr_frames = trajectories.frame_count() as i64;
        let mut frame: i64 = 0;
        let mut last_frame: i64 = 0;
        let mut last_fixation: Option<FixationReport> = None;
        let mut outcome = TrialOutcome::Omission;
        let mut reward_frames: u32 = 0;

        while frame < nr_frames {
            match ticker.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => tokio::task::yield_now().await,
            }
            if self.shutdown_requested() {
                tracing::warn!(trial, frame, "Shutdown requested, aborting trial");
                outcome = TrialOutcome::Aborted;
                break;
            }

            let started = Instant::now();
            let report = self.source.current_fixation(Units::Deg);
            frame += report.frames_advanced;
            let decision = behavior.frame_decision(frame, &report);
            self.metrics.record(started.elapsed().as_micros() as u64);
            if behavior.reward_color().is_some() {
                reward_frames += 1;
            }

            for (f, event) in behavior.drain_events() {
                self.log(trial, f, event);
            }
            last_frame = frame;
            last_fixation = Some(report);

            if decision == FrameDecision::TrialFinished {
                outcome = if behavior.attention_catcher_needed() {
                    TrialOutcome::AttentionCatcher
                } else {
                    TrialOutcome::Finished
                };
                break;
            }
            frame += 1;
        }

        if outcome == TrialOutcome::Omission {
            self.log(trial, last_frame, EventKind::Omission);
        }
        behavior.finish(last_frame);
        for (f, event) in behavior.drain_events() {
            self.log(trial, f, event);
        }
        self.source.end_trial();
        if let Some(tx) = &self.simulation {
            tx.send_replace(None);
        }

        if let Some(phase) = behavior.phase() {
            self.phase = phase;
        }
        if kind != BehaviorKind::Behavioral {
            self.show_attention_catcher = behavior.attention_catcher_needed();
        }

        let state = behavior.controller().map(|c| c.state().clone());
        let units = self.config.units;
        let display = self.config.display;
        let summary = TrialSummary {
            session_id: self.id,
            trial,
            behavior: kind,
            outcome,
            last_frame,
            phase_before: phase_before.level(),
            phase_after: self.phase.level(),
            rewards: state.as_ref().map_or(0, |s| s.nr_rewards),
            sac_per_pursuit: state.as_ref().map_or(0, |s| s.sac_per_pursuit),
            reward_frames,
            attention_catcher_shown,
            last_fixation: last_fixation.map(|r| FixationReport {
                gaze: display.convert(r.gaze, units),
                centroid: display.convert(r.centroid, units),
                ..r
            }),
            divergences: behavior.divergences().to_vec(),
            timing: self.metrics.snapshot_and_reset(),
        };

        tracing::info!(
            session = %self.id,
            trial,
            outcome = ?summary.outcome,
            last_frame,
            rewards = summary.rewards,
            reward_frames,
            phase = summary.phase_after,
            divergences = summary.divergences.len(),
            p95_us = summary.timing.p95_us,
            over_budget = summary.timing.over_budget,
            "Trial finished"
        );
        self.summaries.push(summary.clone());
        Ok(summary)
    }
}
