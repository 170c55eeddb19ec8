use std::sync::Arc;

use gaze_contingent::gaze::recording::{RecordedMessage, RecordedSample, RecordedTrial, Recording};
use gaze_contingent::gaze::types::{FixationReport, GazePoint};
use gaze_contingent::trial::controller::{FrameDecision, GazeContingentController};
use gaze_contingent::trial::trajectory::AgentTrajectories;

/// 目标 0 在原点，目标 1 与干扰项远离原点，全程静止
pub fn still_agents(frames: usize) -> Arc<AgentTrajectories> {
    Arc::new(
        AgentTrajectories::new(vec![vec![[0.0, 0.0], [10.0, 10.0], [-10.0, 5.0]]; frames])
            .expect("valid trajectory buffer"),
    )
}

pub fn fixating_at(x: f64, y: f64) -> FixationReport {
    FixationReport {
        gaze: GazePoint::new(x, y),
        centroid: GazePoint::new(x, y),
        is_fixating: true,
        frames_advanced: 0,
    }
}

pub fn moving_at(x: f64, y: f64) -> FixationReport {
    FixationReport {
        is_fixating: false,
        ..fixating_at(x, y)
    }
}

pub fn lost() -> FixationReport {
    FixationReport::no_signal()
}

/// 从 `start` 帧起输入一次完整注视：`gap` 帧扫视后持续注视 `hold` 帧。
/// 返回注视开始帧的决策与下一个可用帧号。
pub fn one_fixation(
    controller: &mut GazeContingentController,
    start: i64,
    at: (f64, f64),
    gap: i64,
    hold: i64,
) -> (FrameDecision, i64, Vec<FrameDecision>) {
    let mut decisions = Vec::new();
    let mut frame = start;
    for _ in 0..gap {
        decisions.push(controller.frame_decision(frame, &moving_at(at.0, at.1)));
        frame += 1;
    }
    let onset = controller.frame_decision(frame, &fixating_at(at.0, at.1));
    decisions.push(onset);
    frame += 1;
    for _ in 1..hold {
        decisions.push(controller.frame_decision(frame, &fixating_at(at.0, at.1)));
        frame += 1;
    }
    (onset, frame, decisions)
}

/// 双眼录制：每 `block` 个样本在两个相距 1.5° 的点之间跳视，两点都在目标 0 的注视半径内
pub fn pursuit_recording(trials: usize, samples: usize, block: usize) -> Recording {
    pursuit_then_hold_recording(trials, samples, block, samples)
}

/// 前 `until` 个样本同上跳视，之后一直注视原点
pub fn pursuit_then_hold_recording(
    trials: usize,
    samples: usize,
    block: usize,
    until: usize,
) -> Recording {
    let trial = |index: usize| RecordedTrial {
        trial: index,
        sample_rate_hz: 60.0,
        samples: (0..samples)
            .map(|i| {
                let x = if i < until && (i / block) % 2 == 1 { 1.5 } else { 0.0 };
                RecordedSample::binocular(i as f64 * 1000.0 / 60.0, Some([x, 0.0]), Some([x, 0.0]))
            })
            .collect(),
        messages: vec![RecordedMessage {
            timestamp_ms: 100_000.0,
            text: "Reward On".to_string(),
        }],
    };
    Recording {
        subject_id: 106,
        block: 0,
        trials: (0..trials).map(trial).collect(),
    }
}
