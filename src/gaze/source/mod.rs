//! 眼动数据源
//!
//! 实时眼动仪、录制回放、逐帧步进回放三种后端实现同一个 `GazeSource`，
//! 试次控制器只依赖该 trait，与后端无关。每个数据源独占一个 `FixationFilter`。

pub mod live;
pub mod paced;
pub mod replay;
pub mod simulated;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::gaze::fixation::{FixationFilter, FixationParams};
use crate::gaze::types::{FixationReport, GazePoint, GazeSample};
use crate::gaze::units::Units;

pub use live::{tracker_channel, LiveTracker, TrackerHandle};
pub use paced::PacedReplay;
pub use replay::RecordedReplay;
pub use simulated::{SimulatedTracker, SimulationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Live,
    Recorded,
    Paced,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Recorded => "recorded",
            Self::Paced => "paced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "simulated" => Some(Self::Live),
            "recorded" | "replay" => Some(Self::Recorded),
            "paced" => Some(Self::Paced),
            _ => None,
        }
    }
}

/// 眼动数据源能力：接收样本、按帧查询注视状态
pub trait GazeSource: Send {
    fn kind(&self) -> SourceKind;

    /// 试次开始：重置注视状态（回放源在此预计算整段注视）
    fn begin_trial(&mut self, trial: usize) -> Result<(), SourceError>;

    /// 推入一个样本，可在两帧之间调用 0..N 次
    fn process_sample(&mut self, sample: GazeSample);

    /// 每帧调用一次，返回最新的注视状态，不阻塞
    fn current_fixation(&mut self, units: Units) -> FixationReport;

    fn end_trial(&mut self);
}

/// 回放源预计算的逐样本注视结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecomputedFixation {
    pub gaze: GazePoint,
    pub centroid: GazePoint,
    pub duration_secs: f64,
}

impl PrecomputedFixation {
    fn capture(filter: &FixationFilter) -> Self {
        Self {
            gaze: filter.last_gaze(),
            centroid: filter.centroid(),
            duration_secs: filter.duration_secs(),
        }
    }

    pub fn report(&self, params: &FixationParams) -> FixationReport {
        FixationReport {
            gaze: self.gaze,
            centroid: self.centroid,
            is_fixating: self.duration_secs > params.min_duration_secs,
            frames_advanced: 0,
        }
    }
}

/// 对一段注视序列逐个过滤并记录每步结果
pub(crate) fn precompute_fixations(
    filter: &mut FixationFilter,
    gaze: impl IntoIterator<Item = GazePoint>,
) -> Vec<PrecomputedFixation> {
    filter.reset();
    gaze.into_iter()
        .map(|g| {
            filter.process_sample(g);
            PrecomputedFixation::capture(filter)
        })
        .collect()
}
