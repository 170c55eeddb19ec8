//! 智能体轨迹缓冲区（帧 × 智能体，视角度数）
//!
//! 由外部预生成，整个试次只读。按帧查询时越界下标被钳制到首帧或末帧。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RecordingError, SetupError};
use crate::gaze::types::GazePoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTrajectories {
    frames: Vec<Vec<[f64; 2]>>,
}

impl AgentTrajectories {
    /// 构造并校验：至少一帧，每帧智能体数量一致
    pub fn new(frames: Vec<Vec<[f64; 2]>>) -> Result<Self, SetupError> {
        let trajectories = Self { frames };
        trajectories.validate()?;
        Ok(trajectories)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SetupError> {
        let trajectories: AgentTrajectories =
            serde_json::from_str(raw).map_err(RecordingError::from)?;
        trajectories.validate()?;
        Ok(trajectories)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(RecordingError::from)?;
        let trajectories = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            frames = trajectories.frame_count(),
            agents = trajectories.agent_count(),
            "Trajectories loaded"
        );
        Ok(trajectories)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
        let raw = serde_json::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn agent_count(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    /// 指定帧的智能体位置；帧下标钳制到 [0, 帧数-1]，未知智能体为 NaN
    pub fn position(&self, frame: i64, agent: usize) -> GazePoint {
        let Some(last) = self.frames.len().checked_sub(1) else {
            return GazePoint::INVALID;
        };
        let index = usize::try_from(frame.max(0)).unwrap_or(usize::MAX).min(last);
        self.frames[index]
            .get(agent)
            .copied()
            .map(GazePoint::from)
            .unwrap_or(GazePoint::INVALID)
    }

    /// 试次准备时确认目标智能体存在
    pub fn require_targets(&self, targets: &[usize]) -> Result<(), SetupError> {
        let agents = self.agent_count();
        match targets.iter().find(|&&agent| agent >= agents) {
            Some(&agent) => Err(SetupError::MissingTargetAgent { agent, agents }),
            None => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), SetupError> {
        let expected = self.agent_count();
        if self.frames.is_empty() || expected == 0 {
            return Err(SetupError::EmptyTrajectory);
        }
        if let Some((frame, row)) = self
            .frames
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != expected)
        {
            return Err(SetupError::RaggedTrajectory {
                frame,
                expected,
                found: row.len(),
            });
        }
        Ok(())
    }
}
