//! 已录制会话的数据结构与 JSON 读写，供回放眼动源使用

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RecordingError;
use crate::gaze::types::{combine_eyes, GazePoint, GazeSample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSample {
    pub timestamp_ms: f64,
    /// 左眼位置（度），丢失为 null
    pub left: Option<[f64; 2]>,
    pub right: Option<[f64; 2]>,
}

impl RecordedSample {
    pub fn binocular(timestamp_ms: f64, left: Option<[f64; 2]>, right: Option<[f64; 2]>) -> Self {
        Self {
            timestamp_ms,
            left,
            right,
        }
    }

    pub fn position(&self) -> GazePoint {
        let left = self.left.map(GazePoint::from).unwrap_or(GazePoint::INVALID);
        let right = self.right.map(GazePoint::from).unwrap_or(GazePoint::INVALID);
        combine_eyes(left, right)
    }

    pub fn to_gaze_sample(&self) -> GazeSample {
        GazeSample::new(self.timestamp_ms, self.position())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedMessage {
    pub timestamp_ms: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedTrial {
    pub trial: usize,
    pub sample_rate_hz: f64,
    pub samples: Vec<RecordedSample>,
    #[serde(default)]
    pub messages: Vec<RecordedMessage>,
}

impl RecordedTrial {
    /// 时间戳严格小于 `t_ms` 的最后一个样本下标，不存在时为 0
    pub fn index_before(&self, t_ms: f64) -> usize {
        let n = self
            .samples
            .partition_point(|s| s.timestamp_ms < t_ms);
        n.saturating_sub(1)
    }

    pub fn duration_ms(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub subject_id: u32,
    pub block: u32,
    pub trials: Vec<RecordedTrial>,
}

impl Recording {
    pub fn from_json_str(raw: &str) -> Result<Self, RecordingError> {
        let recording: Recording = serde_json::from_str(raw)?;
        recording.validate()?;
        Ok(recording)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let recording = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            subject = recording.subject_id,
            block = recording.block,
            trials = recording.trials.len(),
            "Recording loaded"
        );
        Ok(recording)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn trial(&self, index: usize) -> Option<&RecordedTrial> {
        self.trials.get(index)
    }

    fn validate(&self) -> Result<(), RecordingError> {
        for trial in &self.trials {
            if !(trial.sample_rate_hz > 0.0) {
                return Err(RecordingError::Invalid(format!(
                    "trial {} has non-positive sample rate",
                    trial.trial
                )));
            }
            let monotonic = trial
                .samples
                .windows(2)
                .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms);
            if !monotonic {
                return Err(RecordingError::Invalid(format!(
                    "trial {} timestamps are not monotonic",
                    trial.trial
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial() -> RecordedTrial {
        RecordedTrial {
            trial: 0,
            sample_rate_hz: 60.0,
            samples: vec![
                RecordedSample::binocular(0.0, Some([0.0, 0.0]), Some([2.0, 2.0])),
                RecordedSample::binocular(16.0, None, Some([1.0, 1.0])),
                RecordedSample::binocular(33.0, None, None),
            ],
            messages: vec![],
        }
    }

    #[test]
    fn index_before_is_strict() {
        let t = trial();
        assert_eq!(t.index_before(-5.0), 0);
        assert_eq!(t.index_before(16.0), 0);
        assert_eq!(t.index_before(16.5), 1);
        assert_eq!(t.index_before(1_000.0), 2);
    }

    #[test]
    fn sample_position_averages_eyes() {
        let t = trial();
        assert_eq!(t.samples[0].position(), GazePoint::new(1.0, 1.0));
        assert_eq!(t.samples[1].position(), GazePoint::new(1.0, 1.0));
        assert!(!t.samples[2].position().is_valid());
    }

    #[test]
    fn non_monotonic_timestamps_rejected() {
        let mut t = trial();
        t.samples.swap(0, 2);
        let rec = Recording {
            subject_id: 1,
            block: 0,
            trials: vec![t],
        };
        let raw = serde_json::to_string(&rec).expect("serialize");
        assert!(matches!(
            Recording::from_json_str(&raw),
            Err(RecordingError::Invalid(_))
        ));
    }
}
