//! 逐帧步进回放
//!
//! 将录制试次按渲染帧率重采样为固定帧数，预计算每帧注视结果。
//! 每次查询消费一个步长（操作员按键），游标从 -1 开始。

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::SourceError;
use crate::gaze::fixation::{FixationFilter, FixationParams};
use crate::gaze::recording::{RecordedTrial, Recording};
use crate::gaze::source::{precompute_fixations, GazeSource, PrecomputedFixation, SourceKind};
use crate::gaze::types::{FixationReport, GazePoint, GazeSample};
use crate::gaze::units::{DisplayGeometry, Units};

/// 一个重采样帧
#[derive(Debug, Clone, PartialEq)]
pub struct PacedFrame {
    pub gaze: GazePoint,
    /// 对应录制样本的时间戳（毫秒）
    pub source_timestamp_ms: f64,
    /// 该帧首次越过的录制消息，没有则为空
    pub message: Option<String>,
}

pub struct PacedReplay {
    recording: Arc<Recording>,
    params: FixationParams,
    geometry: DisplayGeometry,
    refresh_hz: f64,
    max_trial_secs: f64,
    frames: Vec<PacedFrame>,
    fixations: Vec<PrecomputedFixation>,
    steps: VecDeque<i64>,
    cursor: i64,
}

impl PacedReplay {
    pub fn new(
        recording: Arc<Recording>,
        params: FixationParams,
        geometry: DisplayGeometry,
        refresh_hz: f64,
        max_trial_secs: f64,
    ) -> Self {
        Self {
            recording,
            params,
            geometry,
            refresh_hz,
            max_trial_secs,
            frames: Vec::new(),
            fixations: Vec::new(),
            steps: VecDeque::new(),
            cursor: -1,
        }
    }

    /// 排入一次步进，下一次 `current_fixation` 消费
    pub fn push_step(&mut self, step: i64) {
        self.steps.push_back(step);
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: i64) -> Option<&PacedFrame> {
        usize::try_from(index).ok().and_then(|i| self.frames.get(i))
    }

    pub fn message_at(&self, index: i64) -> Option<&str> {
        self.frame(index).and_then(|f| f.message.as_deref())
    }

    fn resample(&self, recorded: &RecordedTrial) -> Vec<PacedFrame> {
        let total = (self.max_trial_secs * self.refresh_hz) as usize;
        let mut next_message = 0usize;
        (0..total)
            .map(|t| {
                let tt = t as f64 / self.refresh_hz * 1000.0;
                let index = recorded.index_before(tt);
                let sample = &recorded.samples[index];
                let gaze = if index == 0 {
                    GazePoint::INVALID
                } else {
                    sample.position()
                };
                let message = match recorded.messages.get(next_message) {
                    Some(m) if sample.timestamp_ms > m.timestamp_ms => {
                        next_message += 1;
                        Some(m.text.clone())
                    }
                    _ => None,
                };
                PacedFrame {
                    gaze,
                    source_timestamp_ms: sample.timestamp_ms,
                    message,
                }
            })
            .collect()
    }
}

impl GazeSource for PacedReplay {
    fn kind(&self) -> SourceKind {
        SourceKind::Paced
    }

    fn begin_trial(&mut self, trial: usize) -> Result<(), SourceError> {
        let recording = Arc::clone(&self.recording);
        let recorded = recording.trial(trial).ok_or(SourceError::TrialOutOfRange {
            trial,
            available: recording.trials.len(),
        })?;
        if recorded.samples.is_empty() {
            return Err(SourceError::EmptyTrial { trial });
        }

        self.frames = self.resample(recorded);
        let mut filter = FixationFilter::new(self.params);
        self.fixations = precompute_fixations(&mut filter, self.frames.iter().map(|f| f.gaze));
        self.steps.clear();
        self.cursor = -1;

        tracing::debug!(
            trial,
            frames = self.frames.len(),
            messages = recorded.messages.len(),
            "Paced replay prepared"
        );
        Ok(())
    }

    fn process_sample(&mut self, _sample: GazeSample) {}

    fn current_fixation(&mut self, units: Units) -> FixationReport {
        let step = self.steps.pop_front().unwrap_or(1);
        self.cursor += step;

        let report = match usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.fixations.get(i))
        {
            Some(fix) => fix.report(&self.params),
            None => FixationReport::no_signal(),
        };
        FixationReport {
            gaze: self.geometry.convert(report.gaze, units),
            centroid: self.geometry.convert(report.centroid, units),
            frames_advanced: step - 1,
            ..report
        }
    }

    fn end_trial(&mut self) {
        tracing::debug!(cursor = self.cursor, "Paced replay finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::recording::{RecordedMessage, RecordedSample};

    fn recording() -> Arc<Recording> {
        let samples = (0..120)
            .map(|i| RecordedSample::binocular(i as f64 * 1000.0 / 60.0, Some([0.0, 0.0]), None))
            .collect();
        Arc::new(Recording {
            subject_id: 1,
            block: 2,
            trials: vec![RecordedTrial {
                trial: 0,
                sample_rate_hz: 60.0,
                samples,
                messages: vec![RecordedMessage {
                    timestamp_ms: 500.0,
                    text: "Reward On".to_string(),
                }],
            }],
        })
    }

    fn paced() -> PacedReplay {
        PacedReplay::new(
            recording(),
            FixationParams {
                theta: 0.6,
                velocity_threshold: 18.0,
                min_duration_secs: 0.1,
                sample_rate_hz: 60.0,
            },
            DisplayGeometry::default(),
            75.0,
            2.0,
        )
    }

    #[test]
    fn resamples_to_refresh_rate() {
        let mut p = paced();
        p.begin_trial(0).expect("begin");
        assert_eq!(p.frame_count(), 150);
        assert!(!p.frame(0).expect("frame").gaze.is_valid());
    }

    #[test]
    fn steps_move_cursor_and_report_extra_frames() {
        let mut p = paced();
        p.begin_trial(0).expect("begin");
        let r = p.current_fixation(Units::Deg);
        assert_eq!(p.cursor(), 0);
        assert_eq!(r.frames_advanced, 0);

        p.push_step(10);
        let r = p.current_fixation(Units::Deg);
        assert_eq!(p.cursor(), 10);
        assert_eq!(r.frames_advanced, 9);
        assert!(r.is_fixating);

        p.push_step(-1);
        let r = p.current_fixation(Units::Deg);
        assert_eq!(p.cursor(), 9);
        assert_eq!(r.frames_advanced, -2);
    }

    #[test]
    fn past_the_end_has_no_signal() {
        let mut p = paced();
        p.begin_trial(0).expect("begin");
        p.push_step(100);
        p.push_step(100);
        p.current_fixation(Units::Deg);
        let r = p.current_fixation(Units::Deg);
        assert!(!r.gaze.is_valid());
        assert!(!r.centroid.is_valid());
        assert!(!r.is_fixating);
    }

    #[test]
    fn message_attached_once() {
        let mut p = paced();
        p.begin_trial(0).expect("begin");
        let hits: Vec<i64> = (0..p.frame_count() as i64)
            .filter(|i| p.message_at(*i).is_some())
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(p.message_at(hits[0]), Some("Reward On"));
    }
}
