//! 实时眼动仪数据源
//!
//! 眼动仪的回调线程通过 `TrackerHandle::push` 把原始样本推入有界通道，
//! 渲染循环每帧调用 `current_fixation` 时一次性取出通道中全部样本送入滤波器。
//! 两侧都不阻塞：通道满时丢弃新样本并计数。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::SourceError;
use crate::gaze::fixation::{FixationFilter, FixationParams};
use crate::gaze::source::{GazeSource, SourceKind};
use crate::gaze::types::{combine_eyes, FixationReport, GazeSample, RawTrackerSample};
use crate::gaze::units::{DisplayGeometry, Units};

/// 眼动仪回调侧的推送句柄
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<RawTrackerSample>,
    dropped: Arc<AtomicU64>,
}

impl TrackerHandle {
    /// 非阻塞推送；通道已满或已关闭时返回 false
    pub fn push(&self, sample: RawTrackerSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped, "Tracker channel full, dropping samples");
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub fn tracker_channel(capacity: usize) -> (TrackerHandle, mpsc::Receiver<RawTrackerSample>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        TrackerHandle {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

pub struct LiveTracker {
    rx: mpsc::Receiver<RawTrackerSample>,
    filter: FixationFilter,
    geometry: DisplayGeometry,
    archive: Vec<GazeSample>,
    trial_start_us: Option<i64>,
    tracking: bool,
    disconnected: bool,
}

impl LiveTracker {
    pub fn new(
        params: FixationParams,
        geometry: DisplayGeometry,
        rx: mpsc::Receiver<RawTrackerSample>,
    ) -> Self {
        Self {
            rx,
            filter: FixationFilter::new(params),
            geometry,
            archive: Vec::new(),
            trial_start_us: None,
            tracking: false,
            disconnected: false,
        }
    }

    pub fn filter(&self) -> &FixationFilter {
        &self.filter
    }

    /// 本试次已接收的样本（试次结束后可交给输出模块）
    pub fn archive(&self) -> &[GazeSample] {
        &self.archive
    }

    fn to_gaze_sample(&mut self, raw: &RawTrackerSample) -> GazeSample {
        let start = *self.trial_start_us.get_or_insert(raw.timestamp_us);
        let timestamp_ms = (raw.timestamp_us - start) as f64 / 1000.0;
        let left = self.geometry.eye_to_deg(&raw.left);
        let right = self.geometry.eye_to_deg(&raw.right);
        GazeSample::new(timestamp_ms, combine_eyes(left, right))
    }

    /// 取出通道中全部待处理样本，返回本次处理的数量
    fn drain(&mut self) -> usize {
        let mut processed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(raw) => {
                    let sample = self.to_gaze_sample(&raw);
                    self.process_sample(sample);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        tracing::warn!("Tracker delivery channel disconnected");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        processed
    }
}

impl GazeSource for LiveTracker {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn begin_trial(&mut self, trial: usize) -> Result<(), SourceError> {
        let mut stale = 0usize;
        while self.rx.try_recv().is_ok() {
            stale += 1;
        }
        self.filter.reset();
        self.archive.clear();
        self.trial_start_us = None;
        self.tracking = true;
        tracing::debug!(trial, stale, "Live tracker armed");
        Ok(())
    }

    fn process_sample(&mut self, sample: GazeSample) {
        if self.tracking {
            self.archive.push(sample);
        }
        self.filter.process_sample(sample.position);
    }

    fn current_fixation(&mut self, units: Units) -> FixationReport {
        self.drain();
        self.filter.current_fixation_in(&self.geometry, units)
    }

    fn end_trial(&mut self) {
        self.drain();
        self.tracking = false;
        tracing::debug!(samples = self.archive.len(), "Live tracker stopped");
    }
}
