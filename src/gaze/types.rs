use serde::{Deserialize, Serialize};

use crate::constants::TRACKER_VALIDITY_NOT_FOUND;

/// 二维注视坐标；NaN 表示无数据
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
}

impl GazePoint {
    pub const INVALID: GazePoint = GazePoint {
        x: f64::NAN,
        y: f64::NAN,
    };

    pub const ORIGIN: GazePoint = GazePoint { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_valid(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan()
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// 两点欧氏距离，任一点无效时为 NaN
    pub fn distance(&self, other: &GazePoint) -> f64 {
        self.sub(other).norm()
    }

    pub fn add(&self, other: &GazePoint) -> GazePoint {
        GazePoint::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &GazePoint) -> GazePoint {
        GazePoint::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(&self, factor: f64) -> GazePoint {
        GazePoint::new(self.x * factor, self.y * factor)
    }
}

impl Default for GazePoint {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<[f64; 2]> for GazePoint {
    fn from(value: [f64; 2]) -> Self {
        GazePoint::new(value[0], value[1])
    }
}

/// 单个眼动样本（视角度数）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeSample {
    /// 时间戳（毫秒，单调递增）
    pub timestamp_ms: f64,
    pub position: GazePoint,
}

impl GazeSample {
    pub fn new(timestamp_ms: f64, position: GazePoint) -> Self {
        Self {
            timestamp_ms,
            position,
        }
    }

    pub fn invalid(timestamp_ms: f64) -> Self {
        Self::new(timestamp_ms, GazePoint::INVALID)
    }

    pub fn is_valid(&self) -> bool {
        self.position.is_valid()
    }
}

/// 单眼原始数据：归一化屏幕坐标 [0,1]（y 向下）与有效性代码
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    pub x: f64,
    pub y: f64,
    pub validity: u8,
}

impl EyeSample {
    pub fn new(x: f64, y: f64, validity: u8) -> Self {
        Self { x, y, validity }
    }

    pub fn lost() -> Self {
        Self::new(-1.0, -1.0, TRACKER_VALIDITY_NOT_FOUND)
    }

    pub fn is_valid(&self) -> bool {
        self.validity != TRACKER_VALIDITY_NOT_FOUND
    }
}

/// 眼动仪推送的双眼原始样本
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrackerSample {
    /// 设备时间戳（微秒）
    pub timestamp_us: i64,
    pub left: EyeSample,
    pub right: EyeSample,
}

/// 双眼平均：单眼丢失时取另一眼，双眼丢失为无效
pub fn combine_eyes(left: GazePoint, right: GazePoint) -> GazePoint {
    match (left.is_valid(), right.is_valid()) {
        (true, true) => GazePoint::new((left.x + right.x) / 2.0, (left.y + right.y) / 2.0),
        (true, false) => left,
        (false, true) => right,
        (false, false) => GazePoint::INVALID,
    }
}

/// 每帧查询的注视结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixationReport {
    pub gaze: GazePoint,
    pub centroid: GazePoint,
    pub is_fixating: bool,
    /// 回放源额外推进的帧数（逐帧步进时为 step - 1）
    pub frames_advanced: i64,
}

impl FixationReport {
    pub fn no_signal() -> Self {
        Self {
            gaze: GazePoint::INVALID,
            centroid: GazePoint::INVALID,
            is_fixating: false,
            frames_advanced: 0,
        }
    }
}
