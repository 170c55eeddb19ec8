//! 显示单位换算
//!
//! 滤波器内部统一使用视角度数（deg），对外输出时可换算为
//! 厘米（cm）、像素（pix）或归一化坐标（norm, [-1,1]）。

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CM_PER_PIXEL, TAN_ONE_DEGREE};
use crate::gaze::types::{EyeSample, GazePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Deg,
    Cm,
    Pix,
    Norm,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deg => "deg",
            Self::Cm => "cm",
            Self::Pix => "pix",
            Self::Norm => "norm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deg" => Some(Self::Deg),
            "cm" => Some(Self::Cm),
            "pix" => Some(Self::Pix),
            "norm" => Some(Self::Norm),
            _ => None,
        }
    }
}

/// 显示器几何参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayGeometry {
    pub width_px: f64,
    pub height_px: f64,
    /// 被试到屏幕的距离（厘米）
    pub distance_cm: f64,
    #[serde(default = "default_cm_per_pixel")]
    pub cm_per_pixel: f64,
}

fn default_cm_per_pixel() -> f64 {
    DEFAULT_CM_PER_PIXEL
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width_px: 1280.0,
            height_px: 1024.0,
            distance_cm: 70.0,
            cm_per_pixel: DEFAULT_CM_PER_PIXEL,
        }
    }
}

impl DisplayGeometry {
    /// 整屏对应的视角（度），用于归一化眼动坐标 -> 度数
    fn screen_span_deg(&self) -> (f64, f64) {
        let width_cm = self.width_px * self.cm_per_pixel;
        let height_cm = self.height_px * self.cm_per_pixel;
        (
            (width_cm / self.distance_cm).atan().to_degrees(),
            (height_cm / self.distance_cm).atan().to_degrees(),
        )
    }

    /// 单眼归一化屏幕坐标转换为以屏幕中心为原点的度数，y 轴向上
    pub fn eye_to_deg(&self, eye: &EyeSample) -> GazePoint {
        if !eye.is_valid() {
            return GazePoint::INVALID;
        }
        let (xscale, yscale) = self.screen_span_deg();
        GazePoint::new(
            eye.x * xscale - xscale / 2.0,
            -eye.y * yscale + yscale / 2.0,
        )
    }

    /// `eye_to_deg` 的逆变换，无效点得到丢失的眼睛
    pub fn deg_to_eye(&self, point: GazePoint) -> EyeSample {
        if !point.is_valid() {
            return EyeSample::lost();
        }
        let (xscale, yscale) = self.screen_span_deg();
        EyeSample::new(
            (point.x + xscale / 2.0) / xscale,
            (yscale / 2.0 - point.y) / yscale,
            0,
        )
    }

    pub fn convert(&self, point: GazePoint, units: Units) -> GazePoint {
        if !point.is_valid() {
            return GazePoint::INVALID;
        }
        match units {
            Units::Deg => point,
            Units::Cm => point.scale(self.distance_cm * TAN_ONE_DEGREE),
            Units::Pix => point.scale(self.distance_cm * TAN_ONE_DEGREE / self.cm_per_pixel),
            Units::Norm => {
                let pix = point.scale(self.distance_cm * TAN_ONE_DEGREE / self.cm_per_pixel);
                GazePoint::new(pix.x / self.width_px * 2.0, pix.y / self.height_px * 2.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_center_maps_to_origin() {
        let geo = DisplayGeometry::default();
        let p = geo.eye_to_deg(&EyeSample::new(0.5, 0.5, 0));
        assert!(p.x.abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn upper_left_is_negative_x_positive_y() {
        let geo = DisplayGeometry::default();
        let p = geo.eye_to_deg(&EyeSample::new(0.0, 0.0, 0));
        assert!(p.x < 0.0);
        assert!(p.y > 0.0);
    }

    #[test]
    fn deg_to_eye_inverts_eye_to_deg() {
        let geo = DisplayGeometry::default();
        let eye = EyeSample::new(0.2, 0.9, 0);
        let back = geo.deg_to_eye(geo.eye_to_deg(&eye));
        assert!((back.x - 0.2).abs() < 1e-9);
        assert!((back.y - 0.9).abs() < 1e-9);
        assert!(!geo.deg_to_eye(GazePoint::INVALID).is_valid());
    }

    #[test]
    fn lost_eye_is_invalid() {
        let geo = DisplayGeometry::default();
        assert!(!geo.eye_to_deg(&EyeSample::lost()).is_valid());
    }

    #[test]
    fn pix_and_norm_agree() {
        let geo = DisplayGeometry::default();
        let p = GazePoint::new(2.0, -1.0);
        let pix = geo.convert(p, Units::Pix);
        let norm = geo.convert(p, Units::Norm);
        assert!((norm.x - pix.x / geo.width_px * 2.0).abs() < 1e-12);
        assert!((norm.y - pix.y / geo.height_px * 2.0).abs() < 1e-12);
        assert_eq!(geo.convert(p, Units::Deg), p);
    }

    #[test]
    fn units_parse_roundtrip() {
        for u in [Units::Deg, Units::Cm, Units::Pix, Units::Norm] {
            assert_eq!(Units::parse(u.as_str()), Some(u));
        }
        assert_eq!(Units::parse("furlong"), None);
    }
}
