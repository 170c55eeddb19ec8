//! 奖励颜色振荡
//!
//! 奖励期间目标智能体的颜色在 start 与 end 之间来回移动，每帧移动
//! `oscillation * |start - end|`，下一步将越出线段时反向。奖励开启时颜色
//! 回到 start；奖励被延长时沿当前位置和方向继续移动。

use crate::trial::config::RewardColors;

pub type Rgb = [f64; 3];

fn distance(a: &Rgb, b: &Rgb) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardOscillator {
    start: Rgb,
    end: Rgb,
    span: f64,
    step: f64,
    current: Rgb,
}

impl RewardOscillator {
    pub fn new(palette: &RewardColors) -> Self {
        Self {
            start: palette.start,
            end: palette.end,
            span: distance(&palette.start, &palette.end),
            step: palette.oscillation,
            current: palette.start,
        }
    }

    pub fn current(&self) -> Rgb {
        self.current
    }

    /// 奖励开启：回到 start，方向不变
    pub fn restart(&mut self) {
        self.current = self.start;
    }

    fn stepped(&self, step: f64) -> Rgb {
        let (a, b, c) = (&self.start, &self.end, &self.current);
        [
            c[0] - step * (a[0] - b[0]),
            c[1] - step * (a[1] - b[1]),
            c[2] - step * (a[2] - b[2]),
        ]
    }

    /// 前进一帧并返回新颜色
    pub fn advance(&mut self) -> Rgb {
        let mut candidate = self.stepped(self.step);
        if distance(&self.start, &candidate) > self.span
            || distance(&self.end, &candidate) > self.span
        {
            self.step = -self.step;
            candidate = self.stepped(self.step);
        }
        self.current = candidate;
        candidate
    }
}
