use serde::{Deserialize, Serialize};

/// 被试注视状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GazeStatus {
    NoSignal,
    #[default]
    Saccade,
    Fixation,
}

/// 难度阶段：0 简单，1、2 困难，3 测试（不渲染奖励）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Phase(u8);

impl Phase {
    pub const EASY: Phase = Phase(0);
    pub const TEST: Phase = Phase(3);

    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::TEST.0).then_some(Phase(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// 奖励阈值表下标
    pub fn threshold_index(self) -> usize {
        if self.0 > 0 {
            1
        } else {
            0
        }
    }

    pub fn renders_reward(self) -> bool {
        self != Self::TEST
    }

    /// 测试阶段之后回到第一个困难阶段
    pub fn advanced(self) -> Self {
        if self.0 < Self::TEST.0 {
            Phase(self.0 + 1)
        } else {
            Phase(1)
        }
    }
}

/// 单个试次的控制状态，试次开始时创建，每帧更新一次
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialControlState {
    pub status: GazeStatus,
    /// 本次追踪中连续的追踪注视次数
    pub sac_per_pursuit: u32,
    pub pursued: bool,
    /// 奖励已持续的帧数，0 表示无奖励
    pub reward_iter: u32,
    pub nr_rewards: u32,
    pub blink_count: u32,
    pub time_not_looking: u32,
    pub last_fix_frame: i64,
    pub attention_catcher: bool,
    pub phase: Phase,
    pub finished: bool,
}

impl TrialControlState {
    pub fn new(phase: Phase) -> Self {
        Self {
            status: GazeStatus::Saccade,
            sac_per_pursuit: 0,
            pursued: false,
            reward_iter: 0,
            nr_rewards: 0,
            blink_count: 0,
            time_not_looking: 0,
            last_fix_frame: 0,
            attention_catcher: false,
            phase,
            finished: false,
        }
    }

    pub fn reward_active(&self) -> bool {
        self.reward_iter > 0
    }
}
