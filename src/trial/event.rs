use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    TrialStart,
    Phase { level: u8 },
    PhaseAdvanced { from: u8, to: u8 },
    PursuitSaccade { count: u32, x: f64, y: f64 },
    RewardOn,
    RewardOff,
    AttentionCatcher,
    Response,
    Omission,
    /// 回放对比时本次决策与录制消息不一致
    ReplayDivergence { expected: String, frame_offset: Option<i64> },
}

impl EventKind {
    /// 录制文件中对应的消息文本
    pub fn message_text(&self) -> Option<&'static str> {
        match self {
            Self::RewardOn => Some("Reward On"),
            Self::RewardOff => Some("Reward Off"),
            Self::Omission => Some("Omission"),
            _ => None,
        }
    }
}

/// 会话事件日志中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub trial: usize,
    pub frame: i64,
    pub kind: EventKind,
}

impl SessionEvent {
    pub fn now(trial: usize, frame: i64, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            trial,
            frame,
            kind,
        }
    }
}
