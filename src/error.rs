use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid recording: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("trial {trial} not in recording ({available} trials available)")]
    TrialOutOfRange { trial: usize, available: usize },
    #[error("recorded trial {trial} has no samples")]
    EmptyTrial { trial: usize },
}

/// 试次准备阶段的前置条件错误；逐帧路径不会产生错误
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid experiment config: {0}")]
    InvalidConfig(String),
    #[error("trajectory buffer is empty")]
    EmptyTrajectory,
    #[error("ragged trajectory buffer: frame {frame} has {found} agents, expected {expected}")]
    RaggedTrajectory {
        frame: usize,
        expected: usize,
        found: usize,
    },
    #[error("target agent {agent} missing from trajectory buffer with {agents} agents")]
    MissingTargetAgent { agent: usize, agents: usize },
    #[error("replay-driven trials need a recording")]
    MissingRecording,
    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),
    #[error("gaze source error: {0}")]
    Source(#[from] SourceError),
}
