//! 试次控制：实验参数、轨迹缓冲区、逐帧状态机与试次行为

pub mod behavior;
pub mod config;
pub mod controller;
pub mod event;
pub mod reward;
pub mod state;
pub mod trajectory;

pub use behavior::{BehaviorKind, TrialBehavior};
pub use config::{ExperimentConfig, FrameThresholds};
pub use controller::{FrameDecision, GazeContingentController};
pub use event::{EventKind, SessionEvent};
pub use state::{GazeStatus, Phase, TrialControlState};
pub use trajectory::AgentTrajectories;
