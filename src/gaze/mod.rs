//! 眼动数据：样本类型、单位换算、在线注视检测、录制文件与数据源

pub mod fixation;
pub mod recording;
pub mod source;
pub mod types;
pub mod units;

pub use fixation::{FixationFilter, FixationParams, FixationState};
pub use recording::{RecordedTrial, Recording};
pub use source::{GazeSource, SourceKind};
pub use types::{FixationReport, GazePoint, GazeSample};
pub use units::{DisplayGeometry, Units};
