pub mod config;
pub mod constants;
pub mod error;
pub mod gaze;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod trial;
