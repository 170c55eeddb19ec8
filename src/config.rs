use std::env;
use std::str::FromStr;

use crate::gaze::source::SourceKind;
use crate::gaze::units::Units;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub source: SourceKind,
    pub recording_path: Option<String>,
    pub trajectory_path: Option<String>,
    pub summary_path: Option<String>,
    pub subject_id: u32,
    pub block: u32,
    pub trials: usize,
    pub realtime: bool,
    pub replay_lag_ms: f64,
    pub simulation: SimulationEnvConfig,
    pub experiment: ExperimentEnvConfig,
}

#[derive(Debug, Clone)]
pub struct SimulationEnvConfig {
    pub noise_deg: f64,
    pub dropout_probability: f64,
    pub hold_ms: f64,
    pub seed: Option<u64>,
}

/// 实验参数的环境变量覆盖；未设置的项沿用配置文件或默认值
#[derive(Debug, Clone, Default)]
pub struct ExperimentEnvConfig {
    pub config_path: Option<String>,
    pub theta: Option<f64>,
    pub velocity_threshold: Option<f64>,
    pub min_duration_secs: Option<f64>,
    pub refresh_rate_hz: Option<f64>,
    pub tracker_rate_hz: Option<f64>,
    pub criterion_secs: Option<f64>,
    pub fix_radius_deg: Option<f64>,
    pub sac_to_reward_easy: Option<u32>,
    pub sac_to_reward_difficult: Option<u32>,
    pub max_sac_per_pursuit: Option<u32>,
    pub blink_tolerance_secs: Option<f64>,
    pub reward_duration_secs: Option<f64>,
    pub max_nr_rewards: Option<u32>,
    pub init_block_secs: Option<f64>,
    pub data_lag_frames: Option<i64>,
    pub max_fix_interval_secs: Option<f64>,
    pub max_trial_secs: Option<f64>,
    pub units: Option<Units>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            source: env_source("GAZE_SOURCE", SourceKind::Live),
            recording_path: env_opt("RECORDING_PATH"),
            trajectory_path: env_opt("TRAJECTORY_PATH"),
            summary_path: env_opt("SUMMARY_PATH"),
            subject_id: env_or_parse("SUBJECT_ID", 0_u32),
            block: env_or_parse("BLOCK", 0_u32),
            trials: env_or_parse("TRIALS", 3_usize),
            realtime: env_or_bool("REALTIME", true),
            replay_lag_ms: env_or_parse("REPLAY_LAG_MS", 0.0_f64),
            simulation: SimulationEnvConfig {
                noise_deg: env_or_parse("SIM_NOISE_DEG", 0.05_f64),
                dropout_probability: env_or_parse("SIM_DROPOUT_PROBABILITY", 0.02_f64),
                hold_ms: env_or_parse("SIM_HOLD_MS", 250.0_f64),
                seed: env_opt_parse("SIM_SEED"),
            },
            experiment: ExperimentEnvConfig {
                config_path: env_opt("EXPERIMENT_CONFIG_PATH"),
                theta: env_opt_parse("THETA"),
                velocity_threshold: env_opt_parse("FIXVTH"),
                min_duration_secs: env_opt_parse("FIXMINDUR"),
                refresh_rate_hz: env_opt_parse("REFRESH_RATE_HZ"),
                tracker_rate_hz: env_opt_parse("TRACKER_RATE_HZ"),
                criterion_secs: env_opt_parse("CRITERION_SECS"),
                fix_radius_deg: env_opt_parse("FIX_RADIUS_DEG"),
                sac_to_reward_easy: env_opt_parse("SAC_TO_REWARD_EASY"),
                sac_to_reward_difficult: env_opt_parse("SAC_TO_REWARD_DIFFICULT"),
                max_sac_per_pursuit: env_opt_parse("MAX_SAC_PER_PURSUIT"),
                blink_tolerance_secs: env_opt_parse("BLINK_TOLERANCE_SECS"),
                reward_duration_secs: env_opt_parse("REWARD_DURATION_SECS"),
                max_nr_rewards: env_opt_parse("MAX_NR_REWARDS"),
                init_block_secs: env_opt_parse("INIT_BLOCK_SECS"),
                data_lag_frames: env_opt_parse("DATA_LAG_FRAMES"),
                max_fix_interval_secs: env_opt_parse("MAX_FIX_INTERVAL_SECS"),
                max_trial_secs: env_opt_parse("MAX_TRIAL_SECS"),
                units: env_units("GAZE_UNITS"),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    env_opt_parse(key).unwrap_or(default)
}

/// 未设置返回 None；无法解析时告警并返回 None
pub fn env_opt_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Failed to parse env var, using default");
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_source(key: &str, default: SourceKind) -> SourceKind {
    match env::var(key) {
        Ok(raw) => SourceKind::parse(&raw).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "Unknown gaze source, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_units(key: &str) -> Option<Units> {
    let raw = env::var(key).ok()?;
    let units = Units::parse(&raw);
    if units.is_none() {
        tracing::warn!(key, value = %raw, "Unknown units, using default");
    }
    units
}
