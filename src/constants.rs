/// 指数平滑 AR(1) 滤波系数 THETA
pub const DEFAULT_THETA: f64 = 0.6;

/// 注视速度上限（度/秒），超过即判定为扫视
pub const DEFAULT_FIXATION_VELOCITY_THRESHOLD: f64 = 18.0;

/// 最短注视时长（秒）
pub const DEFAULT_FIXATION_MIN_DURATION_SECS: f64 = 0.1;

/// 扫视后参与注视中心估计的前导样本数，中心 = 累加和 / 该常数
pub const FIXATION_WINDOW_SAMPLES: u32 = 5;

/// 默认显示刷新率（Hz）
pub const DEFAULT_REFRESH_RATE_HZ: f64 = 75.0;

/// 默认眼动仪采样率（Hz）
pub const DEFAULT_TRACKER_RATE_HZ: f64 = 60.0;

/// 回放试次的最长时长（秒）
pub const DEFAULT_MAX_TRIAL_SECS: f64 = 120.0;

/// Tobii 有效性代码：4 表示未检测到该眼
pub const TRACKER_VALIDITY_NOT_FOUND: u8 = 4;

/// 像素到厘米的换算（显示器默认点距）
pub const DEFAULT_CM_PER_PIXEL: f64 = 0.0265625;

/// 视角 1 度对应的 tan 值，deg -> cm 换算时使用
pub const TAN_ONE_DEGREE: f64 = 0.017455;

/// 实时眼动数据通道容量
pub const TRACKER_CHANNEL_CAPACITY: usize = 1024;

/// 回放比对时允许的奖励事件帧误差
pub const DEFAULT_REPLAY_TOLERANCE_FRAMES: i64 = 2;
