//! Match timing and sync tuning defaults.

/// Seconds a combat turn lasts before it is force-ended.
pub const DEFAULT_TURN_DURATION_SECS: u32 = 180;

/// Clock tick period (seconds).
pub const CLOCK_TICK_SECS: u64 = 1;

// --- Reconnection ---

/// First retry delay; doubled on every failed attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Retries before reconnection is abandoned and reported.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

// --- Orders ---

/// Fallback speed for units when estimating move duration (m/s).
pub const DEFAULT_UNIT_SPEED_MPS: f64 = 10.0;

/// Fixed duration of attack, defend and recon orders (seconds).
pub const ACTION_ORDER_DURATION_SECS: f64 = 30.0;

/// Wall-clock seconds per simulated order second during execution.
/// 0.0 executes instantly.
pub const DEFAULT_EXECUTION_TIME_SCALE: f64 = 0.0;
