use crate::jobs::model::Step;

/// Per-step backoff curve: `ceil(base + ((n - 1) * multiplier) ^ exponent)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub base: f64,
    pub multiplier: f64,
    pub exponent: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: 1.0,
            multiplier: 1.0,
            exponent: 1.0,
        }
    }
}

impl RetryConfig {
    /// Step overrides on top of the defaults.
    pub fn for_step(step: Option<&Step>) -> Self {
        let d = Self::default();
        match step {
            None => d,
            Some(s) => Self {
                base: s.retry_base.unwrap_or(d.base),
                multiplier: s.retry_multiplier.unwrap_or(d.multiplier),
                exponent: s.retry_exponent.unwrap_or(d.exponent),
            },
        }
    }
}

/// Seconds to keep a failed message hidden before the queue redelivers it.
/// `receive_count` is 1 on first delivery. Never negative, never above `cap`.
pub fn backoff_seconds(receive_count: i64, cfg: &RetryConfig, cap: i64) -> i64 {
    let n = receive_count.max(1) as f64;

    let grown = ((n - 1.0) * cfg.multiplier).powf(cfg.exponent);
    let delay = (cfg.base + grown).ceil();

    // NaN (negative base to a fractional power) falls back to no delay.
    if !delay.is_finite() {
        return if delay.is_nan() { 0 } else { cap.max(0) };
    }

    (delay as i64).clamp(0, cap.max(0))
}
