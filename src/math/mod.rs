//! Precision-sensitive numeric core: fixed-point scaling and the
//! forward/reverse reward-rate calculators.

pub mod fixed_point;
pub mod reward_rate;

pub use fixed_point::{
    format_units, parse_units, pow10, scale_conversion_rate, scale_conversion_rate_with,
    u256_to_f64, ScaleMethod, WAD_DECIMALS,
};
pub use reward_rate::{apr_from_reward_rate, calculate_reward_rate, SECONDS_PER_YEAR};
