//! Position Sizing
//!
//! Entry size is the fixed snipe amount, capped by the per-position share of
//! the portfolio.

use crate::config::Config;

/// Position Sizer
#[derive(Debug, Clone)]
pub struct PositionSizer {
    fixed_amount: f64,
    max_position_size: f64,
}

impl PositionSizer {
    pub fn new(config: &Config) -> Self {
        Self {
            fixed_amount: config.trading.auto_snipe_amount,
            max_position_size: config.risk.max_position_size(),
        }
    }

    /// Calculate position size in base asset
    pub fn calculate_size(&self) -> f64 {
        self.fixed_amount.min(self.max_position_size).max(0.0)
    }
}
