use tracing::debug;

use crate::config::StrategyConfig;

/// Fixed-fraction sizing and fixed-percentage stop-loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskManager {
    pub position_fraction: f64, // e.g., 0.1 (10% of equity)
    pub stop_loss_pct:     f64, // e.g., 0.05 (5% below entry)
}

impl RiskManager {
    pub fn new(position_fraction: f64, stop_loss_pct: f64) -> Self {
        Self { position_fraction, stop_loss_pct }
    }

    pub fn from_config(cfg: &StrategyConfig) -> Self {
        Self::new(cfg.position_size, cfg.stop_loss_pct)
    }

    /// Whole shares affordable with `position_fraction` of equity.
    pub fn position_size(&self, equity: f64, price: f64) -> u64 {
        if !(equity.is_finite() && price.is_finite()) || equity <= 0.0 || price <= 0.0 {
            return 0;
        }
        let shares = (equity * self.position_fraction / price).floor();
        debug!("Sizing: equity={equity:.2} fraction={} price={price:.2} → {shares}", self.position_fraction);
        shares as u64
    }

    pub fn stop_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    /// True when the latest price is at or below the stop.
    pub fn stop_loss_triggered(&self, entry_price: f64, latest_price: f64) -> bool {
        latest_price <= self.stop_price(entry_price)
    }
}
