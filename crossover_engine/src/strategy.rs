/// strategy.rs — Dual Moving-Average Crossover Signal Engine
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// SIMPLE MOVING AVERAGE over the trailing w closes:
///
///   MA_w[i] = (1/w) · Σ_{k=i−w+1..i} close[k]      for i ≥ w−1
///   MA_w[i] = undefined                             for i < w−1
///
/// CROSSOVER at bar i (i ≥ 1), S = short MA, L = long MA:
///
///   Buy   ⇔  S[i] > L[i]  ∧  S[i−1] ≤ L[i−1]
///   Sell  ⇔  S[i] < L[i]  ∧  S[i−1] ≥ L[i−1]
///   Hold  otherwise, and whenever any of the four values is undefined.
///
/// POSITION (forward fill of the last non-Hold signal):
///
///   pos[i] = Long  if the latest Buy/Sell at or before i is Buy
///          = Flat  otherwise (latest is Sell, or none yet)
/// ─────────────────────────────────────────────────────────────────────────

use crate::config::StrategyConfig;
use crate::error::{Result, TraderError};
use crate::models::{Position, PriceSeries, Signal, SignalPoint, SignalSeries};

/// Stateless signal generator; `compute` is a pure function of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEngine {
    short_window: usize,
    long_window:  usize,
}

impl SignalEngine {
    pub fn new(short_window: usize, long_window: usize) -> Result<Self> {
        if short_window == 0 || short_window >= long_window {
            return Err(TraderError::Config(format!(
                "moving-average windows must satisfy 1 <= short < long, got {short_window}/{long_window}"
            )));
        }
        Ok(Self { short_window, long_window })
    }

    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        Self::new(cfg.short_window, cfg.long_window)
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }

    /// Annotate every bar with both averages, its crossover signal and the
    /// resulting position.
    pub fn compute(&self, series: &PriceSeries) -> SignalSeries {
        let closes = series.closes();
        let short = rolling_mean(&closes, self.short_window);
        let long = rolling_mean(&closes, self.long_window);

        let signals: Vec<Signal> = (0..closes.len())
            .map(|i| {
                if i == 0 {
                    Signal::Hold
                } else {
                    detect_crossover(short[i - 1], long[i - 1], short[i], long[i])
                }
            })
            .collect();
        let positions = derive_positions(&signals);

        let points = series
            .bars()
            .iter()
            .enumerate()
            .map(|(i, bar)| SignalPoint {
                date:     bar.date,
                close:    bar.close,
                short_ma: short[i],
                long_ma:  long[i],
                signal:   signals[i],
                position: positions[i],
            })
            .collect();

        SignalSeries { symbol: series.symbol().to_owned(), points }
    }
}

/// Trailing simple mean; `None` until `window` values are available.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                let sum: f64 = values[i + 1 - window..=i].iter().sum();
                Some(sum / window as f64)
            }
        })
        .collect()
}

/// Compare two consecutive (short, long) pairs.
pub fn detect_crossover(
    prev_short: Option<f64>,
    prev_long:  Option<f64>,
    short:      Option<f64>,
    long:       Option<f64>,
) -> Signal {
    let (Some(ps), Some(pl), Some(s), Some(l)) = (prev_short, prev_long, short, long) else {
        return Signal::Hold;
    };
    if s > l && ps <= pl {
        Signal::Buy
    } else if s < l && ps >= pl {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Forward-fill signals into positions. A Sell while Flat changes nothing.
pub fn derive_positions(signals: &[Signal]) -> Vec<Position> {
    let mut current = Position::Flat;
    signals
        .iter()
        .map(|signal| {
            match signal {
                Signal::Buy => current = Position::Long,
                Signal::Sell => current = Position::Flat,
                Signal::Hold => {}
            }
            current
        })
        .collect()
}
