/// metrics.rs — Performance Metrics
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// EQUITY CURVE (unit starting capital, strategy returns s_i):
///
///   E_0 = 1,   E_i = E_{i−1} · (1 + s_i)
///
/// SHARPE RATIO (annualised, daily bars)
///
///   SR = mean(s) / std(s) × √252
///
/// MAXIMUM DRAWDOWN
///
///   peak_t = max_{u ≤ t}(E_u)
///   MaxDD  = min_t { (E_t − peak_t) / peak_t }     (≤ 0)
///
/// ROUND TRIPS
///   A trade opens at the close of a Buy bar and closes at the close of the
///   next Sell bar. Its return close[exit]/close[entry] − 1 equals the
///   compounded lagged strategy returns over bars entry+1 ..= exit.
///   A trade still open on the last bar is marked to the last close.
/// ─────────────────────────────────────────────────────────────────────────

use chrono::NaiveDate;

use crate::backtest::BacktestResult;
use crate::models::{Position, SignalSeries};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_date:  NaiveDate,
    pub entry_price: f64,
    pub exit_date:   NaiveDate,
    pub exit_price:  f64,
    /// Still held on the last bar; exit fields are the mark
    pub open:        bool,
}

impl Trade {
    pub fn return_frac(&self) -> f64 {
        self.exit_price / self.entry_price - 1.0
    }
}

/// Complete backtest performance report.
#[derive(Debug, Clone)]
pub struct PerfReport {
    pub n_bars:       usize,
    pub n_trades:     usize,
    pub win_rate:     f64,
    pub avg_trade:    f64, // fraction
    pub exposure:     f64, // fraction of bars holding
    pub total_return: f64, // fraction
    pub sharpe:       f64,
    pub max_drawdown: f64, // fraction (negative)
}

impl std::fmt::Display for PerfReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  Bars           : {}", self.n_bars)?;
        writeln!(f, "  Trades         : {}", self.n_trades)?;
        writeln!(f, "  Win Rate       : {:.2}%", self.win_rate * 100.0)?;
        writeln!(f, "  Avg Trade      : {:.4}%", self.avg_trade * 100.0)?;
        writeln!(f, "  Exposure       : {:.2}%", self.exposure * 100.0)?;
        writeln!(f, "  Total Return   : {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "  Sharpe Ratio   : {:.3}", self.sharpe)?;
        write!(f, "  Max Drawdown   : {:.2}%", self.max_drawdown * 100.0)
    }
}

/// Pair Buy/Sell transitions of the position series into round trips.
pub fn extract_trades(series: &SignalSeries) -> Vec<Trade> {
    let mut trades = Vec::new();
    let mut entry: Option<(NaiveDate, f64)> = None;
    let mut prev = Position::Flat;

    for point in &series.points {
        match (prev, point.position) {
            (Position::Flat, Position::Long) => entry = Some((point.date, point.close)),
            (Position::Long, Position::Flat) => {
                if let Some((entry_date, entry_price)) = entry.take() {
                    trades.push(Trade {
                        entry_date,
                        entry_price,
                        exit_date: point.date,
                        exit_price: point.close,
                        open: false,
                    });
                }
            }
            _ => {}
        }
        prev = point.position;
    }

    if let (Some((entry_date, entry_price)), Some(last)) = (entry, series.latest()) {
        trades.push(Trade {
            entry_date,
            entry_price,
            exit_date: last.date,
            exit_price: last.close,
            open: true,
        });
    }
    trades
}

/// Compute summary metrics for an evaluated signal series.
pub fn compute_metrics(series: &SignalSeries, result: &BacktestResult) -> PerfReport {
    let trades = extract_trades(series);
    let trade_returns: Vec<f64> = trades.iter().map(Trade::return_frac).collect();
    let winners = trade_returns.iter().filter(|&&r| r > 0.0).count();

    let returns: Vec<f64> = result.strategy_returns.iter().flatten().copied().collect();
    let holding = series
        .points
        .iter()
        .take(series.len().saturating_sub(1))
        .filter(|p| p.position == Position::Long)
        .count();

    // ── Sharpe Ratio ──────────────────────────────────────────────────────
    let sharpe = match mean_and_sample_std(&returns) {
        Some((m, sd)) if sd > 1e-12 => m / sd * TRADING_DAYS_PER_YEAR.sqrt(),
        _ => 0.0,
    };

    PerfReport {
        n_bars:       series.len(),
        n_trades:     trades.len(),
        win_rate:     if trades.is_empty() { 0.0 } else { winners as f64 / trades.len() as f64 },
        avg_trade:    mean_and_sample_std(&trade_returns).map_or(0.0, |(m, _)| m),
        exposure:     if returns.is_empty() { 0.0 } else { holding as f64 / returns.len() as f64 },
        total_return: result.total_return,
        sharpe,
        max_drawdown: max_drawdown(&result.equity_curve()),
    }
}

/// Deepest peak-to-trough fall of a compounded equity curve, as a
/// non-positive fraction of the running peak (−0.15 = −15%).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    equity_curve
        .iter()
        .scan(f64::NEG_INFINITY, |peak, &equity| {
            *peak = peak.max(equity);
            Some(equity / *peak - 1.0)
        })
        .fold(0.0, f64::min)
}

/// Mean and sample standard deviation (n − 1); `None` for an empty slice.
/// A single value has zero spread.
fn mean_and_sample_std(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return Some((mean, 0.0));
    }
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some((mean, (ss / (n - 1) as f64).sqrt()))
}
