/// backtest.rs — Vectorised Crossover Backtest
///
/// ARCHITECTURE
/// ┌─────────────────────────────────────────────────────┐
/// │  MarketData::fetch(symbol, start, end)              │
/// │        │                                            │
/// │        ▼                                            │
/// │  SignalEngine::compute → SignalSeries               │
/// │        │                                            │
/// │        ▼                                            │
/// │  evaluate()                                         │
/// │   ├─ r[i] = close[i]/close[i−1] − 1                 │
/// │   ├─ s[i] = exposure(pos[i−1]) · r[i]   (1-bar lag) │
/// │   └─ total = Π(1 + s[i]) − 1                        │
/// │        │                                            │
/// │        ▼                                            │
/// │  compute_metrics → PerfReport                       │
/// └─────────────────────────────────────────────────────┘
///
/// A position entered on bar i earns only from bar i+1 on, modelling an order
/// placed on the signal bar's close and filled for the next bar.

use chrono::NaiveDate;
use tracing::info;

use crate::config::StrategyConfig;
use crate::data::MarketData;
use crate::error::{Result, TraderError};
use crate::metrics::{compute_metrics, PerfReport};
use crate::models::SignalSeries;
use crate::strategy::SignalEngine;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// Close-to-close return; `None` on the first bar
    pub period_returns:   Vec<Option<f64>>,
    /// Lagged strategy return; `None` on the first bar
    pub strategy_returns: Vec<Option<f64>>,
    pub total_return:     f64,
}

impl BacktestResult {
    /// Growth of one unit of capital, one value per bar.
    pub fn equity_curve(&self) -> Vec<f64> {
        let mut equity = 1.0;
        self.strategy_returns
            .iter()
            .map(|r| {
                equity *= 1.0 + r.unwrap_or(0.0);
                equity
            })
            .collect()
    }
}

/// Compute lagged strategy returns for an annotated series.
pub fn evaluate(series: &SignalSeries) -> Result<BacktestResult> {
    if series.is_empty() {
        return Err(TraderError::Computation(format!(
            "{}: cannot backtest an empty series",
            series.symbol
        )));
    }

    let points = &series.points;
    let mut period_returns = Vec::with_capacity(points.len());
    let mut strategy_returns = Vec::with_capacity(points.len());
    period_returns.push(None);
    strategy_returns.push(None);

    for pair in points.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let r = (cur.close - prev.close) / prev.close;
        period_returns.push(Some(r));
        strategy_returns.push(Some(prev.position.exposure() * r));
    }

    let total_return = strategy_returns
        .iter()
        .map(|r| 1.0 + r.unwrap_or(0.0))
        .product::<f64>()
        - 1.0;

    Ok(BacktestResult { period_returns, strategy_returns, total_return })
}

/// Everything a one-shot backtest produced.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub symbol:  String,
    pub start:   NaiveDate,
    pub end:     NaiveDate,
    pub signals: SignalSeries,
    pub result:  BacktestResult,
    pub perf:    PerfReport,
}

impl std::fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  MA CROSSOVER — BACKTEST {} {} → {}", self.symbol, self.start, self.end)?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "{}", self.perf)?;
        writeln!(f, "════════════════════════════════════════════")?;
        write!(f, "Backtest Total Return: {:.2}%", self.result.total_return * 100.0)
    }
}

/// Fetch history, generate signals and evaluate them once.
pub async fn run_backtest<M: MarketData>(
    market_data: &M,
    cfg:         &StrategyConfig,
    start:       NaiveDate,
    end:         NaiveDate,
) -> Result<BacktestReport> {
    let engine = SignalEngine::from_config(cfg)?;

    info!("Fetching data for {} from {} to {}", cfg.symbol, start, end);
    let prices = market_data.fetch(&cfg.symbol, start, end).await?;
    if prices.len() < engine.long_window() {
        info!(
            "Only {} bars for a {}-bar long window; no crossover can fire",
            prices.len(),
            engine.long_window()
        );
    }

    let signals = engine.compute(&prices);
    let result = evaluate(&signals)?;
    let perf = compute_metrics(&signals, &result);

    info!("Backtest Total Return: {:.2}%", result.total_return * 100.0);

    Ok(BacktestReport {
        symbol: cfg.symbol.clone(),
        start,
        end,
        signals,
        result,
        perf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, Signal, SignalPoint};

    fn series(closes: &[f64], positions: &[Position]) -> SignalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = closes
            .iter()
            .zip(positions)
            .enumerate()
            .map(|(i, (&close, &position))| SignalPoint {
                date: start + chrono::Duration::days(i as i64),
                close,
                short_ma: None,
                long_ma: None,
                signal: Signal::Hold,
                position,
            })
            .collect();
        SignalSeries { symbol: "TEST".into(), points }
    }

    #[test]
    fn flat_strategy_returns_exactly_zero() {
        let s = series(&[10.0, 12.0, 9.0, 15.0], &[Position::Flat; 4]);
        let result = evaluate(&s).unwrap();
        assert_eq!(result.total_return, 0.0);
        assert_eq!(result.period_returns[0], None);
        assert_eq!(result.strategy_returns[0], None);
    }

    #[test]
    fn returns_lag_the_position_by_one_bar() {
        use Position::*;
        // Buy at k = 2.
        let closes = [100.0, 100.0, 110.0, 121.0, 133.1];
        let s = series(&closes, &[Flat, Flat, Long, Long, Long]);
        let result = evaluate(&s).unwrap();

        assert_eq!(result.strategy_returns[2], Some(0.0));
        let r3 = result.period_returns[3].unwrap();
        assert!((r3 - 0.1).abs() < 1e-12);
        assert_eq!(result.strategy_returns[3], Some(r3));
        assert!((result.total_return - (133.1 / 110.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn sell_bar_still_earns_its_return() {
        use Position::*;
        let s = series(&[10.0, 10.0, 12.0, 6.0], &[Flat, Long, Flat, Flat]);
        let result = evaluate(&s).unwrap();
        // Long on bar 1 earns bar 2; Flat on bar 2 skips the crash on bar 3.
        assert!((result.total_return - 0.2).abs() < 1e-12);
    }

    #[test]
    fn single_bar_has_zero_return() {
        let s = series(&[10.0], &[Position::Flat]);
        assert_eq!(evaluate(&s).unwrap().total_return, 0.0);
    }

    #[test]
    fn empty_series_is_a_computation_error() {
        let s = SignalSeries { symbol: "TEST".into(), points: vec![] };
        assert!(matches!(evaluate(&s), Err(TraderError::Computation(_))));
    }

    #[test]
    fn equity_curve_compounds() {
        let result = BacktestResult {
            period_returns:   vec![None, Some(0.1), Some(-0.5)],
            strategy_returns: vec![None, Some(0.1), Some(-0.5)],
            total_return:     -0.45,
        };
        let curve = result.equity_curve();
        assert_eq!(curve[0], 1.0);
        assert!((curve[1] - 1.1).abs() < 1e-12);
        assert!((curve[2] - 0.55).abs() < 1e-12);
    }
}
