/// models.rs — Domain types shared by the signal engine, backtest and live loop

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

// ── Price data ────────────────────────────────────────────────────────────

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date:   NaiveDate,
    pub open:   f64,
    pub high:   f64,
    pub low:    f64,
    pub close:  f64,
    pub volume: u64,
}

/// Daily bars for one symbol, strictly ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars:   Vec<PriceBar>,
}

impl PriceSeries {
    /// Validates that dates are strictly increasing and closes are positive.
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self> {
        let symbol = symbol.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(TraderError::Computation(format!(
                    "{symbol}: bar dates not strictly increasing ({} then {})",
                    pair[0].date, pair[1].date
                )));
            }
        }
        if let Some(bad) = bars.iter().find(|b| !(b.close.is_finite() && b.close > 0.0)) {
            return Err(TraderError::Computation(format!(
                "{symbol}: invalid close {} on {}",
                bad.close, bad.date
            )));
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

// ── Signals & positions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Position {
    Flat,
    Long,
}

impl Position {
    /// Market exposure used by the return calculation (Long = 1, Flat = 0).
    pub fn exposure(self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long => 1.0,
        }
    }
}

/// Per-bar output of the signal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub date:     NaiveDate,
    pub close:    f64,
    pub short_ma: Option<f64>,
    pub long_ma:  Option<f64>,
    pub signal:   Signal,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    pub symbol: String,
    pub points: Vec<SignalPoint>,
}

impl SignalSeries {
    pub fn latest(&self) -> Option<&SignalPoint> {
        self.points.last()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.points.iter().map(|p| p.signal).collect()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.points.iter().map(|p| p.position).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ── Orders ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    #[serde(rename = "gtc")]
    GoodTillCancelled,
}

/// A whole-share market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol:        String,
    pub qty:           u64,
    pub side:          Side,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn market(symbol: &str, qty: u64, side: Side) -> Self {
        Self {
            symbol: symbol.to_owned(),
            qty,
            side,
            time_in_force: TimeInForce::GoodTillCancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHandle {
    pub id:     String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn accepts_gaps_between_trading_days() {
        let series = PriceSeries::new("TSLA", vec![bar(1, 10.0), bar(4, 11.0), bar(5, 12.0)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = PriceSeries::new("TSLA", vec![bar(1, 10.0), bar(1, 11.0)]).unwrap_err();
        assert!(matches!(err, TraderError::Computation(_)));
    }

    #[test]
    fn rejects_descending_dates() {
        assert!(PriceSeries::new("TSLA", vec![bar(5, 10.0), bar(4, 11.0)]).is_err());
    }

    #[test]
    fn rejects_non_positive_close() {
        assert!(PriceSeries::new("TSLA", vec![bar(1, 10.0), bar(2, 0.0)]).is_err());
        assert!(PriceSeries::new("TSLA", vec![bar(1, f64::NAN)]).is_err());
    }

    #[test]
    fn order_wire_names() {
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
        assert_eq!(
            serde_json::to_string(&TimeInForce::GoodTillCancelled).unwrap(),
            "\"gtc\""
        );
    }
}
