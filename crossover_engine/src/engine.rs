/// engine.rs — Live Trading Loop
///
/// One iteration (`LiveTrader::tick`):
///
///   clock closed? ──yes──▶ MarketClosed                      (sleep closed_market_wait)
///        │ no
///        ▼
///   fetch lookback_days of daily bars → SignalEngine::compute
///        │
///        ▼
///   latest signal / close, account equity
///        │
///        ├─ Long ∧ close ≤ entry·(1 − stop)   ─▶ SELL all  → StoppedOut
///        ├─ Buy  ∧ Flat ∧ qty > 0             ─▶ BUY qty   → Entered
///        ├─ Sell ∧ Long                        ─▶ SELL all  → Exited
///        └─ otherwise                          ─▶ Idle
///                                                           (sleep poll_interval)
///
/// Errors end the iteration early.  `run` logs Continue errors and sleeps
/// `error_cooldown`; Fatal errors end the loop.  LiveState changes only after
/// the broker has accepted the order.

use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{LiveSchedule, StrategyConfig};
use crate::data::MarketData;
use crate::error::{Disposition, Result, TraderError};
use crate::live::Broker;
use crate::models::{OrderRequest, Side, Signal};
use crate::risk::RiskManager;
use crate::strategy::SignalEngine;

/// Holdings the loop believes it has. Flat is `quantity == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveState {
    pub quantity:    u64,
    pub entry_price: f64,
}

impl LiveState {
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    fn open(&mut self, quantity: u64, entry_price: f64) {
        self.quantity = quantity;
        self.entry_price = entry_price;
    }

    fn close(&mut self) {
        *self = Self::default();
    }
}

/// What a successful iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    MarketClosed,
    StoppedOut { quantity: u64, price: f64 },
    Entered { quantity: u64, price: f64 },
    Exited { quantity: u64, price: f64 },
    Idle { signal: Signal },
}

impl IterationOutcome {
    pub fn pause(&self, schedule: &LiveSchedule) -> Duration {
        match self {
            IterationOutcome::MarketClosed => schedule.closed_market_wait,
            _ => schedule.poll_interval,
        }
    }
}

pub struct LiveTrader<M, B> {
    strategy:    StrategyConfig,
    schedule:    LiveSchedule,
    signals:     SignalEngine,
    risk:        RiskManager,
    market_data: M,
    broker:      B,
    state:       LiveState,
}

impl<M: MarketData, B: Broker> LiveTrader<M, B> {
    pub fn new(strategy: StrategyConfig, schedule: LiveSchedule, market_data: M, broker: B) -> Result<Self> {
        strategy.validate()?;
        let signals = SignalEngine::from_config(&strategy)?;
        let risk = RiskManager::from_config(&strategy);

        if schedule.expected_trading_bars() <= signals.long_window() {
            warn!(
                "Lookback of {} calendar days holds ~{} trading bars; a {}-bar long average needs more to ever cross",
                schedule.lookback_days,
                schedule.expected_trading_bars(),
                signals.long_window()
            );
        }

        Ok(Self {
            strategy,
            schedule,
            signals,
            risk,
            market_data,
            broker,
            state: LiveState::default(),
        })
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn market_data(&self) -> &M {
        &self.market_data
    }

    /// Run one iteration using today's UTC date as the end of the lookback.
    pub async fn tick(&mut self) -> Result<IterationOutcome> {
        self.tick_on(Utc::now().date_naive()).await
    }

    pub async fn tick_on(&mut self, today: NaiveDate) -> Result<IterationOutcome> {
        if !self.broker.is_market_open().await? {
            info!("Market is closed. Waiting for market to open...");
            return Ok(IterationOutcome::MarketClosed);
        }

        let symbol = self.strategy.symbol.as_str();
        let start = today - chrono::Duration::days(self.schedule.lookback_days);
        let prices = self.market_data.fetch(symbol, start, today).await?;
        let series = self.signals.compute(&prices);
        let latest = series.latest().ok_or_else(|| {
            TraderError::Computation(format!("{symbol}: no bars between {start} and {today}"))
        })?;
        let (signal, latest_price) = (latest.signal, latest.close);

        let equity = self.broker.account_equity().await?;
        debug!(
            "{symbol}: close={latest_price:.2} short_ma={:?} long_ma={:?} signal={signal:?} equity={equity:.2}",
            latest.short_ma, latest.long_ma
        );

        // ── Stop-loss (before any signal rule) ───────────────────────────
        if self.state.is_long() && self.risk.stop_loss_triggered(self.state.entry_price, latest_price) {
            let quantity = self.state.quantity;
            info!(
                "Stop-loss triggered at {latest_price:.2} (entry {:.2}). Selling {quantity} {symbol}.",
                self.state.entry_price
            );
            self.broker
                .submit_market_order(&OrderRequest::market(symbol, quantity, Side::Sell))
                .await?;
            self.state.close();
            return Ok(IterationOutcome::StoppedOut { quantity, price: latest_price });
        }

        // ── Entry ─────────────────────────────────────────────────────────
        if signal == Signal::Buy && !self.state.is_long() {
            let sizing_price = if self.schedule.size_with_live_quote {
                self.broker.latest_close(symbol).await?
            } else {
                latest_price
            };
            let quantity = self.risk.position_size(equity, sizing_price);
            if quantity == 0 {
                warn!("Buy signal but equity {equity:.2} affords no whole share at {sizing_price:.2}");
                return Ok(IterationOutcome::Idle { signal });
            }
            self.broker
                .submit_market_order(&OrderRequest::market(symbol, quantity, Side::Buy))
                .await?;
            self.state.open(quantity, latest_price);
            info!("Bought {quantity} shares of {symbol} at {latest_price:.2}");
            return Ok(IterationOutcome::Entered { quantity, price: latest_price });
        }

        // ── Exit ──────────────────────────────────────────────────────────
        if signal == Signal::Sell && self.state.is_long() {
            let quantity = self.state.quantity;
            self.broker
                .submit_market_order(&OrderRequest::market(symbol, quantity, Side::Sell))
                .await?;
            self.state.close();
            info!("Sold {quantity} shares of {symbol} at {latest_price:.2}");
            return Ok(IterationOutcome::Exited { quantity, price: latest_price });
        }

        Ok(IterationOutcome::Idle { signal })
    }

    /// Poll forever until `shutdown` resolves or a fatal error occurs.
    ///
    /// Shutdown is only observed while sleeping, so an iteration that has
    /// submitted an order always records it before the loop exits.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Starting live trading: {} SMA {}/{} size={:.0}% stop={:.1}%",
            self.strategy.symbol,
            self.strategy.short_window,
            self.strategy.long_window,
            self.strategy.position_size * 100.0,
            self.strategy.stop_loss_pct * 100.0
        );

        loop {
            let pause = match self.tick().await {
                Ok(outcome) => {
                    debug!("Iteration outcome: {outcome:?}");
                    outcome.pause(&self.schedule)
                }
                Err(e) => match e.disposition() {
                    Disposition::Fatal => {
                        error!("Fatal error in live trading: {e}");
                        return Err(e);
                    }
                    Disposition::Continue => {
                        error!("Error in live trading: {e}");
                        self.schedule.error_cooldown
                    }
                },
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Shutdown requested; stopping live trading (holding {} {})",
                        self.state.quantity, self.strategy.symbol
                    );
                    return Ok(());
                }
                _ = sleep(pause) => {}
            }
        }
    }
}
