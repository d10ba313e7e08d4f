/// config.rs — Centralised configuration loaded from .env
///
/// All parameters consumed by the crossover engine are defined here.
/// Loading happens once at startup; components receive the section they need
/// (`StrategyConfig`, `LiveSchedule`, `BrokerCredentials`) at construction.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TraderError};

pub const DEFAULT_SYMBOL:        &str = "TSLA";
pub const DEFAULT_SHORT_MA:      usize = 20;
pub const DEFAULT_LONG_MA:       usize = 50;
pub const DEFAULT_POSITION_SIZE: f64 = 0.10; // 10% of equity per entry
pub const DEFAULT_STOP_LOSS_PCT: f64 = 0.05; // exit 5% below entry

pub const DEFAULT_YAHOO_CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_ALPACA_DATA_URL: &str = "https://data.alpaca.markets";
pub const DEFAULT_LOG_FILE:        &str = "trading_log.log";

// ── Strategy ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub symbol:        String,
    /// Short moving-average window (bars)
    pub short_window:  usize,
    /// Long moving-average window (bars)
    pub long_window:   usize,
    /// Fraction of account equity committed per entry
    pub position_size: f64,
    /// Stop distance below entry price, as a fraction
    pub stop_loss_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol:        DEFAULT_SYMBOL.into(),
            short_window:  DEFAULT_SHORT_MA,
            long_window:   DEFAULT_LONG_MA,
            position_size: DEFAULT_POSITION_SIZE,
            stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(TraderError::Config("SYMBOL must not be empty".into()));
        }
        if self.short_window == 0 {
            return Err(TraderError::Config("SHORT_MA must be >= 1".into()));
        }
        if self.short_window >= self.long_window {
            return Err(TraderError::Config(format!(
                "SHORT_MA ({}) must be smaller than LONG_MA ({})",
                self.short_window, self.long_window
            )));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(TraderError::Config(format!(
                "POSITION_SIZE must be in (0, 1], got {}",
                self.position_size
            )));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(TraderError::Config(format!(
                "STOP_LOSS_PCT must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        Ok(())
    }
}

// ── Live loop cadence ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSchedule {
    /// Calendar days of daily bars fetched per iteration
    pub lookback_days:        i64,
    /// Pause after a normal iteration
    pub poll_interval:        Duration,
    /// Pause when the market is closed
    pub closed_market_wait:   Duration,
    /// Pause after a recoverable iteration error
    pub error_cooldown:       Duration,
    /// Size entries from the broker's latest close instead of the series close
    pub size_with_live_quote: bool,
}

impl Default for LiveSchedule {
    fn default() -> Self {
        Self {
            lookback_days:        60,
            poll_interval:        Duration::from_secs(60),
            closed_market_wait:   Duration::from_secs(3600),
            error_cooldown:       Duration::from_secs(60),
            size_with_live_quote: false,
        }
    }
}

impl LiveSchedule {
    /// Rough count of trading bars in the lookback (weekends removed).
    pub fn expected_trading_bars(&self) -> usize {
        (self.lookback_days.max(0) as usize * 5) / 7
    }
}

// ── Broker credentials ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BrokerCredentials {
    pub api_key:    String,
    pub api_secret: String,
    /// Trading API base, e.g. https://paper-api.alpaca.markets
    pub base_url:   String,
    /// Market-data API base
    pub data_url:   String,
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("base_url", &self.base_url)
            .field("data_url", &self.data_url)
            .finish()
    }
}

impl BrokerCredentials {
    /// Read `API_KEY`, `API_SECRET` and `BASE_URL` (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or(TraderError::MissingEnv(key))
        };

        Ok(Self {
            api_key:    required("API_KEY")?,
            api_secret: required("API_SECRET")?,
            base_url:   required("BASE_URL")?.trim_end_matches('/').to_owned(),
            data_url:   lookup("DATA_URL")
                .unwrap_or_else(|| DEFAULT_ALPACA_DATA_URL.into())
                .trim_end_matches('/')
                .to_owned(),
        })
    }
}

// ── Application config ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub strategy:        StrategyConfig,
    pub schedule:        LiveSchedule,
    /// Calendar days of history used by the one-shot backtest
    pub backtest_days:   i64,
    pub yahoo_chart_url: String,
    /// `None` means log to stdout
    pub log_file:        Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strategy = StrategyConfig {
            symbol: lookup("SYMBOL")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_SYMBOL.into()),
            short_window:  parse_env(&lookup, "SHORT_MA", DEFAULT_SHORT_MA)?,
            long_window:   parse_env(&lookup, "LONG_MA", DEFAULT_LONG_MA)?,
            position_size: parse_env(&lookup, "POSITION_SIZE", DEFAULT_POSITION_SIZE)?,
            stop_loss_pct: parse_env(&lookup, "STOP_LOSS_PCT", DEFAULT_STOP_LOSS_PCT)?,
        };
        strategy.validate()?;

        let defaults = LiveSchedule::default();
        let schedule = LiveSchedule {
            lookback_days: parse_env(&lookup, "LIVE_LOOKBACK_DAYS", defaults.lookback_days)?,
            poll_interval: secs(&lookup, "POLL_SECS", defaults.poll_interval)?,
            closed_market_wait: secs(&lookup, "MARKET_CLOSED_WAIT_SECS", defaults.closed_market_wait)?,
            error_cooldown: secs(&lookup, "ERROR_COOLDOWN_SECS", defaults.error_cooldown)?,
            size_with_live_quote: parse_env(&lookup, "SIZE_WITH_LIVE_QUOTE", false)?,
        };
        if schedule.lookback_days <= 0 {
            return Err(TraderError::Config("LIVE_LOOKBACK_DAYS must be positive".into()));
        }

        let backtest_days = parse_env(&lookup, "BACKTEST_DAYS", 365i64)?;
        if backtest_days <= 0 {
            return Err(TraderError::Config("BACKTEST_DAYS must be positive".into()));
        }

        let log_file = match lookup("LOG_FILE") {
            Some(v) if v.trim() == "-" => None,
            Some(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
            _ => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        };

        Ok(Self {
            strategy,
            schedule,
            backtest_days,
            yahoo_chart_url: lookup("YAHOO_CHART_URL")
                .unwrap_or_else(|| DEFAULT_YAHOO_CHART_URL.into())
                .trim_end_matches('/')
                .to_owned(),
            log_file,
        })
    }
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| TraderError::Config(format!("Config key {key}: {e}"))),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_env(lookup, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_strategy() {
        let cfg = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.strategy, StrategyConfig::default());
        assert_eq!(cfg.strategy.symbol, "TSLA");
        assert_eq!(cfg.strategy.short_window, 20);
        assert_eq!(cfg.strategy.long_window, 50);
        assert_eq!(cfg.schedule, LiveSchedule::default());
        assert_eq!(cfg.backtest_days, 365);
        assert_eq!(cfg.log_file, Some(PathBuf::from("trading_log.log")));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("SYMBOL", " aapl "),
            ("SHORT_MA", "5"),
            ("LONG_MA", "10"),
            ("POSITION_SIZE", "0.25"),
            ("POLL_SECS", "15"),
            ("SIZE_WITH_LIVE_QUOTE", "true"),
            ("LOG_FILE", "-"),
        ]))
        .unwrap();
        assert_eq!(cfg.strategy.symbol, "AAPL");
        assert_eq!(cfg.strategy.short_window, 5);
        assert_eq!(cfg.strategy.long_window, 10);
        assert_eq!(cfg.strategy.position_size, 0.25);
        assert_eq!(cfg.schedule.poll_interval, Duration::from_secs(15));
        assert!(cfg.schedule.size_with_live_quote);
        assert_eq!(cfg.log_file, None);
    }

    #[test]
    fn unparsable_value_names_the_key() {
        let err = AppConfig::from_lookup(lookup_from(&[("LONG_MA", "fifty")])).unwrap_err();
        assert!(err.to_string().contains("LONG_MA"), "{err}");
    }

    #[test]
    fn rejects_inverted_windows() {
        let err = AppConfig::from_lookup(lookup_from(&[("SHORT_MA", "50"), ("LONG_MA", "20")]))
            .unwrap_err();
        assert!(matches!(err, TraderError::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_fractions() {
        assert!(AppConfig::from_lookup(lookup_from(&[("POSITION_SIZE", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("POSITION_SIZE", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("STOP_LOSS_PCT", "1")])).is_err());
    }

    #[test]
    fn missing_credentials_are_reported_by_name() {
        let err = BrokerCredentials::from_lookup(lookup_from(&[("API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, TraderError::MissingEnv("API_SECRET")));

        let err = BrokerCredentials::from_lookup(lookup_from(&[
            ("API_KEY", "k"),
            ("API_SECRET", "s"),
            ("BASE_URL", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, TraderError::MissingEnv("BASE_URL")));
    }

    #[test]
    fn credentials_trim_trailing_slash() {
        let creds = BrokerCredentials::from_lookup(lookup_from(&[
            ("API_KEY", "k"),
            ("API_SECRET", "s"),
            ("BASE_URL", "https://paper-api.alpaca.markets/"),
        ]))
        .unwrap();
        assert_eq!(creds.base_url, "https://paper-api.alpaca.markets");
        assert_eq!(creds.data_url, DEFAULT_ALPACA_DATA_URL);
        assert!(!format!("{creds:?}").contains("\"s\""));
    }

    #[test]
    fn sixty_day_lookback_is_about_42_bars() {
        assert_eq!(LiveSchedule::default().expected_trading_bars(), 42);
    }
}
