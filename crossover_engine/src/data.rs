/// data.rs — Daily price history via the Yahoo Finance v8 chart API
///
/// REQUEST
///   GET {chart_url}/{symbol}?period1={start 00:00:00 UTC}&period2={end 23:59:59 UTC}&interval=1d
///
/// RESPONSE (abridged)
///   { "chart": { "result": [ { "timestamp": [..],
///                              "indicators": { "quote": [ { open, high, low, close, volume } ] } } ],
///                "error": null } }
///
/// Rows with a null close (holidays, halted sessions) are dropped.  Yahoo
/// occasionally repeats the in-progress session as a second row with the same
/// date; the later row wins.

use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TraderError};
use crate::models::{PriceBar, PriceSeries};

const SOURCE: &str = "yahoo chart";

/// Source of daily OHLCV history.
#[allow(async_fn_in_trait)]
pub trait MarketData {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries>;
}

// ── Response types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error:  Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code:        String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp:  Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open:   Vec<Option<f64>>,
    #[serde(default)]
    high:   Vec<Option<f64>>,
    #[serde(default)]
    low:    Vec<Option<f64>>,
    #[serde(default)]
    close:  Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

// ── Client ────────────────────────────────────────────────────────────────

pub struct YahooDataClient {
    client:    Client,
    chart_url: String,
}

impl YahooDataClient {
    pub fn new(chart_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) crossover_engine")
            .build()
            .map_err(|e| TraderError::Config(format!("HTTP client build failed: {e}")))?;
        Ok(Self { client, chart_url: chart_url.trim_end_matches('/').to_owned() })
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(start_ts);
        format!(
            "{}/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.chart_url
        )
    }
}

impl MarketData for YahooDataClient {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let url = self.chart_url(symbol, start, end);
        debug!("GET {url}");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::data_fetch(SOURCE, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TraderError::data_fetch(SOURCE, format!("failed to read body: {e}")))?;

        // Yahoo returns a JSON error document on 404 for unknown symbols.
        if !status.is_success() && serde_json::from_str::<ChartResponse>(&body).is_err() {
            return Err(TraderError::data_fetch(SOURCE, format!("{symbol}: HTTP {status}")));
        }

        parse_chart(symbol, &body)
    }
}

/// Parse a chart API document into a validated series.
pub fn parse_chart(symbol: &str, body: &str) -> Result<PriceSeries> {
    let resp: ChartResponse = serde_json::from_str(body)
        .map_err(|e| TraderError::data_fetch(SOURCE, format!("{symbol}: unparsable response: {e}")))?;

    if let Some(err) = resp.chart.error {
        return Err(TraderError::data_fetch(
            SOURCE,
            format!("{symbol}: {}: {}", err.code, err.description),
        ));
    }

    let data = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| TraderError::data_fetch(SOURCE, format!("{symbol}: empty result")))?;

    // No timestamps means no sessions in the requested range.
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| TraderError::data_fetch(SOURCE, format!("invalid timestamp {ts}")))?;

        let bar = PriceBar {
            date,
            open:   quote.open.get(i).copied().flatten().unwrap_or(close),
            high:   quote.high.get(i).copied().flatten().unwrap_or(close),
            low:    quote.low.get(i).copied().flatten().unwrap_or(close),
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        };

        match bars.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => bars.push(bar),
        }
    }

    PriceSeries::new(symbol, bars)
}
