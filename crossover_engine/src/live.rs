/// live.rs — Brokerage access via the Alpaca v2 REST API
///
/// Works against both paper and live trading; the trading host is whatever
/// `BASE_URL` points at (e.g. https://paper-api.alpaca.markets).
///
/// ENDPOINTS USED:
///   GET  {base}/v2/clock                           → is_open
///   GET  {base}/v2/account                         → equity (decimal string)
///   GET  {data}/v2/stocks/{symbol}/bars/latest     → bar.c
///   POST {base}/v2/orders                          → market order, time_in_force=gtc
///
/// AUTH: every request carries APCA-API-KEY-ID / APCA-API-SECRET-KEY headers.
///       HTTP 401 surfaces as `TraderError::Unauthorized`. A 403 on an order
///       is a rejection (buying power, shortable shares) and stays retryable;
///       a 403 on a read means the key lacks access and is fatal.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BrokerCredentials;
use crate::error::{Result, TraderError};
use crate::models::{OrderHandle, OrderRequest, Side, TimeInForce};

/// Brokerage operations the live loop depends on.
#[allow(async_fn_in_trait)]
pub trait Broker {
    async fn is_market_open(&self) -> Result<bool>;
    async fn account_equity(&self) -> Result<f64>;
    async fn latest_close(&self, symbol: &str) -> Result<f64>;
    async fn submit_market_order(&self, order: &OrderRequest) -> Result<OrderHandle>;
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ClockResponse {
    is_open: bool,
}

#[derive(Deserialize, Debug)]
struct AccountResponse {
    equity: String,
}

#[derive(Deserialize, Debug)]
struct LatestBarResponse {
    bar: LatestBar,
}

#[derive(Deserialize, Debug)]
struct LatestBar {
    #[serde(rename = "c")]
    close: f64,
}

#[derive(Serialize, Debug, PartialEq)]
struct OrderBody<'a> {
    symbol:        &'a str,
    qty:           String,
    side:          Side,
    #[serde(rename = "type")]
    order_type:    &'static str,
    time_in_force: TimeInForce,
}

impl<'a> From<&'a OrderRequest> for OrderBody<'a> {
    fn from(order: &'a OrderRequest) -> Self {
        Self {
            symbol:        &order.symbol,
            qty:           order.qty.to_string(),
            side:          order.side,
            order_type:    "market",
            time_in_force: order.time_in_force,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct OrderResponse {
    pub id:     String,
    pub status: String,
    pub symbol: String,
    #[serde(default)]
    pub qty:    Option<String>,
    pub side:   String,
}

#[derive(Deserialize, Debug)]
pub struct AlpacaError {
    #[serde(default)]
    pub code:    i64,
    pub message: String,
}

// ── Alpaca client ─────────────────────────────────────────────────────────

pub struct AlpacaClient {
    client:      Client,
    credentials: BrokerCredentials,
}

impl AlpacaClient {
    pub fn new(credentials: BrokerCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TraderError::Config(format!("HTTP client build failed: {e}")))?;
        Ok(Self { client, credentials })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("APCA-API-KEY-ID", &self.credentials.api_key)
            .header("APCA-API-SECRET-KEY", &self.credentials.api_secret)
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, builder: RequestBuilder, what: &'static str) -> std::result::Result<String, Failure> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Failure::Transport(format!("failed to read body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }
        let detail = describe_error(status, &body);
        debug!("Alpaca {what} failed: {detail}");
        Err(match status {
            StatusCode::UNAUTHORIZED => Failure::Unauthorized(detail),
            StatusCode::FORBIDDEN => Failure::Forbidden(detail),
            _ => Failure::Rejected(detail),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        url:  String,
        what: &'static str,
    ) -> Result<T> {
        let body = self
            .send(self.client.get(&url), what)
            .await
            .map_err(|f| f.into_error(what, false))?;
        serde_json::from_str(&body)
            .map_err(|e| TraderError::data_fetch(what, format!("unparsable response: {e}")))
    }
}

/// Transport or HTTP-level failure, classified by the caller.
#[derive(Debug)]
enum Failure {
    Transport(String),
    Unauthorized(String),
    Forbidden(String),
    Rejected(String),
}

impl Failure {
    fn into_error(self, what: &'static str, is_order: bool) -> TraderError {
        match self {
            Failure::Unauthorized(msg) => TraderError::Unauthorized(msg),
            Failure::Transport(msg) | Failure::Forbidden(msg) | Failure::Rejected(msg) if is_order => {
                TraderError::OrderSubmission(msg)
            }
            Failure::Forbidden(msg) => TraderError::Unauthorized(msg),
            Failure::Transport(msg) | Failure::Rejected(msg) => TraderError::data_fetch(what, msg),
        }
    }
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<AlpacaError>(body) {
        Ok(e) => format!("HTTP {status} ({}): {}", e.code, e.message),
        Err(_) => format!("HTTP {status}: {body}"),
    }
}

impl Broker for AlpacaClient {
    async fn is_market_open(&self) -> Result<bool> {
        let url = format!("{}/v2/clock", self.credentials.base_url);
        let clock: ClockResponse = self.query(url, "alpaca clock").await?;
        Ok(clock.is_open)
    }

    async fn account_equity(&self) -> Result<f64> {
        let url = format!("{}/v2/account", self.credentials.base_url);
        let account: AccountResponse = self.query(url, "alpaca account").await?;
        parse_equity(&account.equity)
    }

    async fn latest_close(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/v2/stocks/{symbol}/bars/latest", self.credentials.data_url);
        let latest: LatestBarResponse = self.query(url, "alpaca latest bar").await?;
        Ok(latest.bar.close)
    }

    async fn submit_market_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
        let url = format!("{}/v2/orders", self.credentials.base_url);
        let body = OrderBody::from(order);

        info!("Placing {:?} {} {} @ MARKET (gtc)", order.side, order.qty, order.symbol);

        let text = self
            .send(self.client.post(&url).json(&body), "order")
            .await
            .map_err(|f| f.into_error("order", true))?;

        // A 2xx means the order exists; an odd body must not desync holdings.
        let resp: OrderResponse = match serde_json::from_str(&text) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Order accepted but response unparsable ({e}): {text}");
                return Ok(OrderHandle { id: "unknown".into(), status: "accepted".into() });
            }
        };

        info!(
            "Order accepted: id={} {} {} qty={} status={}",
            resp.id,
            resp.side,
            resp.symbol,
            resp.qty.as_deref().unwrap_or("?"),
            resp.status
        );
        Ok(OrderHandle { id: resp.id, status: resp.status })
    }
}

fn parse_equity(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TraderError::data_fetch("alpaca account", format!("invalid equity {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_body_matches_alpaca_schema() {
        let order = OrderRequest::market("TSLA", 12, Side::Buy);
        let json = serde_json::to_value(OrderBody::from(&order)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "symbol": "TSLA",
                "qty": "12",
                "side": "buy",
                "type": "market",
                "time_in_force": "gtc"
            })
        );
    }

    #[test]
    fn parses_clock_account_and_latest_bar() {
        let clock: ClockResponse = serde_json::from_str(
            r#"{"timestamp":"2024-04-01T10:00:00-04:00","is_open":true,"next_open":"x","next_close":"y"}"#,
        )
        .unwrap();
        assert!(clock.is_open);

        let account: AccountResponse =
            serde_json::from_str(r#"{"id":"abc","equity":"100523.17","cash":"5000"}"#).unwrap();
        assert_eq!(parse_equity(&account.equity).unwrap(), 100_523.17);

        let latest: LatestBarResponse = serde_json::from_str(
            r#"{"symbol":"TSLA","bar":{"t":"2024-04-01T19:59:00Z","o":175.1,"h":175.4,"l":174.9,"c":175.22,"v":12000}}"#,
        )
        .unwrap();
        assert_eq!(latest.bar.close, 175.22);
    }

    #[test]
    fn bad_equity_is_a_data_fetch_error() {
        assert!(matches!(parse_equity("n/a"), Err(TraderError::DataFetch { .. })));
        assert!(matches!(parse_equity("inf"), Err(TraderError::DataFetch { .. })));
    }

    #[test]
    fn failures_are_classified_by_call_kind() {
        let order_err = Failure::Rejected("HTTP 403".into()).into_error("order", true);
        assert!(matches!(order_err, TraderError::OrderSubmission(_)));

        let query_err = Failure::Transport("timeout".into()).into_error("alpaca clock", false);
        assert!(matches!(query_err, TraderError::DataFetch { .. }));

        let auth_err = Failure::Unauthorized("HTTP 401".into()).into_error("order", true);
        assert!(matches!(auth_err, TraderError::Unauthorized(_)));

        let forbidden_order = Failure::Forbidden("HTTP 403".into()).into_error("order", true);
        assert!(matches!(forbidden_order, TraderError::OrderSubmission(_)));

        let forbidden_read = Failure::Forbidden("HTTP 403".into()).into_error("alpaca account", false);
        assert!(matches!(forbidden_read, TraderError::Unauthorized(_)));
    }

    /// Answer exactly one HTTP request on a local port with `status` and `body`.
    async fn one_shot_server(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Headers, then as many body bytes as Content-Length announces.
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn client_for(base: String) -> AlpacaClient {
        AlpacaClient::new(BrokerCredentials {
            api_key:    "key".into(),
            api_secret: "secret".into(),
            base_url:   base.clone(),
            data_url:   base,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn insufficient_buying_power_is_a_retryable_order_error() {
        let base = one_shot_server(
            "403 Forbidden",
            r#"{"code":40310000,"message":"insufficient buying power"}"#,
        )
        .await;
        let err = client_for(base)
            .submit_market_order(&OrderRequest::market("TSLA", 5, Side::Buy))
            .await
            .unwrap_err();

        assert!(matches!(err, TraderError::OrderSubmission(ref m) if m.contains("insufficient buying power")));
        assert_eq!(err.disposition(), crate::error::Disposition::Continue);
    }

    #[tokio::test]
    async fn rejected_key_stops_the_loop() {
        let base = one_shot_server("401 Unauthorized", r#"{"code":40110000,"message":"request is not authorized"}"#).await;
        let err = client_for(base).account_equity().await.unwrap_err();

        assert!(matches!(err, TraderError::Unauthorized(_)));
        assert_eq!(err.disposition(), crate::error::Disposition::Fatal);
    }

    #[test]
    fn error_body_is_summarised() {
        let msg = describe_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":40310000,"message":"insufficient buying power"}"#,
        );
        assert!(msg.contains("insufficient buying power"));
        assert!(msg.contains("422"));
    }
}
