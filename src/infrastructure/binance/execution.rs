//! Binance spot adapter (spec §4.9, §6): implements
//! [`domain::ports::ExchangeAdapter`] against Binance's REST API —
//! HMAC-SHA256 request signing, order placement/cancellation, balance and
//! OHLCV retrieval. Every call is wrapped by the [`CircuitBreaker`] so a
//! systemically failing venue stops receiving placement attempts for a
//! cooldown window (SPEC_FULL SUPPLEMENT-2), composed with the OMS's
//! per-order exponential backoff (spec §4.7) rather than replacing it.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::domain::errors::ExchangeError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{ExchangeAdapter, PlacementAck};
use crate::domain::trading::types::{
    denormalize_crypto_symbol, normalize_crypto_symbol, Candle, Order, OrderSide, OrderStatus,
    OrderType,
};
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::core::http_client_factory::{build_url_with_query, HttpClientFactory};

type HmacSha256 = Hmac<Sha256>;

/// Binance spot venue (`https://api.binance.com` by default). Holds no
/// trading state of its own — the OMS owns the order table (spec §5); this
/// adapter is a thin, retried/breaker-wrapped transport.
pub struct BinanceAdapter {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
    circuit_breaker: CircuitBreaker,
    /// `exchange_order_id -> native symbol`, recorded at placement time.
    /// Binance's order/cancel endpoints require the symbol alongside the
    /// order id; the `ExchangeAdapter` contract (spec §6) only carries the
    /// id, so the adapter remembers the mapping itself rather than forcing
    /// every caller to thread the symbol through.
    order_symbols: RwLock<HashMap<String, String>>,
}

impl BinanceAdapter {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            api_key,
            api_secret,
            base_url,
            circuit_breaker: CircuitBreaker::new(
                "binance-adapter",
                5,
                3,
                std::time::Duration::from_secs(60),
            ),
            order_symbols: RwLock::new(HashMap::new()),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn remember_symbol(&self, exchange_order_id: &str, native_symbol: &str) {
        self.order_symbols
            .write()
            .await
            .insert(exchange_order_id.to_string(), native_symbol.to_string());
    }

    async fn native_symbol(&self, exchange_order_id: &str) -> Result<String, ExchangeError> {
        self.order_symbols
            .read()
            .await
            .get(exchange_order_id)
            .cloned()
            .ok_or_else(|| {
                ExchangeError::permanent(
                    "UNKNOWN_ORDER",
                    format!("no symbol recorded for order {exchange_order_id}"),
                )
            })
    }

    fn classify_reqwest_err(e: reqwest_middleware::Error) -> ExchangeError {
        ExchangeError::retryable("TRANSPORT", e.to_string())
    }

    fn classify_http_status(status: reqwest::StatusCode, body: &str) -> ExchangeError {
        let retryable = status.as_u16() == 429 || status.is_server_error();
        if retryable {
            ExchangeError::retryable(status.as_str(), body.to_string())
        } else {
            ExchangeError::permanent(status.as_str(), body.to_string())
        }
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn exchange_id(&self) -> &str {
        "binance"
    }

    /// Places `order` on Binance. MARKET orders omit `price` entirely per
    /// spec §6/§8's literal contract — some venues reject a zero or null
    /// price field, so the parameter is simply never pushed.
    #[instrument(skip(self, order), fields(symbol = %order.symbol, side = ?order.side))]
    async fn place_order(&self, order: &Order) -> Result<PlacementAck, ExchangeError> {
        let native_symbol = denormalize_crypto_symbol(&order.symbol);
        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match order.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Stop => "STOP_LOSS",
            OrderType::StopLimit => "STOP_LOSS_LIMIT",
        };

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", native_symbol.clone()),
            ("side", side.to_string()),
            ("type", order_type.to_string()),
            ("quantity", order.amount.to_string()),
            ("newClientOrderId", order.id.clone()),
            ("timestamp", Self::timestamp().to_string()),
        ];

        // price is required iff LIMIT/STOP_LIMIT (spec §3); MARKET never
        // carries one (spec §8 universal invariant).
        if matches!(order.order_type, OrderType::Limit | OrderType::StopLimit) {
            let price = order.price.ok_or_else(|| {
                ExchangeError::permanent("MISSING_PRICE", "LIMIT order requires a price")
            })?;
            params.push(("price", price.to_string()));
            // GTX is Binance's maker-only time-in-force: the order is
            // cancelled instead of resting if it would take liquidity
            // (spec §4.5 "BUY/SELL LIMIT post-only").
            let tif = if order.post_only { "GTX" } else { "GTC" };
            params.push(("timeInForce", tif.to_string()));
        }
        if let Some(stop) = order.stop_price {
            if matches!(order.order_type, OrderType::Stop | OrderType::StopLimit) {
                params.push(("stopPrice", stop.to_string()));
            }
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signed = format!("{query}&signature={}", self.sign(&query));
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        let ack = self
            .circuit_breaker
            .call(async {
                let response = self
                    .client
                    .post(&url)
                    .header("X-MBX-APIKEY", &self.api_key)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| ExchangeError::retryable("BODY_READ", e.to_string()))?;
                if !status.is_success() {
                    return Err(Self::classify_http_status(status, &body));
                }

                #[derive(Deserialize)]
                struct PlaceResponse {
                    #[serde(rename = "orderId")]
                    order_id: i64,
                }
                let parsed: PlaceResponse = serde_json::from_str(&body)
                    .map_err(|e| ExchangeError::permanent("MALFORMED_RESPONSE", e.to_string()))?;
                Ok(parsed.order_id.to_string())
            })
            .await
            .map_err(flatten_circuit_error)?;

        self.remember_symbol(&ack, &native_symbol).await;
        info!(exchange_order_id = %ack, "order placed on binance");
        Ok(PlacementAck {
            exchange_order_id: ack,
        })
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), ExchangeError> {
        let native_symbol = self.native_symbol(exchange_order_id).await?;
        let query = format!(
            "symbol={native_symbol}&orderId={exchange_order_id}&timestamp={}",
            Self::timestamp()
        );
        let signed = format!("{query}&signature={}", self.sign(&query));
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        self.circuit_breaker
            .call(async {
                let response = self
                    .client
                    .delete(&url)
                    .header("X-MBX-APIKEY", &self.api_key)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Self::classify_http_status(status, &body));
                }
                Ok(())
            })
            .await
            .map_err(flatten_circuit_error)
    }

    async fn fetch_order(&self, exchange_order_id: &str) -> Result<Order, ExchangeError> {
        let native_symbol = self.native_symbol(exchange_order_id).await?;
        let query = format!(
            "symbol={native_symbol}&orderId={exchange_order_id}&timestamp={}",
            Self::timestamp()
        );
        let signed = format!("{query}&signature={}", self.sign(&query));
        let url = format!("{}/api/v3/order?{signed}", self.base_url);

        self.circuit_breaker
            .call(async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-MBX-APIKEY", &self.api_key)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(Self::classify_http_status(status, &body));
                }
                let raw: BinanceOrderStatus = serde_json::from_str(&body)
                    .map_err(|e| ExchangeError::permanent("MALFORMED_RESPONSE", e.to_string()))?;
                raw.into_order()
            })
            .await
            .map_err(flatten_circuit_error)
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, ExchangeError> {
        let mut query = format!("timestamp={}", Self::timestamp());
        if let Some(symbol) = symbol {
            query = format!("symbol={}&{query}", denormalize_crypto_symbol(symbol));
        }
        let signed = format!("{query}&signature={}", self.sign(&query));
        let url = format!("{}/api/v3/openOrders?{signed}", self.base_url);

        self.circuit_breaker
            .call(async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-MBX-APIKEY", &self.api_key)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(Self::classify_http_status(status, &body));
                }
                let raw: Vec<BinanceOrderStatus> = serde_json::from_str(&body)
                    .map_err(|e| ExchangeError::permanent("MALFORMED_RESPONSE", e.to_string()))?;
                raw.into_iter().map(|o| o.into_order()).collect()
            })
            .await
            .map_err(flatten_circuit_error)
    }

    async fn fetch_balance(&self) -> Result<Decimal, ExchangeError> {
        let query = format!("timestamp={}", Self::timestamp());
        let signed = format!("{query}&signature={}", self.sign(&query));
        let url = format!("{}/api/v3/account?{signed}", self.base_url);

        self.circuit_breaker
            .call(async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-MBX-APIKEY", &self.api_key)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    warn!(%status, "binance account fetch failed");
                    return Err(Self::classify_http_status(status, &body));
                }

                #[derive(Deserialize)]
                struct Balance {
                    asset: String,
                    free: String,
                    locked: String,
                }
                #[derive(Deserialize)]
                struct AccountResponse {
                    balances: Vec<Balance>,
                }
                let account: AccountResponse = serde_json::from_str(&body)
                    .map_err(|e| ExchangeError::permanent("MALFORMED_RESPONSE", e.to_string()))?;

                let usdt = account
                    .balances
                    .into_iter()
                    .find(|b| b.asset == "USDT")
                    .map(|b| {
                        let free = Decimal::from_str(&b.free).unwrap_or_default();
                        let locked = Decimal::from_str(&b.locked).unwrap_or_default();
                        free + locked
                    })
                    .unwrap_or_default();
                Ok(usdt)
            })
            .await
            .map_err(flatten_circuit_error)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let native_symbol = denormalize_crypto_symbol(symbol);
        let mut params = vec![
            ("symbol".to_string(), native_symbol),
            (
                "interval".to_string(),
                timeframe.to_binance_string().to_string(),
            ),
        ];
        if let Some(since) = since_ms {
            params.push(("startTime".to_string(), since.to_string()));
        }
        params.push(("limit".to_string(), limit.unwrap_or(500).to_string()));
        let url = build_url_with_query(
            &format!("{}/api/v3/klines", self.base_url),
            &params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        );

        let symbol = symbol.to_string();
        self.circuit_breaker
            .call(async {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(Self::classify_reqwest_err)?;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(Self::classify_http_status(status, &body));
                }
                let raw: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)
                    .map_err(|e| ExchangeError::permanent("MALFORMED_RESPONSE", e.to_string()))?;

                raw.into_iter()
                    .map(|row| parse_kline(&symbol, timeframe, &row))
                    .collect()
            })
            .await
            .map_err(flatten_circuit_error)
    }

    /// Binance natively supports one-cancels-other orders
    /// (`POST /api/v3/order/oco`); the OMS never needs to emulate OCO for
    /// this venue (spec §4.7/§4.9).
    fn supports_oco(&self) -> bool {
        true
    }
}

fn flatten_circuit_error(e: CircuitBreakerError<ExchangeError>) -> ExchangeError {
    match e {
        CircuitBreakerError::Open(reason) => ExchangeError::retryable("CIRCUIT_OPEN", reason),
        CircuitBreakerError::Inner(inner) => inner,
    }
}

#[derive(Deserialize)]
struct BinanceOrderStatus {
    symbol: String,
    #[serde(rename = "orderId")]
    order_id: i64,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    price: String,
    #[serde(rename = "origQty")]
    orig_qty: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    status: String,
    time: i64,
    #[serde(rename = "updateTime")]
    update_time: i64,
}

impl BinanceOrderStatus {
    fn into_order(self) -> Result<Order, ExchangeError> {
        let symbol = normalize_crypto_symbol(&self.symbol)
            .map_err(|e| ExchangeError::permanent("BAD_SYMBOL", e))?;
        let side = match self.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(ExchangeError::permanent("BAD_SIDE", other.to_string())),
        };
        let order_type = match self.order_type.as_str() {
            "MARKET" => OrderType::Market,
            "LIMIT" => OrderType::Limit,
            "STOP_LOSS" | "STOP_LOSS_LIMIT" => OrderType::Stop,
            other => return Err(ExchangeError::permanent("BAD_TYPE", other.to_string())),
        };
        let status = match self.status.as_str() {
            "NEW" => OrderStatus::Placed,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            other => return Err(ExchangeError::permanent("BAD_STATUS", other.to_string())),
        };
        let amount = Decimal::from_str(&self.orig_qty).unwrap_or_default();
        let filled_amount = Decimal::from_str(&self.executed_qty).unwrap_or_default();
        let price = Decimal::from_str(&self.price)
            .ok()
            .filter(|p| *p > Decimal::ZERO);

        Ok(Order {
            id: self.order_id.to_string(),
            exchange_order_id: Some(self.order_id.to_string()),
            symbol,
            side,
            order_type,
            price,
            amount,
            filled_amount,
            avg_fill_price: None,
            status,
            created_t: self.time,
            last_update_t: self.update_time,
            stop_price: None,
            purpose: crate::domain::trading::types::Purpose::Entry,
            strategy_tag: "binance-sync".to_string(),
            reduce_only: false,
            post_only: false,
        })
    }
}

fn parse_kline(
    symbol: &str,
    timeframe: Timeframe,
    row: &[serde_json::Value],
) -> Result<Candle, ExchangeError> {
    let get_str = |i: usize| -> Result<&str, ExchangeError> {
        row.get(i)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::permanent("MALFORMED_KLINE", format!("field {i}")))
    };
    let get_i64 = |i: usize| -> Result<i64, ExchangeError> {
        row.get(i)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExchangeError::permanent("MALFORMED_KLINE", format!("field {i}")))
    };
    let t_open = get_i64(0)?;
    let open = Decimal::from_str(get_str(1)?)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e.to_string()))?;
    let high = Decimal::from_str(get_str(2)?)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e.to_string()))?;
    let low = Decimal::from_str(get_str(3)?)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e.to_string()))?;
    let close = Decimal::from_str(get_str(4)?)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e.to_string()))?;
    let volume = Decimal::from_str(get_str(5)?)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e.to_string()))?;

    Candle::new(symbol, timeframe, t_open, open, high, low, close, volume)
        .map_err(|e| ExchangeError::permanent("MALFORMED_KLINE", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signature_is_64_hex_chars() {
        let adapter = BinanceAdapter::new(
            "key".to_string(),
            "secret".to_string(),
            "https://api.binance.com".to_string(),
        );
        let sig = adapter.sign("symbol=SOLUSDT&side=BUY&timestamp=1");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_kline_builds_valid_candle() {
        let row: Vec<serde_json::Value> = vec![
            serde_json::json!(1_700_000_000_000i64),
            serde_json::json!("100.0"),
            serde_json::json!("101.0"),
            serde_json::json!("99.0"),
            serde_json::json!("100.5"),
            serde_json::json!("1000.0"),
        ];
        let candle = parse_kline("SOL/USDT", Timeframe::OneHour, &row).unwrap();
        assert_eq!(candle.close, dec!(100.5));
        assert_eq!(candle.symbol, "SOL/USDT");
    }

    #[test]
    fn into_order_maps_binance_status_to_domain_status() {
        let raw = BinanceOrderStatus {
            symbol: "SOLUSDT".to_string(),
            order_id: 42,
            side: "BUY".to_string(),
            order_type: "LIMIT".to_string(),
            price: "100.0".to_string(),
            orig_qty: "10".to_string(),
            executed_qty: "4".to_string(),
            status: "PARTIALLY_FILLED".to_string(),
            time: 0,
            update_time: 1,
        };
        let order = raw.into_order().unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_amount, dec!(4));
        assert_eq!(order.symbol, "SOL/USDT");
    }
}
