//! Gate.io USDT-settled futures client (REST API v4).
//!
//! Handles:
//! - Public market data (tickers, contract specs)
//! - Signed order placement, cancellation and leverage changes
//! - Translating base-asset quantities into signed contract counts

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::gateway::{ExchangeGateway, OrderAck, OrderSide};

pub const LIVE_HOST: &str = "https://fx-api.gateio.ws";
pub const TESTNET_HOST: &str = "https://fx-api-testnet.gateio.ws";
const API_PREFIX: &str = "/api/v4";
const SETTLE: &str = "usdt";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha512 = Hmac<Sha512>;

/// Gate.io client configuration.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    /// API key (only needed for private endpoints)
    pub api_key: Option<String>,
    /// API secret (only needed for private endpoints)
    pub api_secret: Option<String>,
    /// Use the futures testnet
    pub testnet: bool,
}

impl GateConfig {
    /// Create from environment variables:
    /// - EXCHANGE (must be `gateio` when set)
    /// - API_KEY / API_SECRET
    /// - SANDBOX (defaults to true)
    pub fn from_env() -> Result<Self> {
        let exchange = std::env::var("EXCHANGE").unwrap_or_else(|_| "gateio".to_string());
        if !matches!(exchange.to_lowercase().as_str(), "gateio" | "gate") {
            bail!("Unsupported EXCHANGE '{}', only gateio is available", exchange);
        }

        let testnet = std::env::var("SANDBOX")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            api_key: std::env::var("API_KEY").ok().filter(|s| !s.is_empty()),
            api_secret: std::env::var("API_SECRET").ok().filter(|s| !s.is_empty()),
            testnet,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Contract specification from `/futures/usdt/contracts/{contract}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractInfo {
    pub name: String,
    /// Base-asset amount of one contract
    pub quanto_multiplier: Decimal,
    /// Price tick
    pub order_price_round: Decimal,
    #[serde(default)]
    pub order_size_min: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    contract: String,
    last: Decimal,
}

#[derive(Debug, Clone, Serialize)]
struct FuturesOrderRequest {
    contract: String,
    /// Contract count, negative for sells
    size: i64,
    price: String,
    tif: &'static str,
    reduce_only: bool,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FuturesOrderResponse {
    id: serde_json::Value,
    #[serde(default)]
    status: String,
}

/// Gate.io futures client.
pub struct GateClient {
    http: Client,
    config: GateConfig,
    host: String,
    contracts: RwLock<HashMap<String, ContractInfo>>,
}

impl GateClient {
    pub fn new(config: GateConfig) -> Result<Self> {
        let host = if config.testnet { TESTNET_HOST } else { LIVE_HOST };
        Self::with_host(config, host.to_string())
    }

    /// Create with a custom host (for testing).
    pub fn with_host(config: GateConfig, host: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config,
            host,
            contracts: RwLock::new(HashMap::new()),
        })
    }

    /// `BTCUSDT` -> `BTC_USDT`.
    pub fn contract_name(symbol: &str) -> String {
        match symbol.strip_suffix("USDT") {
            Some(base) if !base.is_empty() => format!("{}_USDT", base.trim_end_matches('_')),
            _ => symbol.to_string(),
        }
    }

    /// Contract spec, fetched once per contract.
    pub async fn contract(&self, symbol: &str) -> Result<ContractInfo> {
        let name = Self::contract_name(symbol);
        if let Some(info) = self.contracts.read().await.get(&name) {
            return Ok(info.clone());
        }

        let info: ContractInfo = self
            .public_get(&format!("/futures/{}/contracts/{}", SETTLE, name), "")
            .await
            .with_context(|| format!("Failed to load contract {}", name))?;

        if info.quanto_multiplier <= Decimal::ZERO || info.order_price_round <= Decimal::ZERO {
            bail!("Contract {} has unusable precision data", info.name);
        }

        self.contracts.write().await.insert(name, info.clone());
        Ok(info)
    }

    /// Signed contract count for a base-asset quantity.
    async fn contract_size(&self, symbol: &str, side: OrderSide, qty: Decimal) -> Result<i64> {
        let info = self.contract(symbol).await?;
        let contracts = (qty / info.quanto_multiplier)
            .trunc()
            .to_i64()
            .ok_or_else(|| anyhow!("Quantity {} out of range", qty))?;

        if contracts <= 0 || contracts < info.order_size_min {
            bail!(
                "Quantity {} is below one contract ({} {})",
                qty,
                info.quanto_multiplier,
                symbol
            );
        }

        Ok(match side {
            OrderSide::Buy => contracts,
            OrderSide::Sell => -contracts,
        })
    }

    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Option<Decimal>,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        let size = self.contract_size(symbol, side, qty).await?;
        let (price, tif) = match price {
            Some(p) => (p.normalize().to_string(), "gtc"),
            None => ("0".to_string(), "ioc"),
        };

        let request = FuturesOrderRequest {
            contract: Self::contract_name(symbol),
            size,
            price,
            tif,
            reduce_only,
            text: format!("t-{}", &uuid::Uuid::new_v4().simple().to_string()[..16]),
        };

        debug!(
            contract = %request.contract,
            size = request.size,
            price = %request.price,
            reduce_only = reduce_only,
            "Submitting futures order"
        );

        let body = serde_json::to_string(&request)?;
        let response: FuturesOrderResponse = self
            .signed_request(Method::POST, &format!("/futures/{}/orders", SETTLE), "", &body)
            .await
            .context("Order placement failed")?;

        let id = match response.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => bail!("Order response has no usable id: {}", other),
        };

        debug!(id = %id, status = %response.status, "Order accepted");
        Ok(OrderAck { id })
    }

    async fn public_get<T: DeserializeOwned>(&self, endpoint: &str, query: &str) -> Result<T> {
        let url = self.url(endpoint, query);
        debug!(url = %url, "Gate.io public request");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse_response(response).await
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
        body: &str,
    ) -> Result<T> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .context("API_KEY not set")?;

        let timestamp = Utc::now().timestamp();
        let path = format!("{}{}", API_PREFIX, endpoint);
        let signature = self.sign(method.as_str(), &path, query, body, timestamp)?;

        let url = self.url(endpoint, query);
        debug!(method = %method, url = %url, "Gate.io signed request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("KEY", api_key)
            .header("Timestamp", timestamp.to_string())
            .header("SIGN", signature);

        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        let response = request.send().await.context("Failed to send request")?;
        Self::parse_response(response).await
    }

    /// HMAC-SHA512 over `METHOD\nPATH\nQUERY\nSHA512(BODY)\nTIMESTAMP`.
    fn sign(&self, method: &str, path: &str, query: &str, body: &str, timestamp: i64) -> Result<String> {
        let secret = self
            .config
            .api_secret
            .as_deref()
            .context("API_SECRET not set")?;

        let body_hash = hex::encode(Sha512::digest(body.as_bytes()));
        let payload = format!("{}\n{}\n{}\n{}\n{}", method, path, query, body_hash, timestamp);

        let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow!("Invalid API secret: {}", e))?;
        mac.update(payload.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn url(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}{}", self.host, API_PREFIX, endpoint)
        } else {
            format!("{}{}{}?{}", self.host, API_PREFIX, endpoint, query)
        }
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        if !status.is_success() {
            bail!("Gate.io request failed: {} - {}", status, text);
        }

        serde_json::from_str(&text).with_context(|| format!("Failed to parse response: {}", text))
    }
}

#[async_trait]
impl ExchangeGateway for GateClient {
    async fn fetch_last_price(&self, symbol: &str) -> Result<Decimal> {
        let contract = Self::contract_name(symbol);
        let tickers: Vec<TickerResponse> = self
            .public_get(
                &format!("/futures/{}/tickers", SETTLE),
                &format!("contract={}", contract),
            )
            .await?;

        let ticker = tickers
            .into_iter()
            .find(|t| t.contract.is_empty() || t.contract == contract)
            .ok_or_else(|| anyhow!("No ticker for {}", contract))?;

        if ticker.last <= Decimal::ZERO {
            bail!("Ticker for {} has no last price", contract);
        }
        Ok(ticker.last)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let endpoint = format!(
            "/futures/{}/positions/{}/leverage",
            SETTLE,
            Self::contract_name(symbol)
        );
        let _: serde_json::Value = self
            .signed_request(Method::POST, &endpoint, &format!("leverage={}", leverage), "")
            .await?;
        Ok(())
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        self.submit_order(symbol, side, qty, None, reduce_only).await
    }

    async fn limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck> {
        self.submit_order(symbol, side, qty, Some(price), reduce_only).await
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        let endpoint = format!("/futures/{}/orders/{}", SETTLE, order_id);
        let _: serde_json::Value = self
            .signed_request(Method::DELETE, &endpoint, "", "")
            .await?;
        Ok(())
    }

    /// Without contract metadata this falls back to 6 dp. Only paper routing
    /// gets further than that: live orders need the contract multiplier and
    /// fail in `contract_size`.
    async fn round_quantity(&self, symbol: &str, qty: Decimal) -> Result<Decimal> {
        match self.contract(symbol).await {
            Ok(info) => {
                let step = info.quanto_multiplier;
                Ok(((qty / step).trunc() * step).normalize())
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No contract spec, rounding quantity to 6 dp");
                Ok(qty.round_dp_with_strategy(6, RoundingStrategy::ToZero))
            }
        }
    }

    async fn round_price(&self, symbol: &str, price: Decimal) -> Result<Decimal> {
        match self.contract(symbol).await {
            Ok(info) => {
                let tick = info.order_price_round;
                let ticks = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
                Ok((ticks * tick).normalize())
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No contract spec, rounding price to 2 dp");
                Ok(price.round_dp(2))
            }
        }
    }
}
