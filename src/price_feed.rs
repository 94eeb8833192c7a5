use anyhow::{Context, anyhow};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::command::Command;
use crate::config::PriceFeedConfig;

pub struct PriceFeed {
    client: Client,
    config: PriceFeedConfig,
    tx: broadcast::Sender<Command>,
}

impl PriceFeed {
    pub fn new(config: PriceFeedConfig, tx: broadcast::Sender<Command>) -> Result<PriceFeed, anyhow::Error> {
        Ok(PriceFeed {
            client: build_http_client()?,
            config,
            tx,
        })
    }

    /// Fetch the spot quote once; failures are logged and the fallback stays in place.
    pub async fn refresh_once(&self) {
        match self.fetch_usd_price().await {
            Ok(price) => {
                info!(coin = %self.config.coin_id, price, "loaded live price");
                let _ = self.tx.send(Command::PriceUpdate(price));
            }
            Err(err) => {
                warn!(coin = %self.config.coin_id, error = %format!("{err:#}"), "failed to fetch price, keeping fallback");
            }
        }
    }

    async fn fetch_usd_price(&self) -> Result<f64, anyhow::Error> {
        let url = format!("{}/simple/price", self.config.endpoint);
        let body = self
            .client
            .get(url)
            .query(&[
                ("ids", self.config.coin_id.as_str()),
                ("vs_currencies", "usd"),
            ])
            .send()
            .await
            .with_context(|| format!("requesting price for {}", self.config.coin_id))?
            .error_for_status()
            .with_context(|| format!("price response status for {}", self.config.coin_id))?
            .json::<Value>()
            .await
            .with_context(|| format!("decoding price for {}", self.config.coin_id))?;
        extract_usd_price(&body, &self.config.coin_id)
    }
}

/// Read `{coin_id}.usd` from a simple-price payload.
pub fn extract_usd_price(body: &Value, coin_id: &str) -> Result<f64, anyhow::Error> {
    let price = body
        .get(coin_id)
        .and_then(|quote| quote.get("usd"))
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("price payload has no {coin_id}.usd field"))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(anyhow!("price payload has unusable {coin_id}.usd value {price}"));
    }
    Ok(price)
}

fn build_http_client() -> Result<Client, anyhow::Error> {
    Ok(ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(20))
        .build()?)
}
