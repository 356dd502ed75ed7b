//! Historical USD prices from the CoinGecko `coins/{id}/history` endpoint.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use holder_snapshot::{BoxError, PriceOracle};
use serde::Deserialize;

use crate::config::PriceSettings;

/// Public CoinGecko API root.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Header carrying a CoinGecko demo API key.
const API_KEY_HEADER: &str = "x_cg_demo_api_key";

/// Per-request timeout for price lookups.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`PriceOracle`] backed by the CoinGecko REST API.
#[derive(Debug, Clone)]
pub struct CoinGecko {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGecko {
    /// Build a client from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: &PriceSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building price API client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            api_key: settings.api_key.clone(),
        })
    }

    fn history_url(&self, token_id: &str) -> String {
        format!("{}/coins/{token_id}/history", self.base_url)
    }
}

impl PriceOracle for CoinGecko {
    async fn historical_price_usd(
        &self,
        token_id: &str,
        date: NaiveDate,
    ) -> Result<Option<f64>, BoxError> {
        let mut request = self.client.get(self.history_url(token_id)).query(&[
            ("date", history_date(date).as_str()),
            ("localization", "false"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let history: History = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(history.usd())
    }
}

/// Day format the history endpoint expects (`dd-mm-yyyy`).
#[must_use]
pub fn history_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// The slice of the history response we read.
#[derive(Debug, Deserialize)]
struct History {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    current_price: HashMap<String, f64>,
}

impl History {
    fn usd(&self) -> Option<f64> {
        self.market_data.as_ref()?.current_price.get("usd").copied()
    }
}
