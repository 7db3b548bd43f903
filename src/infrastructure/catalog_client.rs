use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::catalog::{CatalogItem, StockStatus};
use crate::domain::ports::{CatalogSource, FetchError};

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePrice {
    Minor(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireFlag {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    variant_id: i64,
    product_code: String,
    product_title: String,
    variant_code: String,
    variant_price: WirePrice,
    variant_stock_status: String,
    product_is_eligibility_restricted: WireFlag,
}

impl TryFrom<CatalogRecord> for CatalogItem {
    type Error = FetchError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        let unit_price_minor = match record.variant_price {
            WirePrice::Minor(price) => price,
            WirePrice::Text(text) => text.trim().parse().map_err(|_| {
                FetchError::Malformed(format!(
                    "variant {} has a non-integer price '{}'",
                    record.variant_id, text
                ))
            })?,
        };
        if unit_price_minor < 0 {
            return Err(FetchError::Malformed(format!(
                "variant {} has a negative price",
                record.variant_id
            )));
        }

        let status = record.variant_stock_status.trim();
        let stock_status =
            if status.eq_ignore_ascii_case("OUT") || status.eq_ignore_ascii_case("OUT_OF_STOCK") {
                StockStatus::OutOfStock
            } else {
                StockStatus::Available
            };

        let restricted = match record.product_is_eligibility_restricted {
            WireFlag::Bool(flag) => flag,
            WireFlag::Text(text) => {
                let text = text.trim();
                text.eq_ignore_ascii_case("Y") || text.eq_ignore_ascii_case("true")
            }
        };

        Ok(CatalogItem {
            variant_id: record.variant_id,
            sku: record.product_code,
            description: record.product_title,
            size_label: record.variant_code,
            unit_price_minor,
            stock_status,
            restricted,
        })
    }
}

/// Decodes a catalog response body. One bad record fails the whole batch.
pub fn decode_catalog(body: &[u8]) -> Result<Vec<CatalogItem>, FetchError> {
    let records: Vec<CatalogRecord> =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    records.into_iter().map(CatalogItem::try_from).collect()
}

// ── HTTP source ──────────────────────────────────────────────────────────────

pub struct HttpCatalogSource {
    client: Client,
    url: String,
}

impl HttpCatalogSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogItem>, FetchError> {
        log::debug!("requesting catalog from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        decode_catalog(&body)
    }
}
