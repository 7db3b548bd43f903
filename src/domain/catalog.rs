use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type VariantId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Available,
    OutOfStock,
}

/// One purchasable variant as published by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub variant_id: VariantId,
    pub sku: String,
    pub description: String,
    pub size_label: String,
    /// Price in currency minor units. Totals are only ever computed from this.
    pub unit_price_minor: i64,
    pub stock_status: StockStatus,
    pub restricted: bool,
}

/// Immutable view of the catalog at the moment it was fetched.
///
/// Refreshes build a new snapshot and swap it in; a snapshot is never edited
/// after construction.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    items: HashMap<VariantId, CatalogItem>,
    fetched_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Later items with a repeated `variant_id` replace earlier ones.
    pub fn new(items: impl IntoIterator<Item = CatalogItem>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.variant_id, item))
                .collect(),
            fetched_at,
        }
    }

    pub fn get(&self, variant_id: VariantId) -> Option<&CatalogItem> {
        self.items.get(&variant_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
