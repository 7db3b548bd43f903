use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::catalog::{CatalogSnapshot, StockStatus, VariantId};
use super::errors::DomainError;
use super::events::DisplayState;
use super::order::{LineItem, ReceiptLine, ValidatedOrder};

/// Upper bound on units per line; each unit becomes a printed receipt row.
pub const MAX_UNITS_PER_LINE: i64 = 999;

const ITEMS_FIELD: &str = "i";
const TAG_FIELD: &str = "txn";
const VARIANT_FIELD: &str = "v";
const QUANTITY_FIELD: &str = "q";

/// Why an order request was refused. Variants are listed in the order they
/// are checked.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("unknown field `{field}` in order")]
    UnknownField { field: String },
    #[error("order has no items")]
    MissingItems,
    #[error("order has no transaction tag")]
    MissingTransactionTag,
    #[error("order already carries a transaction tag")]
    UnexpectedTransactionTag,
    #[error("item {index} is malformed")]
    MalformedItem { index: usize },
    #[error("variant {variant_id} is not in the catalog")]
    UnknownVariant { variant_id: VariantId },
    #[error("variant {variant_id} is restricted")]
    RestrictedItem { variant_id: VariantId },
    #[error("variant {variant_id} is out of stock")]
    OutOfStock { variant_id: VariantId },
    #[error("invalid quantity {quantity} for variant {variant_id}")]
    InvalidQuantity { variant_id: VariantId, quantity: i64 },
}

impl RejectionReason {
    pub fn display_state(&self) -> DisplayState {
        match self {
            RejectionReason::RestrictedItem { .. } | RejectionReason::OutOfStock { .. } => {
                DisplayState::Unfulfillable
            }
            _ => DisplayState::InvalidOrder,
        }
    }
}

/// A decoded but still untrusted order request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    fields: Map<String, Value>,
}

impl OrderRequest {
    /// Fails with `MalformedInput` when the text is not a JSON object.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(DomainError::MalformedInput(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(DomainError::MalformedInput(e.to_string())),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Checks a request against one catalog snapshot and prices it.
///
/// Stops at the first problem found; items are checked in request order.
pub fn validate(
    request: &OrderRequest,
    snapshot: &CatalogSnapshot,
) -> Result<ValidatedOrder, RejectionReason> {
    let fields = request.fields();

    if let Some(field) = fields
        .keys()
        .find(|k| k.as_str() != ITEMS_FIELD && k.as_str() != TAG_FIELD)
    {
        return Err(RejectionReason::UnknownField {
            field: field.clone(),
        });
    }

    let items = match fields.get(ITEMS_FIELD) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(RejectionReason::MissingItems),
    };

    match fields.get(TAG_FIELD) {
        None => return Err(RejectionReason::MissingTransactionTag),
        Some(Value::String(tag)) if tag.is_empty() => {}
        Some(_) => return Err(RejectionReason::UnexpectedTransactionTag),
    }

    let mut line_items = Vec::with_capacity(items.len());
    let mut receipt_lines = Vec::new();
    let mut total_minor: i64 = 0;
    let mut item_count: i64 = 0;

    for (index, item) in items.iter().enumerate() {
        let malformed = || RejectionReason::MalformedItem { index };
        let item = item.as_object().ok_or_else(malformed)?;
        let variant_id = item
            .get(VARIANT_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(malformed)?;
        let quantity = item
            .get(QUANTITY_FIELD)
            .and_then(integer)
            .ok_or_else(malformed)?;

        let catalog_item = snapshot
            .get(variant_id)
            .ok_or(RejectionReason::UnknownVariant { variant_id })?;
        if catalog_item.restricted {
            return Err(RejectionReason::RestrictedItem { variant_id });
        }
        if catalog_item.stock_status == StockStatus::OutOfStock {
            return Err(RejectionReason::OutOfStock { variant_id });
        }

        let invalid_quantity = RejectionReason::InvalidQuantity {
            variant_id,
            quantity,
        };
        if !(1..=MAX_UNITS_PER_LINE).contains(&quantity) {
            return Err(invalid_quantity);
        }
        total_minor = catalog_item
            .unit_price_minor
            .checked_mul(quantity)
            .and_then(|line_total| total_minor.checked_add(line_total))
            .ok_or(invalid_quantity)?;
        item_count += quantity;

        line_items.push(LineItem {
            variant_id,
            quantity,
            unit_price_minor: catalog_item.unit_price_minor,
        });
        for _ in 0..quantity {
            receipt_lines.push(ReceiptLine {
                variant_id,
                sku: catalog_item.sku.clone(),
                description: catalog_item.description.clone(),
                size_label: catalog_item.size_label.clone(),
                unit_price_minor: catalog_item.unit_price_minor,
            });
        }
    }

    receipt_lines.sort_by(|a, b| a.sku.cmp(&b.sku));

    Ok(ValidatedOrder {
        line_items,
        total_minor,
        item_count,
        receipt_lines,
    })
}
