use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::catalog::VariantId;

pub type OrderId = i64;

/// Timestamp layout expected by the conference-management service (always UTC).
pub const REMOTE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S-00:00";

/// A sold variant with the price that was locked in when the order was validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub unit_price_minor: i64,
}

/// One physical unit as it appears on the printed receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReceiptLine {
    pub variant_id: VariantId,
    pub sku: String,
    pub description: String,
    pub size_label: String,
    pub unit_price_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub line_items: Vec<LineItem>,
    pub total_minor: i64,
    pub item_count: i64,
    /// One entry per physical unit, sorted by SKU.
    pub receipt_lines: Vec<ReceiptLine>,
}

/// An order as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub line_items: Vec<LineItem>,
    pub total_minor: i64,
    pub item_count: i64,
    pub synced: bool,
}

/// Who this station is, as far as the remote service is concerned.
#[derive(Clone)]
pub struct StationIdentity {
    pub device_id: String,
    pub conference_id: String,
    pub passcode: String,
    pub station: String,
}

impl StationIdentity {
    pub fn transaction_tag(&self, order_id: OrderId) -> String {
        format!("{}-{}", self.station, order_id)
    }
}

impl fmt::Debug for StationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationIdentity")
            .field("device_id", &self.device_id)
            .field("conference_id", &self.conference_id)
            .field("passcode", &"[REDACTED]")
            .field("station", &self.station)
            .finish()
    }
}

/// Finalized receipt handed to the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Receipt {
    pub transaction_tag: String,
    pub total_minor: i64,
    pub item_count: i64,
    pub lines: Vec<ReceiptLine>,
    /// The order request re-encoded with the assigned transaction tag.
    pub qr_payload: String,
}

impl Receipt {
    pub fn new(identity: &StationIdentity, order_id: OrderId, order: &ValidatedOrder) -> Self {
        let transaction_tag = identity.transaction_tag(order_id);
        let items: Vec<serde_json::Value> = order
            .line_items
            .iter()
            .map(|l| json!({ "v": l.variant_id, "q": l.quantity }))
            .collect();
        let qr_payload = json!({ "i": items, "txn": transaction_tag }).to_string();

        Self {
            transaction_tag,
            total_minor: order.total_minor,
            item_count: order.item_count,
            lines: order.receipt_lines.clone(),
            qr_payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub price_each_minor: i64,
}

/// Body of the remote `addtxn` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPayload {
    pub device_id: String,
    pub conference_id: String,
    pub passcode: String,
    pub timestamp: String,
    pub txn_num: String,
    pub items: Vec<TransactionItem>,
}

impl TransactionPayload {
    pub fn for_order(identity: &StationIdentity, order: &Order) -> Self {
        Self {
            device_id: identity.device_id.clone(),
            conference_id: identity.conference_id.clone(),
            passcode: identity.passcode.clone(),
            timestamp: order.created_at.format(REMOTE_TIMESTAMP_FORMAT).to_string(),
            txn_num: identity.transaction_tag(order.id),
            items: order
                .line_items
                .iter()
                .map(|l| TransactionItem {
                    variant_id: l.variant_id,
                    quantity: l.quantity,
                    price_each_minor: l.unit_price_minor,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn identity() -> StationIdentity {
        StationIdentity {
            device_id: "dev-1".to_string(),
            conference_id: "32".to_string(),
            passcode: "hunter2".to_string(),
            station: "S4".to_string(),
        }
    }

    fn validated() -> ValidatedOrder {
        ValidatedOrder {
            line_items: vec![LineItem {
                variant_id: 7,
                quantity: 2,
                unit_price_minor: 3500,
            }],
            total_minor: 7000,
            item_count: 2,
            receipt_lines: vec![],
        }
    }

    #[test]
    fn transaction_tag_combines_station_and_order_id() {
        assert_eq!(identity().transaction_tag(12), "S4-12");
    }

    #[test]
    fn debug_output_hides_passcode() {
        let rendered = format!("{:?}", identity());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn receipt_qr_payload_carries_assigned_tag() {
        let receipt = Receipt::new(&identity(), 5, &validated());

        let qr: serde_json::Value = serde_json::from_str(&receipt.qr_payload).expect("valid json");
        assert_eq!(qr["txn"], "S4-5");
        assert_eq!(qr["i"][0]["v"], 7);
        assert_eq!(qr["i"][0]["q"], 2);
        assert_eq!(receipt.transaction_tag, "S4-5");
        assert_eq!(receipt.total_minor, 7000);
    }

    #[test]
    fn transaction_payload_uses_locked_prices_and_remote_timestamp() {
        let order = Order {
            id: 9,
            created_at: Utc.with_ymd_and_hms(2024, 8, 9, 17, 3, 4).unwrap(),
            line_items: validated().line_items,
            total_minor: 7000,
            item_count: 2,
            synced: false,
        };

        let payload = TransactionPayload::for_order(&identity(), &order);

        assert_eq!(payload.timestamp, "2024-08-09 17:03:04-00:00");
        assert_eq!(payload.txn_num, "S4-9");
        assert_eq!(
            payload.items,
            vec![TransactionItem {
                variant_id: 7,
                quantity: 2,
                price_each_minor: 3500
            }]
        );

        let body = serde_json::to_value(&payload).expect("serializable");
        assert_eq!(body["items"][0]["price_each_minor"], 3500);
        assert_eq!(body["passcode"], "hunter2");
    }
}
