use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::domain::order::Receipt;
use crate::domain::ports::{PrinterError, ReceiptPrinter};

/// Characters available for the `SKU : SIZE ... $price` part of a row.
const ROW_WIDTH: usize = 23;
const RULE: &str = "================================================";
const TAX_NOTE: &str = "all prices include sales tax";

/// Formats minor units for display, e.g. `3500` as `35.00`.
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn receipt_row(sku: &str, size: &str, price_minor: i64) -> String {
    let item = format!("{sku} : {size}");
    let price = format_minor(price_minor);
    let pad = ROW_WIDTH.saturating_sub(item.chars().count() + price.len());
    format!("{item}{}${price}", " ".repeat(pad))
}

/// Plain-text rendering of the customer copy followed by the short stub.
pub fn render_receipt(receipt: &Receipt, printed_at: DateTime<Utc>) -> String {
    let mut out = Vec::new();
    out.push(format!("Order: {}", receipt.transaction_tag));
    out.push(format!(
        "on {} at {}",
        printed_at.format("%Y-%m-%d"),
        printed_at.format("%H:%M:%S")
    ));
    out.push(RULE.to_string());
    for line in &receipt.lines {
        out.push(receipt_row(&line.sku, &line.size_label, line.unit_price_minor));
        out.push(line.description.clone());
        out.push(String::new());
    }
    out.push(RULE.replace('=', "-"));
    out.push(format!("TOTAL: ${}", format_minor(receipt.total_minor)));
    out.push(TAX_NOTE.to_string());
    out.push(format!("QR: {}", receipt.qr_payload));
    out.push("--- cut ---".to_string());
    out.push(format!("Order: {}", receipt.transaction_tag));
    out.push(format!("Total: ${}", format_minor(receipt.total_minor)));
    out.push(format!("QR: {}", receipt.qr_payload));
    out.push(TAX_NOTE.to_string());
    out.push("--- cut ---".to_string());
    out.join("\n") + "\n"
}

/// Drops rendered receipts into a spool directory watched by the print daemon.
pub struct SpoolPrinter {
    dir: PathBuf,
}

impl SpoolPrinter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReceiptPrinter for SpoolPrinter {
    fn is_online(&self) -> bool {
        self.dir.is_dir()
    }

    fn print(&self, receipt: &Receipt) -> Result<(), PrinterError> {
        if !self.is_online() {
            return Err(PrinterError::Offline(format!(
                "spool directory {} is missing",
                self.dir.display()
            )));
        }

        // Written under a temporary name first so the daemon never sees half a receipt.
        let partial = self.dir.join(format!(".{}.partial", receipt.transaction_tag));
        let target = self.dir.join(format!("{}.txt", receipt.transaction_tag));

        let mut file = fs::File::create(&partial)?;
        file.write_all(render_receipt(receipt, Utc::now()).as_bytes())?;
        file.sync_all()?;
        fs::rename(&partial, &target)?;

        log::info!("receipt {} spooled to {}", receipt.transaction_tag, target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::order::ReceiptLine;

    fn receipt() -> Receipt {
        let line = ReceiptLine {
            variant_id: 7,
            sku: "TSHIRT".to_string(),
            description: "Logo shirt".to_string(),
            size_label: "XL".to_string(),
            unit_price_minor: 3500,
        };
        Receipt {
            transaction_tag: "S1-3".to_string(),
            total_minor: 7000,
            item_count: 2,
            lines: vec![line.clone(), line],
            qr_payload: r#"{"i":[{"q":2,"v":7}],"txn":"S1-3"}"#.to_string(),
        }
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor(3500), "35.00");
        assert_eq!(format_minor(1999), "19.99");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-250), "-2.50");
    }

    #[test]
    fn rows_are_padded_to_a_fixed_width() {
        let row = receipt_row("TSHIRT", "XL", 3500);
        assert_eq!(row, "TSHIRT : XL       $35.00");
        assert_eq!(row.len(), ROW_WIDTH + 1);
    }

    #[test]
    fn rendering_prints_one_row_per_unit() {
        let printed_at = Utc.with_ymd_and_hms(2024, 8, 9, 12, 0, 0).unwrap();
        let text = render_receipt(&receipt(), printed_at);

        assert_eq!(text.matches("TSHIRT : XL").count(), 2);
        assert!(text.contains("TOTAL: $70.00"));
        assert!(text.contains("on 2024-08-09 at 12:00:00"));
        assert_eq!(text.matches("S1-3\"}").count(), 2);
    }

    #[test]
    fn spools_receipt_file() {
        let dir = TempDir::new().expect("temp dir");
        let printer = SpoolPrinter::new(dir.path());

        assert!(printer.is_online());
        printer.print(&receipt()).expect("printed");

        let text = fs::read_to_string(dir.path().join("S1-3.txt")).expect("spooled");
        assert!(text.starts_with("Order: S1-3"));
        assert!(!dir.path().join(".S1-3.partial").exists());
    }

    #[test]
    fn missing_spool_directory_is_offline() {
        let dir = TempDir::new().expect("temp dir");
        let printer = SpoolPrinter::new(dir.path().join("absent"));

        assert!(!printer.is_online());
        assert!(matches!(
            printer.print(&receipt()),
            Err(PrinterError::Offline(_))
        ));
    }
}
