//! kta-report
//!
//! Presentation of valuation output: a fixed-width console table and a CSV
//! file with the same columns. This crate only renders; every figure
//! arrives as an exact decimal and leaves as text.

use std::path::Path;

use anyhow::{Context, Result};

use kta_ledger::PairReport;

/// Column order for both the table and the CSV export.
const HEADERS: [&str; 13] = [
    "asset",
    "quote",
    "total_bought",
    "avg_buy_price",
    "total_sold",
    "avg_sell_price",
    "net_from_history",
    "remaining_unsold_volume",
    "avg_buy_price_of_remaining",
    "fees_total",
    "realized_pnl",
    "current_price",
    "unrealized_pnl",
];

fn row_values(report: &PairReport) -> [String; 13] {
    [
        report.asset.clone(),
        report.quote.clone(),
        report.total_bought.to_string(),
        report.avg_buy_price.to_string(),
        report.total_sold.to_string(),
        report.avg_sell_price.to_string(),
        report.net_from_history.to_string(),
        report.remaining_unsold_volume.to_string(),
        report.avg_buy_price_of_remaining.to_string(),
        report.fees_total.to_string(),
        report.realized_pnl.to_string(),
        report.current_price.to_string(),
        report.unrealized_pnl.to_string(),
    ]
}

/// Render the per-pair reports as a width-aligned table.
///
/// Returns `"No trades found."` for an empty report list so drivers can
/// print the result unconditionally.
pub fn render_table(reports: &[PairReport]) -> String {
    if reports.is_empty() {
        return "No trades found.".to_string();
    }

    let rows: Vec<[String; 13]> = reports.iter().map(row_values).collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, value) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(value.len());
        }
    }

    let format_line = |values: &[String]| -> String {
        values
            .iter()
            .zip(widths.iter())
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let header_values: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    let header = format_line(&header_values);
    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&"-".repeat(header.len()));
    for row in &rows {
        out.push('\n');
        out.push_str(&format_line(row));
    }
    out
}

/// Write the per-pair reports as CSV with the table's column order.
pub fn write_csv(reports: &[PairReport], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create csv at {}", path.display()))?;
    for report in reports {
        writer
            .serialize(report)
            .context("serialize report row to csv")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn report(asset: &str, quote: &str) -> PairReport {
        PairReport {
            asset: asset.to_string(),
            quote: quote.to_string(),
            total_bought: dec!(1.0),
            avg_buy_price: dec!(9009),
            total_sold: dec!(0.4),
            avg_sell_price: dec!(9990),
            net_from_history: dec!(0.6),
            remaining_unsold_volume: dec!(0.6),
            avg_buy_price_of_remaining: dec!(9009),
            fees_total: dec!(13),
            realized_pnl: dec!(392.4),
            current_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn empty_report_renders_placeholder() {
        assert_eq!(render_table(&[]), "No trades found.");
    }

    #[test]
    fn table_has_header_separator_and_aligned_rows() {
        let out = render_table(&[report("BTC", "USD"), report("ETHEREUM", "USD")]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);

        assert!(lines[0].starts_with("asset"));
        assert!(lines[0].contains("unrealized_pnl"));
        assert_eq!(lines[1], "-".repeat(lines[0].len()));
        // Every row is padded to the same shape.
        assert_eq!(lines[2].matches(" | ").count(), 12);
        assert_eq!(lines[3].matches(" | ").count(), 12);
        // The asset column is padded to the widest value ("ETHEREUM", 8).
        let expected_btc = format!("{:<8} |", "BTC");
        let expected_eth = format!("{:<8} |", "ETHEREUM");
        assert!(lines[2].starts_with(&expected_btc));
        assert!(lines[3].starts_with(&expected_eth));
    }

    #[test]
    fn table_renders_decimal_values_as_text() {
        let out = render_table(&[report("BTC", "USD")]);
        assert!(out.contains("392.4"));
        assert!(out.contains("9990"));
    }

    #[test]
    fn csv_round_trips_header_order_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_csv(&[report("BTC", "USD")], &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), HEADERS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("BTC,USD,1.0,9009,"));
        assert!(row.contains("392.4"));
    }

    #[test]
    fn csv_with_no_rows_still_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&[], &path).unwrap();
        assert!(path.exists());
    }
}
