//! `kta`: Kraken trade analyzer.
//!
//! Pulls the account's private trade history, folds it into per-pair FIFO
//! ledgers, optionally shrinks remaining inventory to reconcile with
//! activity elsewhere, then values what is left against current ticker
//! prices. Output is a console table plus a CSV file.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kta_kraken::{Credentials, KrakenClient, PriceMode, PriceSource, TradeSource};
use kta_ledger::{parse_decimal, valuation, BookConfig, LedgerBook};
use kta_report::{render_table, write_csv};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PriceModeArg {
    /// Last traded price
    Last,
    /// Bid/ask midpoint
    Mid,
}

impl From<PriceModeArg> for PriceMode {
    fn from(mode: PriceModeArg) -> Self {
        match mode {
            PriceModeArg::Last => PriceMode::Last,
            PriceModeArg::Mid => PriceMode::Mid,
        }
    }
}

#[derive(Parser)]
#[command(name = "kta")]
#[command(about = "Kraken trade analyzer: per-pair FIFO PnL and average prices", long_about = None)]
struct Cli {
    /// Analyze only these quote currencies (repeatable), e.g. --quote USD
    #[arg(long = "quote", value_name = "QUOTE")]
    quotes: Vec<String>,

    /// Keep fees out of buy cost and sell proceeds
    #[arg(long)]
    no_fees_in_cost: bool,

    /// Price used for unrealized PnL
    #[arg(long, value_enum, default_value_t = PriceModeArg::Last)]
    price_mode: PriceModeArg,

    /// Shrink a pair's remaining inventory to a target volume, e.g.
    /// --adjust BTC/USD=0.25 (repeatable; use 0 when fully sold elsewhere)
    #[arg(long = "adjust", value_name = "BASE/QUOTE=TARGET")]
    adjustments: Vec<String>,

    /// CSV output path
    #[arg(long, value_name = "PATH", default_value = "kraken_trade_averages.csv")]
    csv_out: PathBuf,

    /// Skip the CSV export
    #[arg(long)]
    no_csv: bool,
}

/// Parse one `--adjust BASE/QUOTE=TARGET` argument.
fn parse_adjustment(arg: &str) -> Result<(String, String, Decimal)> {
    let malformed = || anyhow!("expected BASE/QUOTE=TARGET, got '{arg}'");
    let (pair, target) = arg.split_once('=').ok_or_else(malformed)?;
    let (base, quote) = pair.split_once('/').ok_or_else(malformed)?;
    let base = base.trim().to_uppercase();
    let quote = quote.trim().to_uppercase();
    if base.is_empty() || quote.is_empty() {
        return Err(malformed());
    }
    let target = parse_decimal(target)
        .ok_or_else(|| anyhow!("adjustment target is not a number: '{arg}'"))?;
    Ok((base, quote, target))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let creds = Credentials::from_env()
        .context("set KRAKEN_KEY and KRAKEN_SECRET (use a query-only API key)")?;
    let client = KrakenClient::new(creds);

    println!("Fetching trades from Kraken (read-only)...");
    let trades = client.fetch_all_trades().await?;
    println!("Fetched {} trades.", trades.len());

    let quote_filter = if cli.quotes.is_empty() {
        None
    } else {
        Some(
            cli.quotes
                .iter()
                .map(|q| q.trim().to_uppercase())
                .collect::<BTreeSet<_>>(),
        )
    };
    let mut book = LedgerBook::new(BookConfig {
        include_fees_in_cost: !cli.no_fees_in_cost,
        quote_filter,
    });

    let stats = book.apply_all(&trades);
    if stats.skipped_malformed > 0 {
        warn!(
            skipped = stats.skipped_malformed,
            "skipped malformed trade records"
        );
    }
    if stats.oversold > 0 {
        warn!(
            records = stats.oversold,
            "sells exceeded recorded inventory; history may be missing buys"
        );
    }

    for arg in &cli.adjustments {
        let (base, quote, target) = parse_adjustment(arg)?;
        book.shrink_pair(&base, &quote, target)
            .map_err(|e| anyhow!("--adjust {arg}: {e}"))?;
        info!(%base, %quote, %target, "adjusted remaining inventory");
    }

    let pair_ids: Vec<String> = book
        .ledgers()
        .map(|(_, ledger)| ledger.pair_identifier().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    let prices = client
        .fetch_prices(&pair_ids, cli.price_mode.into())
        .await?;

    let reports = valuation::compute(&book, &prices);
    println!("{}", render_table(&reports));

    if !cli.no_csv && !reports.is_empty() {
        write_csv(&reports, &cli.csv_out)?;
        println!("Wrote {}", cli.csv_out.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn adjustment_arg_parses_pair_and_target() {
        let (base, quote, target) = parse_adjustment("btc/usd=0.25").unwrap();
        assert_eq!(base, "BTC");
        assert_eq!(quote, "USD");
        assert_eq!(target, dec!(0.25));
    }

    #[test]
    fn adjustment_arg_without_separator_is_rejected() {
        assert!(parse_adjustment("BTCUSD=1").is_err());
        assert!(parse_adjustment("BTC/USD").is_err());
        assert!(parse_adjustment("/USD=1").is_err());
    }

    #[test]
    fn adjustment_arg_with_bad_target_is_rejected() {
        let err = parse_adjustment("BTC/USD=lots").unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn negative_adjustment_targets_parse_here_and_fail_at_the_book() {
        // The book's validated boundary owns the rejection.
        let (_, _, target) = parse_adjustment("BTC/USD=-1").unwrap();
        let mut book = LedgerBook::new(BookConfig::fees_in_cost());
        assert!(book.shrink_pair("BTC", "USD", target).is_err());
    }
}
