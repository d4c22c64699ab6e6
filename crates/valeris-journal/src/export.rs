// CSV export and import of journal trades.
//
// Export writes one row per closed trade. Import accepts the same columns
// plus optional `entry_time` / `exit_time` timestamps, and is forgiving:
// a malformed row is skipped and counted rather than failing the file.

use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;

use valeris_core::models::{Side, Trade};

use crate::stats::closed_by_exit;

pub const EXPORT_HEADER: [&str; 11] = [
    "date",
    "symbol",
    "side",
    "quantity",
    "entry_price",
    "exit_price",
    "fees",
    "pnl",
    "return_pct",
    "setup",
    "notes",
];

const REQUIRED_COLUMNS: [&str; 4] = ["symbol", "side", "quantity", "entry_price"];

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output is not valid UTF-8")]
    Encoding,

    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Render closed trades as CSV in exit-time order. Open trades are skipped.
pub fn export_csv(trades: &[Trade]) -> Result<String, CsvError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;

    for (trade, pnl, exit_time) in closed_by_exit(trades) {
        let exit_price = trade.exit_price.unwrap_or_default();
        writer.write_record([
            exit_time.format("%Y-%m-%d").to_string(),
            trade.symbol.clone(),
            trade.side.as_str().to_string(),
            trade.quantity.to_string(),
            format!("{:.2}", trade.entry_price),
            format!("{exit_price:.2}"),
            format!("{:.2}", trade.fees),
            format!("{pnl:.2}"),
            format!("{:.2}", trade.return_pct().unwrap_or_default()),
            trade.setup.clone().unwrap_or_default(),
            trade.notes.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| CsvError::Encoding)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ImportReport {
    pub trades: Vec<Trade>,
    pub skipped: usize,
    /// One message per skipped row, prefixed with its 1-based line number.
    pub errors: Vec<String>,
}

/// Parse trades for `user_id` from CSV. Only a missing required column or
/// an unreadable stream fails the whole import.
pub fn import_csv<R: Read>(reader: R, user_id: &str) -> Result<ImportReport, CsvError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns: HashMap<String, usize> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_ascii_lowercase(), i))
        .collect();
    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(CsvError::MissingColumn(required));
        }
    }

    let mut report = ImportReport::default();
    for (index, record) in rdr.records().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let parsed = record
            .map_err(|e| e.to_string())
            .and_then(|r| parse_row(&r, &columns, user_id));
        match parsed {
            Ok(trade) => report.trades.push(trade),
            Err(message) => {
                warn!(line, %message, "skipping malformed CSV row");
                report.skipped += 1;
                report.errors.push(format!("line {line}: {message}"));
            }
        }
    }
    Ok(report)
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &HashMap<String, usize>,
    user_id: &str,
) -> Result<Trade, String> {
    let field = |name: &str| -> Option<&str> {
        columns
            .get(name)
            .and_then(|&i| record.get(i))
            .filter(|v| !v.is_empty())
    };
    let number = |name: &str| -> Result<Option<f64>, String> {
        field(name)
            .map(|v| v.parse::<f64>().map_err(|_| format!("invalid {name} `{v}`")))
            .transpose()
    };

    let symbol = field("symbol").ok_or("missing symbol")?;
    let side_text = field("side").ok_or("missing side")?;
    let side = Side::from_order_action(side_text)
        .ok_or_else(|| format!("invalid side `{side_text}`"))?;
    let quantity = number("quantity")?.ok_or("missing quantity")?;
    let entry_price = number("entry_price")?.ok_or("missing entry_price")?;
    let exit_price = number("exit_price")?;

    let date = field("date")
        .map(|v| parse_timestamp(v).ok_or_else(|| format!("invalid date `{v}`")))
        .transpose()?;
    let entry_time = match field("entry_time") {
        Some(v) => parse_timestamp(v).ok_or_else(|| format!("invalid entry_time `{v}`"))?,
        None => date.ok_or("missing entry_time or date")?,
    };
    let exit_time = match field("exit_time") {
        Some(v) => Some(parse_timestamp(v).ok_or_else(|| format!("invalid exit_time `{v}`"))?),
        None if exit_price.is_some() => Some(date.unwrap_or(entry_time)),
        None => None,
    };

    let mut trade = Trade::open(user_id, symbol, side, quantity, entry_price, entry_time);
    trade.exit_price = exit_price;
    trade.exit_time = exit_time;
    trade.fees = number("fees")?.unwrap_or(0.0);
    trade.setup = field("setup").map(str::to_string);
    trade.notes = field("notes").map(str::to_string);

    trade.validate().map_err(|e| e.to_string())?;
    Ok(trade)
}

/// RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (UTC) or a bare date (midnight UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
