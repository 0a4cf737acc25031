//! Writing results to disk.
//!
//! | Output | Format |
//! |--------|--------|
//! | KPI report | pretty JSON object |
//! | Trade ledger | CSV, one row per closed trade |
//! | Return series | CSV `date,return` |
//! | Scan ranking | CSV, or an `_empty` marker file |

use crate::error::Result;
use crate::scan::ScanRow;
use crate::types::{KpiReport, TimeSeries, TradeRecord};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of the marker written for a scan with no candidates.
pub const EMPTY_SCAN_MARKER: &str = "no candidates";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn create(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

/// Save a KPI report as a JSON object.
pub fn save_kpis_json(path: impl AsRef<Path>, report: &KpiReport) -> Result<()> {
    let file = create(path.as_ref())?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}

#[derive(Serialize)]
struct TradeRow<'a> {
    entry_date: String,
    exit_date: String,
    side: i8,
    entry_value: f64,
    exit_value: f64,
    pnl: f64,
    holding_days: i64,
    exit_reason: &'a str,
}

/// Save a trade ledger as CSV.
pub fn save_trades_csv(path: impl AsRef<Path>, trades: &[TradeRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create(path.as_ref())?);
    for t in trades {
        writer.serialize(TradeRow {
            entry_date: t.entry_date.format(DATE_FORMAT).to_string(),
            exit_date: t.exit_date.format(DATE_FORMAT).to_string(),
            side: t.side.sign() as i8,
            entry_value: t.entry_value,
            exit_value: t.exit_value,
            pnl: t.pnl,
            holding_days: t.holding_days,
            exit_reason: match t.exit_reason {
                crate::types::ExitReason::Reverted => "reverted",
                crate::types::ExitReason::Timeout => "timeout",
            },
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Save a dated return series as `date,return`.
pub fn save_returns_csv(path: impl AsRef<Path>, series: &TimeSeries) -> Result<()> {
    let mut writer = BufWriter::new(create(path.as_ref())?);
    writeln!(writer, "date,return")?;
    for (date, value) in series.iter() {
        writeln!(writer, "{},{}", date.format(DATE_FORMAT), value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Save ranked scan rows to `<dir>/<name>.csv`.
///
/// With no rows, writes `<dir>/<name>_empty.csv` holding [`EMPTY_SCAN_MARKER`]
/// instead. Returns the path written.
pub fn save_scan_csv(dir: impl AsRef<Path>, name: &str, rows: &[ScanRow]) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if rows.is_empty() {
        let path = dir.join(format!("{}_empty.csv", name));
        let mut file = create(&path)?;
        writeln!(file, "{}", EMPTY_SCAN_MARKER)?;
        info!("No candidates for {}; wrote {}", name, path.display());
        return Ok(path);
    }

    let path = dir.join(format!("{}.csv", name));
    let mut writer = csv::Writer::from_writer(create(&path)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(path)
}
