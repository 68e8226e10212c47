use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::nse::bias::{BiasRow, SubBias};
use crate::nse::call_log::Call;
use crate::nse::models::Instrument;
use crate::nse::state::{InstrumentSnapshot, TradeLogEntry};
use crate::utility::timing::timed;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Bias,
    TradeLog,
    CallLog,
}

impl ExportKind {
    fn label(&self) -> &'static str {
        match self {
            ExportKind::Bias => "bias",
            ExportKind::TradeLog => "trade_log",
            ExportKind::CallLog => "call_log",
        }
    }
}

/// `<instrument>_<kind>_<YYYYmmdd_HHMMSS>.csv`, instrument with spaces as `_`
pub fn export_file_name(instrument: Instrument, kind: ExportKind, at: DateTime<FixedOffset>) -> String {
    format!(
        "{}_{}_{}.csv",
        instrument.env_key(),
        kind.label(),
        at.format(FILE_STAMP_FORMAT)
    )
}

fn fmt_time(t: &DateTime<FixedOffset>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn write_bias_table<W: Write>(rows: &[BiasRow], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    let mut header = vec!["Strike", "Zone", "Level"];
    header.extend(SubBias::ALL.iter().map(|b| b.name()));
    header.extend(["BiasScore", "Verdict"]);
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.strike.to_string(), row.zone.to_string(), row.level.to_string()];
        record.extend(
            SubBias::ALL
                .iter()
                .map(|b| row.bias(*b).map(|v| v.to_string()).unwrap_or_default()),
        );
        record.push(format!("{:.2}", row.bias_score));
        record.push(row.verdict.to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush().context("Failed to flush bias table")?;
    Ok(())
}

pub fn write_trade_log<W: Write>(entries: &[TradeLogEntry], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["Time", "Strike", "Type", "Signal", "LTP", "Target", "SL", "Score", "Mode", "Reason"])?;

    for e in entries {
        wtr.write_record([
            fmt_time(&e.time),
            e.strike.to_string(),
            e.side.to_string(),
            e.signal_type.to_string(),
            e.ltp.to_string(),
            e.target.to_string(),
            e.stop_loss.to_string(),
            format!("{:.2}", e.score),
            e.mode.to_string(),
            e.reason.clone(),
        ])?;
    }

    wtr.flush().context("Failed to flush trade log")?;
    Ok(())
}

pub fn write_call_log<W: Write>(calls: &[Call], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record([
        "Strike",
        "Type",
        "Targets",
        "Stoploss",
        "Status",
        "Entry_Time",
        "Entry_Price",
        "Entry_Spot",
        "Exit_Time",
        "Exit_Price",
    ])?;

    let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();

    for c in calls {
        let targets = c
            .targets
            .iter()
            .map(|(label, price)| format!("{}={}", label, price))
            .collect::<Vec<_>>()
            .join(";");
        wtr.write_record([
            c.strike.to_string(),
            c.side.to_string(),
            targets,
            c.stoploss.to_string(),
            c.status.to_string(),
            fmt_time(&c.entry_time),
            opt(c.entry_price),
            opt(c.entry_spot),
            c.exit_time.as_ref().map(fmt_time).unwrap_or_default(),
            opt(c.exit_price),
        ])?;
    }

    wtr.flush().context("Failed to flush call log")?;
    Ok(())
}

/// Renders one table of a snapshot into a CSV string
pub fn render(snapshot: &InstrumentSnapshot, kind: ExportKind) -> Result<String> {
    let mut buf = Vec::new();
    match kind {
        ExportKind::Bias => write_bias_table(&snapshot.bias_table, &mut buf)?,
        ExportKind::TradeLog => write_trade_log(&snapshot.trade_log, &mut buf)?,
        ExportKind::CallLog => write_call_log(&snapshot.call_log, &mut buf)?,
    }
    String::from_utf8(buf).context("CSV output is not UTF-8")
}

/// Writes bias table, trade log and call log into `dir`
pub fn export_snapshot(
    snapshot: &InstrumentSnapshot,
    dir: &Path,
    at: DateTime<FixedOffset>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export dir {}", dir.display()))?;

    let mut written = Vec::new();
    for kind in [ExportKind::Bias, ExportKind::TradeLog, ExportKind::CallLog] {
        let path = dir.join(export_file_name(snapshot.instrument, kind, at));
        let csv = timed(format!("{} {} export", snapshot.instrument, kind.label()), || {
            render(snapshot, kind)
        })?;
        std::fs::write(&path, csv).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
