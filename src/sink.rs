// src/sink.rs
//! Append-only CSV persistence. One header write at creation, then streamed
//! row appends serialized by an async mutex so concurrent tasks never
//! interleave inside a row. Flush per append: rows survive a mid-run kill.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::harvest::types::{DropReason, HarvestRecord, HarvestTask};

/// Fixed output column order.
pub const RESULT_HEADER: [&str; 7] = [
    "SignalID",
    "StartDate",
    "EndDate",
    "WestboundVolume",
    "EastboundVolume",
    "NorthboundVolume",
    "SouthboundVolume",
];

const LEDGER_HEADER: [&str; 4] = ["SignalID", "StartDate", "EndDate", "Reason"];

fn volume_field(v: Option<u32>) -> String {
    // Missing readings serialize as an empty field, not a "null" literal.
    v.map(|n| n.to_string()).unwrap_or_default()
}

fn create_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<File>> {
    let file =
        File::create(path).with_context(|| format!("creating output file {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer
        .write_record(header)
        .and_then(|()| writer.flush().map_err(Into::into))
        .with_context(|| format!("writing header to {}", path.display()))?;
    Ok(writer)
}

/// The result sink: one header row, then one row per recorded task.
pub struct CsvSink {
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    /// Truncate `path` and write the header, before any task can append.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(create_writer(path, &RESULT_HEADER)?),
        })
    }

    /// Append one record. Callable from many concurrent tasks.
    pub async fn append(&self, record: &HarvestRecord) -> Result<()> {
        let row = [
            record.task.signal_id.clone(),
            record.task.start_str(),
            record.task.end_str(),
            volume_field(record.reading.westbound),
            volume_field(record.reading.eastbound),
            volume_field(record.reading.northbound),
            volume_field(record.reading.southbound),
        ];
        let mut writer = self.writer.lock().await;
        writer.write_record(&row).context("appending output row")?;
        writer.flush().context("flushing output row")?;
        Ok(())
    }
}

/// Replay ledger for dropped tasks, same single-writer discipline as the sink.
pub struct FailureLedger {
    writer: Mutex<csv::Writer<File>>,
}

impl FailureLedger {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(create_writer(path, &LEDGER_HEADER)?),
        })
    }

    pub async fn append(&self, task: &HarvestTask, reason: DropReason) -> Result<()> {
        let row = [
            task.signal_id.clone(),
            task.start_str(),
            task.end_str(),
            reason.to_string(),
        ];
        let mut writer = self.writer.lock().await;
        writer.write_record(&row).context("appending ledger row")?;
        writer.flush().context("flushing ledger row")?;
        Ok(())
    }
}
