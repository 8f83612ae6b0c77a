// src/harvest/types.rs
use chrono::NaiveDateTime;

/// Textual timestamp format used by the portal and in output rows.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// One unit of work: a signal queried over one tiled interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestTask {
    pub signal_id: String,
    pub interval_start: NaiveDateTime,
    pub interval_end: NaiveDateTime,
}

impl HarvestTask {
    pub fn start_str(&self) -> String {
        self.interval_start.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.interval_end.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Four directional totals; a direction is `None` when the portal did not
/// report it or the reported value did not parse as a non-negative integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeReading {
    pub westbound: Option<u32>,
    pub eastbound: Option<u32>,
    pub northbound: Option<u32>,
    pub southbound: Option<u32>,
}

impl VolumeReading {
    pub fn is_empty(&self) -> bool {
        self.westbound.is_none()
            && self.eastbound.is_none()
            && self.northbound.is_none()
            && self.southbound.is_none()
    }
}

/// The unit written to the sink: one row per task that reached extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRecord {
    pub task: HarvestTask,
    pub reading: VolumeReading,
}

/// Why a task produced no output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Non-retryable response status from the portal.
    TerminalStatus(u16),
    /// Retryable failures persisted across every allowed attempt.
    RetriesExhausted(u32),
    /// The response body could not be read after a successful status.
    BodyRead,
    /// The row could not be appended to the output file.
    SinkWrite,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::TerminalStatus(status) => write!(f, "terminal status {status}"),
            DropReason::RetriesExhausted(attempts) => {
                write!(f, "retries exhausted after {attempts} attempts")
            }
            DropReason::BodyRead => write!(f, "response body read failed"),
            DropReason::SinkWrite => write!(f, "output write failed"),
        }
    }
}

/// Terminal state of one task: `Pending → InFlight → {Recorded, Dropped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Recorded,
    Dropped(DropReason),
}

/// Terminal counts for a whole run. Carries no harvested data; rows land in
/// the output file as a side effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HarvestSummary {
    pub recorded: usize,
    pub dropped: usize,
}
