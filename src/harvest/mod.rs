// src/harvest/mod.rs
//! The harvesting coordinator: builds the (signal × interval) task set, fans
//! tasks out under a semaphore admission gate in fixed-size batches, and
//! streams each extracted record to the CSV sink. Per-task failures are
//! contained at the task boundary; only setup failures abort the run.

pub mod config;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::extract;
use crate::intervals;
use crate::signals;
use crate::sink::{CsvSink, FailureLedger};
use crate::transport::{xhr_headers, Transport, TransportError};

use config::HarvestConfig;
use types::{DropReason, HarvestRecord, HarvestSummary, HarvestTask, TaskOutcome};

/// One harvest request as supplied by the CLI or wrapper-service collaborator.
#[derive(Debug, Clone)]
pub struct HarvestJob {
    /// Delimited text file whose first field per line is a signal id.
    pub signal_file: PathBuf,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub interval_minutes: u32,
}

/// Everything a spawned task needs, shared behind one Arc.
struct RunContext {
    cfg: HarvestConfig,
    transport: Transport,
    headers: HeaderMap,
    sink: CsvSink,
    ledger: FailureLedger,
}

/// Run a harvest to completion. Output lands in `<stem>_data.csv` (and dropped
/// tasks in `<stem>_failed.csv`) next to the signal file; the return value
/// carries terminal counts only.
///
/// Pass `transport` to reuse a warm session; `None` builds one from `cfg`.
pub async fn run(
    job: &HarvestJob,
    cfg: HarvestConfig,
    transport: Option<Transport>,
) -> Result<HarvestSummary> {
    let signal_ids = signals::load_signal_ids(&job.signal_file)?;
    info!(
        count = signal_ids.len(),
        file = %job.signal_file.display(),
        "loaded signal ids"
    );

    let tiled = intervals::tile(job.start, job.end, job.interval_minutes);
    info!(
        count = tiled.len(),
        interval_minutes = job.interval_minutes,
        "tiled time range"
    );

    let tasks: Vec<HarvestTask> = signal_ids
        .iter()
        .flat_map(|id| {
            tiled.iter().map(move |(start, end)| HarvestTask {
                signal_id: id.clone(),
                interval_start: *start,
                interval_end: *end,
            })
        })
        .collect();
    info!(count = tasks.len(), "built harvest task set");

    let output_path = signals::output_path_for(&job.signal_file);
    let ledger_path = signals::ledger_path_for(&job.signal_file);
    // Header rows are on disk before any task dispatch.
    let sink = CsvSink::create(&output_path)?;
    let ledger = FailureLedger::create(&ledger_path)?;

    let transport = match transport {
        Some(t) => t,
        None => Transport::new(
            cfg.call_timeout(),
            cfg.pool_max_idle_per_host,
            cfg.retry_policy(),
        )?,
    };

    // Fatal setup check: the portal must answer before anything is dispatched.
    transport
        .probe(&cfg.portal_root)
        .await
        .context("portal liveness probe failed")?;
    info!(url = %cfg.portal_root, "portal reachable, dispatching");

    let origin = portal_origin(&cfg.portal_root)?;
    let headers = xhr_headers(&origin, &cfg.portal_root)?;

    let ctx = Arc::new(RunContext {
        cfg,
        transport,
        headers,
        sink,
        ledger,
    });
    let gate = Arc::new(Semaphore::new(ctx.cfg.concurrency));

    let mut summary = HarvestSummary::default();
    let batch_size = ctx.cfg.batch_size.max(1);
    let total_batches = tasks.len().div_ceil(batch_size).max(1);

    for (batch_no, batch) in tasks.chunks(batch_size).enumerate() {
        let mut set = JoinSet::new();
        for task in batch {
            let ctx = ctx.clone();
            let gate = gate.clone();
            let task = task.clone();
            set.spawn(async move {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .expect("admission gate closed");
                tokio::time::sleep(ctx.cfg.task_jitter()).await;
                run_task(&ctx, task).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(TaskOutcome::Recorded) => summary.recorded += 1,
                Ok(TaskOutcome::Dropped(_)) => summary.dropped += 1,
                Err(e) => {
                    // A panicked task loses its row; siblings are unaffected.
                    error!(error = ?e, "harvest task aborted");
                    summary.dropped += 1;
                }
            }
        }

        debug!(
            batch = batch_no + 1,
            of = total_batches,
            recorded = summary.recorded,
            dropped = summary.dropped,
            "batch settled"
        );
        if batch_no + 1 < total_batches {
            // Courtesy pause between batches; has no correctness role.
            tokio::time::sleep(ctx.cfg.batch_pause()).await;
        }
    }

    info!(
        recorded = summary.recorded,
        dropped = summary.dropped,
        output = %output_path.display(),
        "harvest finished"
    );
    Ok(summary)
}

/// Drive one task from InFlight to Recorded or Dropped. Never errors out:
/// every failure is logged, ledgered, and folded into the outcome.
async fn run_task(ctx: &RunContext, task: HarvestTask) -> TaskOutcome {
    info!(
        signal = %task.signal_id,
        start = %task.start_str(),
        end = %task.end_str(),
        "fetching approach volume"
    );

    let form = metric_form(&ctx.cfg, &task);
    let response = ctx
        .transport
        .post_form_with_retry(&ctx.cfg.metric_url, &form, &ctx.headers)
        .await;

    let body = match response {
        Ok(resp) => match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = ?e, signal = %task.signal_id, "response body read failed");
                return drop_task(ctx, task, DropReason::BodyRead).await;
            }
        },
        Err(TransportError::Terminal { status }) => {
            return drop_task(ctx, task, DropReason::TerminalStatus(status.as_u16())).await;
        }
        Err(TransportError::RetriesExhausted { attempts }) => {
            return drop_task(ctx, task, DropReason::RetriesExhausted(attempts)).await;
        }
    };

    let reading = extract::extract(&body);
    if reading.is_empty() {
        // Still recorded: a placeholder row beats a silent gap.
        debug!(signal = %task.signal_id, "no volume tables in response");
    }

    let record = HarvestRecord { task, reading };
    match ctx.sink.append(&record).await {
        Ok(()) => {
            info!(signal = %record.task.signal_id, start = %record.task.start_str(), "recorded");
            TaskOutcome::Recorded
        }
        Err(e) => {
            error!(error = ?e, signal = %record.task.signal_id, "output write failed");
            drop_task(ctx, record.task, DropReason::SinkWrite).await
        }
    }
}

async fn drop_task(ctx: &RunContext, task: HarvestTask, reason: DropReason) -> TaskOutcome {
    error!(
        signal = %task.signal_id,
        start = %task.start_str(),
        end = %task.end_str(),
        %reason,
        "task dropped"
    );
    if let Err(e) = ctx.ledger.append(&task, reason).await {
        warn!(error = ?e, "failure ledger write failed");
    }
    TaskOutcome::Dropped(reason)
}

/// Form body for the approach-volume metric endpoint, matching the portal's
/// chart request shape.
fn metric_form(cfg: &HarvestConfig, task: &HarvestTask) -> Vec<(&'static str, String)> {
    vec![
        ("SignalID", task.signal_id.clone()),
        ("StartDate", task.start_str()),
        ("EndDate", task.end_str()),
        ("MetricTypeID", cfg.metric_type_id.clone()),
        ("SelectedBinSize", cfg.bin_size.clone()),
        ("ShowTotalVolume", "true".to_string()),
        ("ShowNbEbVolume", "true".to_string()),
        ("ShowSbWbVolume", "true".to_string()),
        ("ShowTMCDetection", "true".to_string()),
        ("ShowAdvanceDetection", "true".to_string()),
        ("ShowDirectionalSplits", "true".to_string()),
    ]
}

fn portal_origin(portal_root: &str) -> Result<String> {
    let url = reqwest::Url::parse(portal_root)
        .with_context(|| format!("parsing portal root url {portal_root}"))?;
    Ok(url.origin().ascii_serialization())
}
