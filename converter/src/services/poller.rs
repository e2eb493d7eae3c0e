//! The ingestion control loop.
//!
//! Each cycle lists the raw zone, keeps inputs that carry neither a
//! completion nor a quarantine marker, converts them one at a time and marks
//! each one that converted. The completion marker is the only record of
//! progress: an input without one is converted again on the next cycle.

use chrono::{DateTime, Utc};
use common::config::PipelineConfig;
use common::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::converter::{ConversionReport, ShipmentConverter};
use crate::storage::s3::ObjectStorage;

/// Body of a `.done` marker. Only the marker's existence is ever read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub input: String,
    pub rows: usize,
    pub partitions: Vec<String>,
    pub files: Vec<String>,
    pub synced: bool,
    pub completed_at: DateTime<Utc>,
}

/// Body of a `.failed` marker for an input that was given up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub input: String,
    pub error: String,
    pub attempts: u32,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputOutcome {
    Converted,
    Skipped,
    Failed,
    Quarantined,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub eligible: usize,
    pub converted: usize,
    /// Inputs rejected for their content and left for a later cycle.
    pub skipped: usize,
    pub failed: usize,
    pub quarantined: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: InputOutcome) {
        match outcome {
            InputOutcome::Converted => self.converted += 1,
            InputOutcome::Skipped => self.skipped += 1,
            InputOutcome::Failed => self.failed += 1,
            InputOutcome::Quarantined => self.quarantined += 1,
        }
    }
}

pub struct Poller {
    storage: Arc<dyn ObjectStorage>,
    converter: ShipmentConverter,
    poll_interval: Duration,
    max_attempts: Option<u32>,
    attempts: DashMap<String, u32>,
}

impl Poller {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        converter: ShipmentConverter,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            storage,
            converter,
            poll_interval: pipeline.poll_interval(),
            max_attempts: pipeline.max_attempts,
            attempts: DashMap::new(),
        }
    }

    pub fn converter(&self) -> &ShipmentConverter {
        &self.converter
    }

    /// Polls until `shutdown` is cancelled. Cycle errors are logged and the
    /// loop carries on.
    pub async fn run(&self, shutdown: CancellationToken) {
        let layout = self.converter.layout();
        info!(
            raw_zone = %format!("s3://{}/{}", layout.bucket(), layout.raw_prefix()),
            interval_secs = self.poll_interval.as_secs(),
            "Poller started"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, poller stopping");
                break;
            }

            match self.run_cycle(&shutdown).await {
                Ok(report) if report.eligible > 0 => info!(
                    eligible = report.eligible,
                    converted = report.converted,
                    skipped = report.skipped,
                    failed = report.failed,
                    quarantined = report.quarantined,
                    "Poll cycle complete"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Poll cycle failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during poll wait");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Runs one `list → filter → convert → mark` pass.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if shutdown.is_cancelled() {
            return Ok(report);
        }

        let inputs = self.eligible_inputs().await?;
        report.eligible = inputs.len();

        for input_key in inputs {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, leaving remaining inputs for the next run");
                break;
            }
            let outcome = self.process_input(&input_key).await;
            report.record(outcome);
        }

        Ok(report)
    }

    /// Inputs in the raw zone with neither a completion nor a quarantine
    /// marker, in key order. The listing cache is dropped first so inputs
    /// that landed since the last cycle are seen.
    pub async fn eligible_inputs(&self) -> Result<Vec<String>> {
        let layout = self.converter.layout();
        self.storage.invalidate_listing_cache(layout.raw_prefix());

        let mut inputs = Vec::new();
        for key in self.storage.list_objects(layout.raw_prefix()).await? {
            if !layout.is_input(&key) {
                continue;
            }
            if self.storage.check_file_exists(&layout.build_marker_key(&key)).await? {
                continue;
            }
            if self.storage.check_file_exists(&layout.build_quarantine_key(&key)).await? {
                continue;
            }
            inputs.push(key);
        }

        inputs.sort();
        Ok(inputs)
    }

    async fn process_input(&self, input_key: &str) -> InputOutcome {
        match self.converter.convert(input_key).await {
            Ok(conversion) => match self.mark_complete(input_key, &conversion).await {
                Ok(()) => {
                    self.attempts.remove(input_key);
                    InputOutcome::Converted
                }
                Err(e) => {
                    error!(input = input_key, error = %e, "Failed to write completion marker");
                    InputOutcome::Failed
                }
            },
            Err(e) if e.is_input_error() => {
                warn!(input = input_key, error = %e, "Input rejected, skipping");
                match self.record_input_failure(input_key, &e).await {
                    Ok(true) => InputOutcome::Quarantined,
                    Ok(false) => InputOutcome::Skipped,
                    Err(marker_error) => {
                        error!(input = input_key, error = %marker_error, "Failed to quarantine input");
                        InputOutcome::Skipped
                    }
                }
            }
            Err(e) => {
                error!(input = input_key, error = %e, "Conversion failed");
                InputOutcome::Failed
            }
        }
    }

    async fn mark_complete(&self, input_key: &str, conversion: &ConversionReport) -> Result<()> {
        let marker_key = self.converter.layout().build_marker_key(input_key);
        let record = CompletionRecord {
            input: conversion.input.clone(),
            rows: conversion.rows,
            partitions: conversion.files.iter().map(|f| f.partition.clone()).collect(),
            files: conversion.files.iter().map(|f| f.key.clone()).collect(),
            synced: conversion.synced,
            completed_at: Utc::now(),
        };

        self.storage
            .put_object(&marker_key, &serde_json::to_vec_pretty(&record)?)
            .await?;
        info!(input = input_key, marker = %marker_key, "Completion marker created");
        Ok(())
    }

    /// Counts an input-level failure and quarantines the input once the
    /// configured limit is reached. Returns whether it was quarantined.
    async fn record_input_failure(&self, input_key: &str, error: &Error) -> Result<bool> {
        let Some(max_attempts) = self.max_attempts else {
            return Ok(false);
        };

        let attempts = {
            let mut entry = self.attempts.entry(input_key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempts < max_attempts {
            return Ok(false);
        }

        let quarantine_key = self.converter.layout().build_quarantine_key(input_key);
        let record = QuarantineRecord {
            input: input_key.to_string(),
            error: error.to_string(),
            attempts,
            quarantined_at: Utc::now(),
        };
        self.storage
            .put_object(&quarantine_key, &serde_json::to_vec_pretty(&record)?)
            .await?;
        self.attempts.remove(input_key);

        warn!(
            input = input_key,
            marker = %quarantine_key,
            attempts,
            "Input quarantined"
        );
        Ok(true)
    }
}
