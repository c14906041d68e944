//! Pipeline orchestrator - drives one enrichment run end to end.
//!
//! ```text
//! Init -> LoadingCheckpoint -> Authenticating -> Processing -> Finalizing -> Done
//!                                      \______________\____________\____> Failed
//! ```
//!
//! Authenticating and Processing are skipped when the checkpoint already
//! covers every record, so a finished run can be repeated without a single
//! remote call. Batches run strictly in sequence.

mod batch;
mod report;

pub use batch::{Batch, partition};
pub use report::{RunReport, RunStats};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::dataset::{self, IdentifierColumn};
use crate::enrichment::{
    BatchFetcher, ClientCredentials, EnrichedRecord, EnrichmentManifest, Features, FetchResult,
    MetadataApi, Record, RecordKey, RetryPolicy, TokenManager, TrackId, merge,
};
use crate::error::{Error, Result, ResultExt};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    LoadingCheckpoint,
    Authenticating,
    Processing,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
struct AnalysisOptions {
    enabled: bool,
    max_tracks: Option<usize>,
    delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
struct RunOptions {
    batch_size: usize,
    batch_delay: Duration,
    checkpoint_every: usize,
    checkpoint_path: Option<PathBuf>,
    resume: bool,
    id_candidates: Vec<String>,
    analysis: AnalysisOptions,
}

/// Configures an [`Orchestrator`] from [`Config`] plus per-run overrides.
#[derive(Debug, Clone)]
pub struct OrchestratorBuilder {
    options: RunOptions,
    policy: RetryPolicy,
    safety_margin: Duration,
    manifest: EnrichmentManifest,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl OrchestratorBuilder {
    pub fn from_config(config: &Config) -> Self {
        Self {
            options: RunOptions {
                batch_size: config.pipeline.batch_size,
                batch_delay: Duration::from_millis(config.pipeline.batch_delay_ms),
                checkpoint_every: config.pipeline.checkpoint_every,
                checkpoint_path: None,
                resume: config.pipeline.resume,
                id_candidates: config.fields.id_candidates.clone(),
                analysis: AnalysisOptions {
                    enabled: config.analysis.enabled,
                    max_tracks: config.analysis.max_tracks,
                    delay: Duration::from_millis(config.analysis.delay_ms),
                },
            },
            policy: config.retry.policy(),
            safety_margin: Duration::from_secs(config.auth.token_safety_margin_secs),
            manifest: config.fields.manifest(),
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.options.batch_size = size;
        self
    }

    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.options.batch_delay = delay;
        self
    }

    pub fn checkpoint_every(mut self, records: usize) -> Self {
        self.options.checkpoint_every = records;
        self
    }

    /// Keep progress somewhere other than the output file.
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.checkpoint_path = Some(path.into());
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.options.resume = resume;
        self
    }

    pub fn analysis(mut self, enabled: bool) -> Self {
        self.options.analysis.enabled = enabled;
        self
    }

    pub fn max_analysis(mut self, max_tracks: Option<usize>) -> Self {
        self.options.analysis.max_tracks = max_tracks;
        self
    }

    pub fn analysis_delay(mut self, delay: Duration) -> Self {
        self.options.analysis.delay = delay;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn manifest(mut self, manifest: EnrichmentManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn id_candidates(mut self, candidates: Vec<String>) -> Self {
        self.options.id_candidates = candidates;
        self
    }

    pub fn build(self, api: Arc<dyn MetadataApi>, credentials: ClientCredentials) -> Orchestrator {
        let tokens = TokenManager::new(api.clone(), credentials).with_safety_margin(self.safety_margin);
        Orchestrator {
            fetcher: BatchFetcher::new(api, tokens, self.manifest, self.policy),
            options: self.options,
            state: PipelineState::Init,
        }
    }
}

/// Runs the enrichment pipeline over one input file.
pub struct Orchestrator {
    fetcher: BatchFetcher,
    options: RunOptions,
    state: PipelineState,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Enrich `input` into `output`.
    ///
    /// Per-record and per-batch failures are counted in the report. Errors
    /// are returned only for bad input, credential failures and output
    /// write failures; the state is then [`PipelineState::Failed`].
    pub async fn run(&mut self, input: &Path, output: &Path) -> Result<RunReport> {
        let result = self.execute(input, output).await;
        if let Err(e) = &result {
            tracing::error!(target: "pipeline", state = ?self.state, error = %e, "Run failed");
            self.state = PipelineState::Failed;
        }
        result
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(target: "pipeline", from = ?self.state, to = ?next, "State change");
        self.state = next;
    }

    async fn execute(&mut self, input: &Path, output: &Path) -> Result<RunReport> {
        let started_at = Utc::now();
        self.transition(PipelineState::Init);

        let dataset = dataset::read(input).with_context(format!("reading {}", input.display()))?;
        let checkpoint_path = self
            .options
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| output.to_path_buf());
        let mut store = CheckpointStore::new(checkpoint_path, output)?;
        let mut stats = RunStats {
            total: dataset.records.len(),
            ..Default::default()
        };

        if dataset.records.is_empty() {
            tracing::warn!(target: "pipeline", input = %input.display(), "Input has no records");
            self.transition(PipelineState::Finalizing);
            store.finalize(&[])?;
            self.transition(PipelineState::Done);
            return Ok(RunReport::new(stats, started_at, Utc::now()));
        }

        let column = IdentifierColumn::resolve(&dataset.columns, &self.options.id_candidates)
            .with_context(format!("reading {}", input.display()))?;
        tracing::info!(
            target: "pipeline",
            column = column.name(),
            records = stats.total,
            "Using identifier column"
        );
        preview_identifiers(&dataset.records, &column);

        self.transition(PipelineState::LoadingCheckpoint);
        let keys = column.keys(&dataset.records);
        if self.options.resume {
            let sources: HashMap<RecordKey, &Record> =
                keys.iter().cloned().zip(&dataset.records).collect();
            store.load(&column, self.fetcher.manifest(), &sources);
            let known: HashSet<RecordKey> = keys.iter().cloned().collect();
            let stale = store.retain(&known);
            if stale > 0 {
                tracing::warn!(target: "pipeline", stale, "Dropped checkpoint records not in the input");
            }
        } else {
            store.discard()?;
        }

        for record in &store.checkpoint().records {
            stats.record(record.outcome);
        }
        stats.resumed = store.checkpoint().len();

        let remaining: Vec<(RecordKey, Record)> = keys
            .into_iter()
            .zip(dataset.records)
            .filter(|(key, _)| !store.checkpoint().contains(key))
            .collect();

        let mut pending = Vec::new();
        if remaining.is_empty() {
            tracing::info!(target: "pipeline", resumed = stats.resumed, "Checkpoint covers every record, nothing to fetch");
        } else {
            tracing::info!(
                target: "pipeline",
                resumed = stats.resumed,
                remaining = remaining.len(),
                "Starting enrichment"
            );

            self.transition(PipelineState::Authenticating);
            self.fetcher.authenticate().await?;

            self.transition(PipelineState::Processing);
            self.process(remaining, &column, &mut store, &mut pending, &mut stats)
                .await?;
        }

        self.transition(PipelineState::Finalizing);
        let records: Vec<Record> = store
            .checkpoint()
            .records
            .iter()
            .chain(&pending)
            .map(|r| r.record.clone())
            .collect();
        store
            .finalize(&records)
            .map_err(|e| Error::from(e).context(format!("writing {}", output.display())))?;

        self.transition(PipelineState::Done);
        let report = RunReport::new(stats, started_at, Utc::now());
        tracing::info!(
            target: "pipeline",
            success = report.stats.success,
            failed = report.stats.failed,
            rate = report.enhancement_rate,
            "Run complete"
        );
        Ok(report)
    }

    /// Fetch, merge and checkpoint the remaining records batch by batch.
    async fn process(
        &mut self,
        remaining: Vec<(RecordKey, Record)>,
        column: &IdentifierColumn,
        store: &mut CheckpointStore,
        pending: &mut Vec<EnrichedRecord>,
        stats: &mut RunStats,
    ) -> Result<()> {
        let batches = partition(remaining.iter().map(|(_, r)| r), column, self.options.batch_size);
        let total_batches = batches.len();
        let mut records = remaining.into_iter();
        let mut results: HashMap<TrackId, FetchResult> = HashMap::new();
        let mut analyses: HashMap<TrackId, Option<Features>> = HashMap::new();
        let mut analysis_budget = self.options.analysis.max_tracks;
        let mut requested = false;

        for (index, batch) in batches.into_iter().enumerate() {
            let number = index + 1;

            if !batch.ids.is_empty() {
                if requested {
                    tokio::time::sleep(self.options.batch_delay).await;
                }
                requested = true;
                stats.batches += 1;

                match self.fetcher.fetch(&batch.ids).await {
                    Ok(fetched) => results.extend(fetched),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        stats.failed_batches += 1;
                        tracing::warn!(
                            target: "pipeline",
                            batch = number,
                            ids = batch.ids.len(),
                            error = %e,
                            "Batch failed, records left unenriched"
                        );
                    }
                }
            }

            let chunk: Vec<(RecordKey, Record)> = records.by_ref().take(batch.range.len()).collect();
            let mut merged = merge(chunk, column, &results);

            if self.options.analysis.enabled {
                self.analyze(&mut merged, column, &mut analyses, &mut analysis_budget, stats)
                    .await?;
            }

            let enriched = merged.iter().filter(|r| r.is_enriched()).count();
            for record in &merged {
                stats.record(record.outcome);
            }
            tracing::info!(
                target: "pipeline",
                batch = number,
                of = total_batches,
                records = merged.len(),
                enriched,
                "Batch merged"
            );

            pending.extend(merged);
            if pending.len() >= self.options.checkpoint_every.max(1) {
                match store.append(pending.as_slice()) {
                    Ok(added) => {
                        tracing::info!(target: "pipeline", added, total = store.checkpoint().len(), "Checkpoint saved")
                    }
                    Err(e) => {
                        tracing::warn!(target: "pipeline", error = %e, "Checkpoint write failed, will retry at next checkpoint")
                    }
                }
                pending.clear();
            }
        }
        Ok(())
    }

    /// Add secondary analysis fields to newly enriched records.
    async fn analyze(
        &mut self,
        merged: &mut [EnrichedRecord],
        column: &IdentifierColumn,
        analyses: &mut HashMap<TrackId, Option<Features>>,
        budget: &mut Option<usize>,
        stats: &mut RunStats,
    ) -> Result<()> {
        for entry in merged.iter_mut().filter(|r| r.is_enriched()) {
            let Ok(id) = column.track_id(&entry.record) else {
                continue;
            };

            let cached = analyses.get(&id).cloned();
            let features = match cached {
                Some(features) => features,
                None => {
                    if *budget == Some(0) {
                        continue;
                    }
                    if let Some(left) = budget.as_mut() {
                        *left -= 1;
                    }

                    let features = match self.fetcher.fetch_analysis(&id).await {
                        Ok(features) => features,
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => {
                            tracing::warn!(target: "pipeline", id = %id, error = %e, "Analysis failed");
                            None
                        }
                    };
                    if features.is_some() {
                        stats.analyzed += 1;
                    }
                    analyses.insert(id, features.clone());
                    tokio::time::sleep(self.options.analysis.delay).await;
                    features
                }
            };

            if let Some(features) = features {
                for (name, value) in features {
                    entry.record.insert(name, value);
                }
            }
        }
        Ok(())
    }
}

/// Log the first few identifier cells and what they parse to.
fn preview_identifiers(records: &[Record], column: &IdentifierColumn) {
    for record in records.iter().take(3) {
        let cell = column.cell(record);
        match column.track_id(record) {
            Ok(id) => tracing::info!(target: "pipeline", cell = %cell, id = %id, "Sample identifier"),
            Err(e) => tracing::info!(target: "pipeline", cell = %cell, error = %e, "Sample identifier"),
        }
    }
}
