use crate::config::RunConfig;
use crate::manifest::{write_batch_manifest, BatchManifest, PeriodRecord, BATCH_MANIFEST_FILE};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use satfeat_algo::{
    partition_points, MatchStats, ModelError, Partition, PatchExtractor, RandomConvModel,
    SceneMatcher,
};
use satfeat_core::{
    Catalog, ErrorPolicy, FeatureMatrix, OutcomeCounts, PatchOutcome, Period, PeriodFeatureTable,
    PeriodSink, PointStore, SceneAccess,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::sync_channel;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

/// Returned after the run so clients can log period counts and the manifest location.
#[derive(Debug)]
pub struct RunSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub periods: Vec<PeriodRecord>,
}

/// What one successful period produced.
struct PeriodOutput {
    path: PathBuf,
    matched: MatchStats,
    outcomes: OutcomeCounts,
}

/// Extracted outcomes of one batch, tagged with their store indices.
type ExtractedBatch = Vec<(usize, PatchOutcome)>;

/// Worker pools and the seeded model, built once and shared by every period.
struct RunContext<'a> {
    config: &'a RunConfig,
    store: &'a PointStore,
    partitions: Vec<Partition>,
    matcher: SceneMatcher<'a>,
    extractor: PatchExtractor<'a>,
    model: RandomConvModel,
    catalog_pool: ThreadPool,
    extract_pool: ThreadPool,
}

/// Process every configured period in chronological order.
///
/// **Algorithm:**
/// 1. Validate the config before any catalog request.
/// 2. Partition the points once and draw the model weights once from `seed`.
/// 3. Per period: match all partitions (barrier), then stream extracted
///    batches through a bounded channel to the single featurizer, which
///    writes rows at their store indices into a zero matrix.
/// 4. Assemble, persist, and drop all period state before the next period,
///    including whatever `scenes` holds for it (see [`SceneAccess::release`]).
///
/// A failed period is recorded and skipped, or aborts the run, per
/// `on_period_error`. The batch manifest is written in both cases.
pub fn run_periods(
    config: &RunConfig,
    store: &PointStore,
    catalog: &dyn Catalog,
    scenes: &dyn SceneAccess,
    sink: &mut dyn PeriodSink,
) -> Result<RunSummary> {
    config.validate().context("validating run config")?;
    let periods = config.periods()?;

    let partition_count = config.partition_count(store.len());
    let partitions = partition_points(store, partition_count)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let model = RandomConvModel::new(config.model_config(config.bands.len()), &mut rng)?;
    let ctx = RunContext {
        config,
        store,
        partitions,
        matcher: SceneMatcher::new(catalog, config.match_config()),
        extractor: PatchExtractor::new(scenes, config.extract_config()),
        model,
        catalog_pool: build_pool(config.catalog_workers, "catalog")?,
        extract_pool: build_pool(config.extract_workers, "extract")?,
    };
    info!(
        points = store.len(),
        partitions = ctx.partitions.len(),
        periods = periods.len(),
        features = config.num_features,
        "starting run for {} {}",
        config.satellite,
        config.region
    );

    let manifest_path = config.output_dir.join(BATCH_MANIFEST_FILE);
    let mut records = Vec::with_capacity(periods.len());
    for period in &periods {
        let started = Instant::now();
        let result = ctx.process_period(*period, sink);
        scenes.release();
        let duration_ms = started.elapsed().as_millis() as u64;
        let record = match result {
            Ok(output) => {
                info!(
                    matched = output.matched.matched_points,
                    valid = output.outcomes.valid,
                    duration_ms,
                    "period {period} written to {}",
                    output.path.display()
                );
                period_record(*period, store.len(), duration_ms, Ok(output))
            }
            Err(err) => {
                warn!("period {period} failed: {err:#}");
                let record = period_record(*period, store.len(), duration_ms, Err(&err));
                if config.on_period_error == ErrorPolicy::Abort {
                    records.push(record);
                    write_manifest(config, store, &records, &manifest_path)?;
                    return Err(err.context(format!("processing period {period}")));
                }
                record
            }
        };
        records.push(record);
    }

    write_manifest(config, store, &records, &manifest_path)?;
    let success = records.iter().filter(|r| r.is_ok()).count();
    Ok(RunSummary {
        success,
        failure: records.len() - success,
        manifest_path,
        periods: records,
    })
}

impl RunContext<'_> {
    fn process_period(&self, period: Period, sink: &mut dyn PeriodSink) -> Result<PeriodOutput> {
        let assignments = self.matcher.match_all(
            &self.partitions,
            self.store,
            period,
            &self.catalog_pool,
            self.config.on_catalog_error,
        )?;
        info!(
            matched = assignments.stats.matched_points,
            candidates = assignments.stats.candidates,
            failed_partitions = assignments.stats.failed_partitions,
            "matched scenes for {period}"
        );

        let n = self.store.len();
        let batch_size = self.config.batch_size;
        let mut matrix = FeatureMatrix::zeros(n, self.model.num_features());
        let mut outcomes = OutcomeCounts::default();

        thread::scope(|scope| -> Result<()> {
            let (tx, rx) = sync_channel::<ExtractedBatch>(self.config.queue_depth);
            let assignments = &assignments;
            let producer = scope.spawn(move || {
                for start in (0..n).step_by(batch_size) {
                    let end = (start + batch_size).min(n);
                    let items: Vec<_> = (start..end)
                        .filter_map(|i| {
                            self.store
                                .get(i)
                                .map(|point| (i, *point, assignments.scene(i)))
                        })
                        .collect();
                    let batch = self.extractor.extract_batch(&items, &self.extract_pool);
                    // The featurizer hung up; its error is reported there.
                    if tx.send(batch).is_err() {
                        break;
                    }
                }
            });

            for batch in rx {
                let (indices, patches): (Vec<usize>, Vec<PatchOutcome>) = batch.into_iter().unzip();
                patches.iter().for_each(|outcome| outcomes.record(outcome));
                let first_row = indices.first().copied().unwrap_or_default();
                let features = featurize_with_retry(
                    || self.model.featurize_batch(&patches),
                    period,
                    first_row,
                )?;
                for (index, row) in indices.iter().zip(&features) {
                    matrix.set_row(*index, row)?;
                }
            }
            producer
                .join()
                .map_err(|_| anyhow!("extraction thread panicked during {period}"))
        })?;

        let table = PeriodFeatureTable::assemble(period, matrix, self.store)?;
        let name = self.config.output_name(n, period);
        let path = sink
            .persist(&table, &name)
            .with_context(|| format!("persisting {}", name.file_name("parquet")))?;
        Ok(PeriodOutput {
            path,
            matched: assignments.stats,
            outcomes,
        })
    }
}

/// Run `featurize`, retrying once when the first error is transient.
/// Deterministic errors fail the period on the first attempt.
fn featurize_with_retry<T>(
    mut featurize: impl FnMut() -> Result<T, ModelError>,
    period: Period,
    first_row: usize,
) -> Result<T> {
    let context = || format!("featurizing batch at row {first_row} for {period}");
    match featurize() {
        Ok(features) => Ok(features),
        Err(err) if err.is_transient() => {
            warn!("feature batch at row {first_row} failed for {period}: {err}; retrying once");
            featurize().with_context(context)
        }
        Err(err) => Err(err).with_context(context),
    }
}

fn period_record(
    period: Period,
    num_points: usize,
    duration_ms: u64,
    result: Result<PeriodOutput, &anyhow::Error>,
) -> PeriodRecord {
    let mut record = PeriodRecord {
        year: period.year,
        month: period.month,
        status: "ok".to_string(),
        error: None,
        output: None,
        num_points,
        num_matched: 0,
        num_valid: 0,
        num_undersized: 0,
        num_constant: 0,
        num_failed: 0,
        failed_partitions: 0,
        duration_ms,
    };
    match result {
        Ok(output) => {
            record.output = Some(output.path.display().to_string());
            record.num_matched = output.matched.matched_points;
            record.failed_partitions = output.matched.failed_partitions;
            record.num_valid = output.outcomes.valid;
            record.num_undersized = output.outcomes.undersized;
            record.num_constant = output.outcomes.constant;
            record.num_failed = output.outcomes.failed;
        }
        Err(err) => {
            record.status = "error".to_string();
            record.error = Some(format!("{err:#}"));
        }
    }
    record
}

fn write_manifest(
    config: &RunConfig,
    store: &PointStore,
    records: &[PeriodRecord],
    path: &Path,
) -> Result<()> {
    let success = records.iter().filter(|r| r.is_ok()).count();
    let manifest = BatchManifest {
        created_at: Utc::now(),
        satellite: config.satellite.clone(),
        region: config.region.clone(),
        num_points: store.len(),
        num_features: config.num_features,
        num_periods: records.len(),
        success,
        failure: records.len() - success,
        periods: records.to_vec(),
    };
    write_batch_manifest(path, &manifest)
}

/// Rayon pool of `threads` workers; 0 means one per CPU.
pub fn build_pool(threads: usize, label: &'static str) -> Result<ThreadPool> {
    let thread_count = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };
    ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .thread_name(move |i| format!("{label}-{i}"))
        .build()
        .with_context(|| format!("building Rayon thread pool for {label} workers"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn deterministic_featurize_errors_are_not_retried() {
        let calls = Cell::new(0);
        let period = Period::new(2019, 5).unwrap();
        let err = featurize_with_retry::<Vec<Vec<f64>>>(
            || {
                calls.set(calls.get() + 1);
                Err(ModelError::ChannelMismatch {
                    expected: 4,
                    got: 3,
                })
            },
            period,
            128,
        )
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        let message = format!("{err:#}");
        assert!(message.contains("row 128"), "{message}");
        assert!(message.contains("model expects 4"), "{message}");
    }

    #[test]
    fn successful_featurize_runs_once() {
        let calls = Cell::new(0);
        let period = Period::new(2019, 5).unwrap();
        let rows = featurize_with_retry(
            || {
                calls.set(calls.get() + 1);
                Ok(vec![vec![0.5, 0.25]])
            },
            period,
            0,
        )
        .unwrap();
        assert_eq!(rows, vec![vec![0.5, 0.25]]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn build_pool_names_threads() {
        let pool = build_pool(2, "extract").unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        let name = pool.install(|| thread::current().name().map(str::to_string));
        assert!(name.is_some_and(|n| n.starts_with("extract-")));
    }
}
