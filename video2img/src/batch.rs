//! Runs a whole input directory through the converter, on a pool of workers.

use std::{
    collections::HashMap,
    ffi::OsStr,
    fmt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::mpsc,
    time::{Duration, Instant},
};

use chrono::NaiveDate;
use video2img_common::{
    bin_common::termination::Cookie,
    utils::{
        work_queue::WorkQueue,
        workers::{scoped_workers, FinishedWorker},
    },
};

use crate::{
    config::{ConversionConfig, SOURCE_EXTENSIONS},
    convert::{convert, ConversionResult, ConvertCtx, FailureReason},
    discovery::{discover, DiscoveryError},
    frame_source::{Ffmpeg, OpenSource},
    layout::{self, LayoutError},
};

/// Errors that stop the whole run.
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

#[derive(Debug)]
pub struct BatchReport {
    /// `None` if there was nothing to do
    pub batch_root: Option<PathBuf>,
    /// In discovery order
    pub results: Vec<ConversionResult>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|res| res.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn frames_written(&self) -> u64 {
        self.results.iter().map(|res| res.frames_written).sum()
    }

    /// True if every file was converted, which includes there being no files at all.
    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }
}

fn humantime_millis(dur: Duration) -> humantime::Duration {
    Duration::from_millis(dur.as_millis().try_into().unwrap_or(u64::MAX)).into()
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Converted {}/{} videos, {} frames in total. Total processing time: {}",
            self.succeeded(),
            self.results.len(),
            self.frames_written(),
            humantime_millis(self.elapsed)
        )?;
        for res in &self.results {
            let name = res.source.file_name().unwrap_or(res.source.as_os_str());
            match &res.outcome {
                Ok(()) => write!(
                    f,
                    "\n  ok     {}: {} frames in {}",
                    name.to_string_lossy(),
                    res.frames_written,
                    humantime_millis(res.elapsed)
                )?,
                Err(e) => write!(
                    f,
                    "\n  FAILED {}: {} ({} frames written)",
                    name.to_string_lossy(),
                    e,
                    res.frames_written
                )?,
            }
        }
        Ok(())
    }
}

/// Converts everything in the configured input directory with ffmpeg, into today's
/// batch root.
pub fn run(
    config: &ConversionConfig,
    term_cookie: &Cookie,
) -> Result<BatchReport, BatchError> {
    run_with(config, &Ffmpeg, term_cookie, chrono::Local::now().date_naive())
}

/// NOTE: the batch root for `date` is wiped before anything is written, so two runs
/// against the same output base must not overlap.
pub fn run_with<O: OpenSource>(
    config: &ConversionConfig,
    opener: &O,
    term_cookie: &Cookie,
    date: NaiveDate,
) -> Result<BatchReport, BatchError> {
    log::info!("Finding all videos in: {:?}", config.get_input_dir());
    let sources = discover(config.get_input_dir(), SOURCE_EXTENSIONS)?;
    log::info!("Found {} videos", sources.len());
    for source in &sources {
        log::debug!("Target: {source:?}");
    }

    if sources.is_empty() {
        log::info!("Nothing to convert");
        return Ok(BatchReport {
            batch_root: None,
            results: Vec::new(),
            elapsed: Duration::ZERO,
        });
    }

    let batch_root = layout::prepare_batch_root_at(config.get_output_dir_base(), date)?;
    log::info!("Writing into a cleared {batch_root:?}");

    let start = Instant::now();
    let mut slots: Vec<Option<ConversionResult>> = sources.iter().map(|_| None).collect();
    let mut work = Vec::with_capacity(sources.len());
    for planned in plan_units(&batch_root, &sources)? {
        match planned {
            Planned::Convert(unit) => work.push(unit),
            Planned::Conflict { index, with } => {
                log::error!(
                    "{:?} would write into the same directory as {with:?}, skipping it",
                    sources[index]
                );
                slots[index] = Some(ConversionResult::not_converted(
                    &sources[index],
                    FailureReason::OutputConflict(with.to_path_buf()),
                ));
            }
        }
    }

    let ctx = ConvertCtx {
        opener,
        output_rate: config.get_output_rate(),
        image_extension: config.get_image_extension(),
        progress_every: config.get_progress_every(),
        term_cookie,
    };
    for (index, result) in dispatch(ctx, work, config.get_jobs().get()) {
        slots[index] = Some(result);
    }

    let results = slots
        .into_iter()
        .zip(&sources)
        .map(|(slot, source)| {
            slot.unwrap_or_else(|| {
                let reason = if term_cookie.is_terminating() {
                    FailureReason::Cancelled
                } else {
                    FailureReason::WorkerPanicked
                };
                ConversionResult::not_converted(source, reason)
            })
        })
        .collect();

    Ok(BatchReport {
        batch_root: Some(batch_root),
        results,
        elapsed: start.elapsed(),
    })
}

struct Unit<'a> {
    index: usize,
    source: &'a Path,
    dir: PathBuf,
}

enum Planned<'a> {
    Convert(Unit<'a>),
    Conflict { index: usize, with: &'a Path },
}

/// Creates the output unit of every source. A source whose unit name is already taken
/// by an earlier one becomes a conflict instead.
fn plan_units<'a>(
    batch_root: &Path,
    sources: &'a [PathBuf],
) -> Result<Vec<Planned<'a>>, LayoutError> {
    let mut taken: HashMap<&'a OsStr, &'a Path> = HashMap::new();
    let mut planned = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        if let Some(name) = layout::unit_name(source) {
            if let Some(&with) = taken.get(name) {
                planned.push(Planned::Conflict { index, with });
                continue;
            }
            taken.insert(name, source);
        }

        let dir = layout::prepare_unit_dir(batch_root, source)?;
        planned.push(Planned::Convert(Unit { index, source, dir }));
    }
    Ok(planned)
}

/// Converts all units on `jobs` workers. Returns the results of the units that finished,
/// tagged with their discovery index, in no particular order.
fn dispatch<O: OpenSource>(
    ctx: ConvertCtx<'_, O>,
    work: Vec<Unit<'_>>,
    jobs: usize,
) -> Vec<(usize, ConversionResult)> {
    let queue = WorkQueue::new(work);
    if queue.is_empty() {
        return Vec::new();
    }

    let workers = jobs.clamp(1, queue.len());
    log::info!("Converting {} videos on {} workers", queue.len(), workers);

    let (tx, rx) = mpsc::channel::<(usize, ConversionResult)>();

    let finished = scoped_workers(|s| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            s.spawn("W", move || worker(ctx, queue, tx));
        }
    });
    drop(tx);

    for FinishedWorker { name, result } in finished {
        if let Err(panic) = result {
            log::error!("Thread '{name}' panicked with: {panic}");
        }
    }

    rx.into_iter().collect()
}

fn worker<O: OpenSource>(
    ctx: ConvertCtx<'_, O>,
    queue: &WorkQueue<Unit<'_>>,
    tx: mpsc::Sender<(usize, ConversionResult)>,
) {
    log::debug!("Worker working");

    while let Some((i, unit)) = queue.next_index() {
        if ctx.term_cookie.is_terminating() {
            log::warn!("Termination signal received");
            break;
        }

        log::info!("Progress: {}/{} videos", i + 1, queue.len());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            convert(ctx, unit.source, &unit.dir)
        }))
        .unwrap_or_else(|_| {
            log::error!("Panicked while converting {:?}", unit.source);
            ConversionResult::not_converted(unit.source, FailureReason::WorkerPanicked)
        });
        if tx.send((unit.index, result)).is_err() {
            log::error!("Nobody is collecting the results anymore");
            break;
        }
    }

    log::debug!("Worker ended");
}
