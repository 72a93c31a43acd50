//! Turns one video into a directory of numbered images.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use color_eyre::eyre;
use video2img_common::{bin_common::termination::Cookie, utils::time::Every};

use crate::{
    config::OutputRate,
    decimate::{self, Decimator},
    frame_source::{FrameSource, OpenSource},
};

/// Why one file failed. None of these stop the rest of the batch.
#[derive(thiserror::Error, Debug)]
pub enum FailureReason {
    #[error("could not read the source: {0:#}")]
    SourceUnreadable(eyre::Report),
    #[error("failed to write {path:?}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode frame {index}: {error:#}")]
    DecodeFailed { index: u64, error: eyre::Report },
    #[error("its output directory is already used by {0:?}")]
    OutputConflict(PathBuf),
    #[error("cancelled")]
    Cancelled,
    #[error("the worker converting it panicked")]
    WorkerPanicked,
}

#[derive(Debug)]
pub struct ConversionResult {
    pub source: PathBuf,
    /// Also counts the frames written before a failure
    pub frames_written: u64,
    pub elapsed: Duration,
    pub outcome: Result<(), FailureReason>,
}

impl ConversionResult {
    /// A result for a source that was never opened.
    pub fn not_converted(source: impl Into<PathBuf>, reason: FailureReason) -> Self {
        Self {
            source: source.into(),
            frames_written: 0,
            elapsed: Duration::ZERO,
            outcome: Err(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.outcome.as_ref().err()
    }
}

pub struct ConvertCtx<'env, O> {
    pub opener: &'env O,
    pub output_rate: OutputRate,
    pub image_extension: &'env str,
    pub progress_every: Duration,
    pub term_cookie: &'env Cookie,
}

// NOTE: derive would require `O: Copy`
impl<O> Clone for ConvertCtx<'_, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for ConvertCtx<'_, O> {}

/// Enough digits for the largest index of a video with `frame_count` frames, and then
/// some. Never less than one.
pub fn serial_digits(frame_count: u64) -> usize {
    frame_count.to_string().len()
}

pub fn frame_file_name(serial: u64, digits: usize, ext: &str) -> String {
    format!("{serial:0digits$}.{ext}")
}

/// Converts `source` into `unit_dir`, never panics on bad input. The source is always
/// released before returning.
pub fn convert<O: OpenSource>(
    ctx: ConvertCtx<'_, O>,
    source: &Path,
    unit_dir: &Path,
) -> ConversionResult {
    log::info!("Converting {source:?} into {unit_dir:?}");

    let before = Instant::now();
    let mut frames_written = 0;
    let outcome = convert_frames(ctx, source, unit_dir, &mut frames_written);
    let elapsed = before.elapsed();

    match &outcome {
        Ok(()) => log::info!(
            "The conversion of {source:?} is now complete, wrote {frames_written} frames in {}",
            humantime::Duration::from(elapsed)
        ),
        Err(e) => log::error!(
            "The conversion of {source:?} failed after {frames_written} frames: {e}"
        ),
    }

    ConversionResult {
        source: source.to_path_buf(),
        frames_written,
        elapsed,
        outcome,
    }
}

fn convert_frames<O: OpenSource>(
    ctx: ConvertCtx<'_, O>,
    source: &Path,
    unit_dir: &Path,
    written: &mut u64,
) -> Result<(), FailureReason> {
    let mut video = ctx
        .opener
        .open(source)
        .map_err(FailureReason::SourceUnreadable)?;

    let meta = video.metadata();
    log::info!(
        "Target information: {} frames, {}x{}, {:.2} fps ({source:?})",
        meta.frame_count,
        meta.width,
        meta.height,
        meta.fps
    );

    let interval = decimate::plan(meta.fps, ctx.output_rate.as_f64())
        .map_err(|e| FailureReason::SourceUnreadable(eyre::Report::new(e)))?;
    log::debug!("Keeping one frame every {} of {source:?}", interval.get());

    let digits = serial_digits(meta.frame_count);
    let mut decimator = Decimator::new(interval);
    let mut progress = Every::new(ctx.progress_every);
    let mut index: u64 = 0;

    loop {
        if ctx.term_cookie.is_terminating() {
            log::warn!("Termination signal received, aborting {source:?}");
            return Err(FailureReason::Cancelled);
        }

        let frame = match video.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(error) => return Err(FailureReason::DecodeFailed { index, error }),
        };

        if decimator.keep(index) {
            let path = unit_dir.join(frame_file_name(*written, digits, ctx.image_extension));
            frame
                .save(&path)
                .map_err(|source| FailureReason::WriteFailed { path, source })?;
            *written += 1;
        }
        index += 1;

        progress.perform(|| {
            log::debug!(
                "At frame {index}/{}, written {written} ({source:?})",
                meta.frame_count
            )
        });
    }

    if index != meta.frame_count {
        log::debug!(
            "{source:?} said it had {} frames, but decoded {index}",
            meta.frame_count
        );
    }

    Ok(())
}
