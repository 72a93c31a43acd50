use std::{ffi::OsString, num::NonZeroUsize, path::PathBuf, process::ExitCode};

use clap::Parser;
use color_eyre::eyre::{self, Context};
use video2img::{
    batch,
    config::{
        default_jobs, ConversionConfig, DEFAULT_IMAGE_EXTENSION, DEFAULT_INPUT_DIR,
        DEFAULT_OUTPUT_DIR,
    },
};
use video2img_common::{
    bin_common::{
        init::{init_eyre, init_logger},
        termination,
    },
    utils::fsutils::read_optional_file,
};

/// Exit status when the batch ran, but some files could not be converted
const PARTIAL_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command()]
/// Converts every video in a directory into numbered images, one directory per video.
///
/// The images end up in OUTPUT_DIR/YYYYMMDD/<video name>/. NOTE: the directory for
/// today is emptied first, so running twice the same day replaces the earlier output.
struct Cli {
    /// Frames per second to keep. Negative keeps every frame
    #[arg(allow_negative_numbers = true, default_value_t = -1)]
    output_fps: i64,

    /// Where to look for videos (mp4, MP4, mov, MOV)
    #[arg(long, short = 'i', default_value = DEFAULT_INPUT_DIR)]
    input_dir: PathBuf,

    /// Where to place the dated directories
    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// The format of the images
    #[arg(long, short = 'e', default_value = DEFAULT_IMAGE_EXTENSION)]
    image_extension: String,

    /// Convert this many videos at the same time. Defaults to the number of CPUs
    #[arg(long, short = 'j')]
    jobs: Option<NonZeroUsize>,

    /// Time between progress logs of a video
    #[arg(long, default_value = "5s")]
    progress_every: humantime::Duration,

    /// A file to additionally write the logs to
    #[arg(long)]
    logfile: Option<PathBuf>,

    #[arg(long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,
}

fn cli_arguments() -> eyre::Result<Cli> {
    const ARGS_FILE: &str = ".video2imgrc";
    let mut args: Vec<OsString> = std::env::args_os().collect();

    if args.len() == 1 {
        if let Some(flags) = read_optional_file(ARGS_FILE)
            .wrap_err_with(|| format!("Could not read config file at: {ARGS_FILE}"))?
        {
            args.extend(flags.split_whitespace().map(OsString::from));
        }
    }

    Ok(Cli::parse_from(args))
}

fn main() -> eyre::Result<ExitCode> {
    init_eyre()?;
    let cli = cli_arguments()?;
    init_logger(cli.logfile.as_deref(), cli.log_level)?;

    log::debug!("CLI arguments: {cli:#?}");

    let config = ConversionConfig::new(cli.output_fps)
        .and_then(|config| config.image_extension(cli.image_extension))
        .wrap_err("Invalid configuration")?
        .input_dir(cli.input_dir)
        .output_dir_base(cli.output_dir)
        .jobs(cli.jobs.unwrap_or_else(default_jobs))
        .progress_every(cli.progress_every.into());

    let term_cookie =
        termination::Cookie::new().wrap_err("failed to create term cookie")?;

    let report = batch::run(&config, &term_cookie).wrap_err("The batch was aborted")?;
    log::info!("{report}");

    if term_cookie.is_terminating() {
        log::warn!("Stopped early because of a termination signal");
    }

    if report.is_complete_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        log::error!("{} of {} videos failed", report.failed(), report.results.len());
        Ok(ExitCode::from(PARTIAL_FAILURE))
    }
}
