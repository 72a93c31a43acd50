use std::{
    io::Cursor,
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::decimate::InvalidRate;

/// Only files directly in the input dir with exactly one of these extensions are
/// converted.
pub const SOURCE_EXTENSIONS: &[&str] = &["mp4", "MP4", "mov", "MOV"];

pub const DEFAULT_INPUT_DIR: &str = "input";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRate {
    /// Keep every decoded frame
    Source,
    Fps(NonZeroU32),
}

impl OutputRate {
    /// Negative means the source rate, zero is not a rate.
    pub fn from_signed(fps: i64) -> Result<Self, InvalidRate> {
        match fps {
            ..=-1 => Ok(OutputRate::Source),
            0 => Err(InvalidRate::Output(0.0)),
            fps => u32::try_from(fps)
                .ok()
                .and_then(NonZeroU32::new)
                .map(OutputRate::Fps)
                .ok_or(InvalidRate::Output(fps as f64)),
        }
    }

    /// As given to [`crate::decimate::plan`]
    pub fn as_f64(self) -> f64 {
        match self {
            OutputRate::Source => -1.0,
            OutputRate::Fps(fps) => fps.get().into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRate),
    #[error("images can not be written with the extension {0:?}")]
    UnsupportedImageExtension(String),
}

/// Everything one batch run needs to know. Shared read-only between all workers.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    output_rate: OutputRate,
    output_dir_base: PathBuf,
    input_dir: PathBuf,
    image_extension: String,
    jobs: NonZeroUsize,
    progress_every: Duration,
}

impl ConversionConfig {
    pub fn new(output_fps: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            output_rate: OutputRate::from_signed(output_fps)?,
            output_dir_base: DEFAULT_OUTPUT_DIR.into(),
            input_dir: DEFAULT_INPUT_DIR.into(),
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            jobs: default_jobs(),
            progress_every: Duration::from_secs(5),
        })
    }

    pub fn input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    pub fn output_dir_base(mut self, output_dir_base: impl Into<PathBuf>) -> Self {
        self.output_dir_base = output_dir_base.into();
        self
    }

    pub fn jobs(mut self, jobs: NonZeroUsize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn progress_every(mut self, progress_every: Duration) -> Self {
        self.progress_every = progress_every;
        self
    }

    /// Fails if there is no image encoder for the extension that can write RGB frames.
    pub fn image_extension(mut self, ext: impl Into<String>) -> Result<Self, ConfigError> {
        let ext = ext.into();
        if can_encode_rgb(&ext) {
            self.image_extension = ext;
            Ok(self)
        } else {
            Err(ConfigError::UnsupportedImageExtension(ext))
        }
    }

    pub fn get_output_rate(&self) -> OutputRate {
        self.output_rate
    }

    pub fn get_output_dir_base(&self) -> &Path {
        &self.output_dir_base
    }

    pub fn get_input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn get_image_extension(&self) -> &str {
        &self.image_extension
    }

    pub fn get_jobs(&self) -> NonZeroUsize {
        self.jobs
    }

    pub fn get_progress_every(&self) -> Duration {
        self.progress_every
    }
}

/// Encodes a tiny frame in memory, since some encoders exist but can't take 8 bit RGB.
fn can_encode_rgb(ext: &str) -> bool {
    let Some(format) = image::ImageFormat::from_extension(ext) else {
        return false;
    };
    let frame = image::RgbImage::new(1, 1);
    frame
        .write_to(&mut Cursor::new(Vec::new()), format)
        .is_ok()
}

/// One worker per CPU, since encoding images is CPU bound.
pub fn default_jobs() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signed_rates() {
        assert_eq!(Ok(OutputRate::Source), OutputRate::from_signed(-1));
        assert_eq!(Ok(OutputRate::Source), OutputRate::from_signed(-30));
        assert_eq!(
            Ok(OutputRate::Fps(NonZeroU32::new(10).unwrap())),
            OutputRate::from_signed(10)
        );
        assert_eq!(Err(InvalidRate::Output(0.0)), OutputRate::from_signed(0));
        assert!(OutputRate::from_signed(i64::MAX).is_err());
    }

    #[test]
    fn defaults() {
        let config = ConversionConfig::new(-1).unwrap();
        assert_eq!(OutputRate::Source, config.get_output_rate());
        assert_eq!(Path::new("input"), config.get_input_dir());
        assert_eq!(Path::new("output"), config.get_output_dir_base());
        assert_eq!("jpg", config.get_image_extension());
    }

    #[test]
    fn zero_fps_is_rejected() {
        assert!(matches!(
            ConversionConfig::new(0),
            Err(ConfigError::InvalidRate(_))
        ));
    }

    #[test]
    fn image_extensions() {
        let config = ConversionConfig::new(5).unwrap();
        assert_eq!(
            "png",
            config
                .clone()
                .image_extension("png")
                .unwrap()
                .get_image_extension()
        );
        assert!(matches!(
            config.clone().image_extension("mp4"),
            Err(ConfigError::UnsupportedImageExtension(_))
        ));
        for ext in ["", "exr", "ff"] {
            assert!(
                matches!(
                    config.clone().image_extension(ext),
                    Err(ConfigError::UnsupportedImageExtension(_))
                ),
                "{ext:?} was accepted"
            );
        }
        for ext in ["jpg", "jpeg", "png", "bmp", "tiff"] {
            assert!(config.clone().image_extension(ext).is_ok(), "{ext:?} was rejected");
        }
    }
}
