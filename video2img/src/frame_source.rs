//! Where decoded frames come from. The converter only sees [`FrameSource`], the real
//! thing is [`extractor::FrameExtractor`].

pub mod extractor;

use std::path::Path;

use color_eyre::eyre;
use image::RgbImage;

pub type Result<T> = eyre::Result<T>;

/// Read once when opening the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    /// Can be an estimate, and is zero if it couldn't even be estimated.
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An opened video. Dropping it releases everything it holds.
pub trait FrameSource {
    fn metadata(&self) -> SourceMetadata;

    /// The next decoded frame, in order, or `None` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens paths as [`FrameSource`]s. Shared by all workers.
pub trait OpenSource: Sync {
    type Source: FrameSource;

    fn open(&self, path: &Path) -> Result<Self::Source>;
}

/// Opens videos with ffmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ffmpeg;

impl OpenSource for Ffmpeg {
    type Source = extractor::FrameExtractor;

    fn open(&self, path: &Path) -> Result<Self::Source> {
        extractor::FrameExtractor::new(path)
    }
}
