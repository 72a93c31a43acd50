//! Stand-in videos for tests. A "video" is a text file with `key=value` lines describing
//! what it decodes to, e.g., `frames=90` and `fps=30`.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use color_eyre::eyre::{self, Context};
use image::{Rgb, RgbImage};
use video2img_common::bin_common::termination::Cookie;

use crate::frame_source::{FrameSource, OpenSource, Result, SourceMetadata};

#[derive(Debug, Clone)]
pub struct FakeSpec {
    pub frames: u64,
    pub fps: f64,
    /// What the header claims, defaults to `frames`
    pub reported_frames: Option<u64>,
    pub fail_at: Option<u64>,
    pub panic_at: Option<u64>,
    pub terminate_at: Option<u64>,
}

impl FakeSpec {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            reported_frames: None,
            fail_at: None,
            panic_at: None,
            terminate_at: None,
        }
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let mut lines = vec![format!("frames={}", self.frames), format!("fps={}", self.fps)];
        let optional = [
            ("reported_frames", self.reported_frames),
            ("fail_at", self.fail_at),
            ("panic_at", self.panic_at),
            ("terminate_at", self.terminate_at),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                lines.push(format!("{key}={value}"));
            }
        }
        let path = dir.join(name);
        fs::write(&path, lines.join("\n")).expect("could write the fake video");
        path
    }

    fn parse(text: &str) -> eyre::Result<Self> {
        let mut spec = FakeSpec::new(0, 0.0);
        let mut has_frames = false;
        for line in text.lines() {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| eyre::eyre!("not a fake video line: {line:?}"))?;
            match key {
                "frames" => {
                    spec.frames = value.parse()?;
                    has_frames = true;
                }
                "fps" => spec.fps = value.parse()?,
                "reported_frames" => spec.reported_frames = Some(value.parse()?),
                "fail_at" => spec.fail_at = Some(value.parse()?),
                "panic_at" => spec.panic_at = Some(value.parse()?),
                "terminate_at" => spec.terminate_at = Some(value.parse()?),
                _ => eyre::bail!("unknown key {key:?}"),
            }
        }
        eyre::ensure!(has_frames, "not a fake video");
        Ok(spec)
    }
}

pub const FAKE_WIDTH: u32 = 4;
pub const FAKE_HEIGHT: u32 = 2;

/// Frame `i` is filled with the color `i`, so it can be identified after an encoding
/// round trip.
pub fn fake_frame(i: u64) -> RgbImage {
    let shade = (i % 256) as u8;
    RgbImage::from_pixel(FAKE_WIDTH, FAKE_HEIGHT, Rgb([shade, shade, shade]))
}

#[derive(Debug, Default)]
pub struct FakeOpener {
    pub opened: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    pub cookie: Cookie,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(cookie: Cookie) -> Self {
        Self {
            cookie,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl OpenSource for FakeOpener {
    type Source = FakeVideo;

    fn open(&self, path: &Path) -> Result<Self::Source> {
        let text = fs::read_to_string(path).wrap_err("Failed to open the file")?;
        let spec = FakeSpec::parse(&text).wrap_err("Failed to parse the file")?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeVideo {
            spec,
            next: 0,
            released: Arc::clone(&self.released),
            cookie: self.cookie.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeVideo {
    spec: FakeSpec,
    next: u64,
    released: Arc<AtomicUsize>,
    cookie: Cookie,
}

impl FrameSource for FakeVideo {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            frame_count: self.spec.reported_frames.unwrap_or(self.spec.frames),
            width: FAKE_WIDTH,
            height: FAKE_HEIGHT,
            fps: self.spec.fps,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let i = self.next;
        if self.spec.fail_at == Some(i) {
            eyre::bail!("broken frame");
        }
        if self.spec.panic_at == Some(i) {
            panic!("fake video panicked at frame {i}");
        }
        if self.spec.terminate_at == Some(i) {
            self.cookie.terminate();
        }
        if i >= self.spec.frames {
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(fake_frame(i)))
    }
}

impl Drop for FakeVideo {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// The file names in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("can read the dir")
        .map(|entry| {
            entry
                .expect("can read the entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
