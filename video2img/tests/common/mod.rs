// NOTE: every test will complain about the functions it doesn't use
#![allow(unused)]

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use tempfile::TempDir;

pub const TEST_VIDEO_SECS: u32 = 2;
pub const TEST_VIDEO_RATE: u32 = 25;
pub const TEST_VIDEO_FRAMES: u64 = (TEST_VIDEO_SECS * TEST_VIDEO_RATE) as u64;
pub const TEST_VIDEO_WIDTH: u32 = 64;
pub const TEST_VIDEO_HEIGHT: u32 = 48;

/// Returns cargo's tmpdir
pub fn cargo_tmpdir() -> PathBuf {
    PathBuf::from(option_env!("CARGO_TARGET_TMPDIR").expect("no cargo tmpdir???"))
}

/// A fresh directory inside cargo's tmpdir
pub fn scratch_dir() -> TempDir {
    tempfile::tempdir_in(cargo_tmpdir()).expect("could not create a temporary dir")
}

/// Creates a small test pattern video with ffmpeg, which must be installed.
pub fn create_test_video(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-f", "lavfi", "-i"])
        .arg(format!(
            "testsrc=duration={TEST_VIDEO_SECS}:rate={TEST_VIDEO_RATE}:size={TEST_VIDEO_WIDTH}x{TEST_VIDEO_HEIGHT}"
        ))
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .status()
        .expect("failed to execute ffmpeg");
    assert!(status.success(), "ffmpeg failed to create {path:?}");
    path.to_path_buf()
}
