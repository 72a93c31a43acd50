//! Picks which decoded frames to keep to approximate a lower frame rate.

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum InvalidRate {
    #[error("the source frame rate is not a positive number: {0}")]
    Source(f64),
    #[error("the output frame rate is not a positive number: {0}")]
    Output(f64),
}

/// The spacing, in source frames, between two kept frames. Can be less than one, which
/// means that every frame is kept, they are never duplicated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepInterval(f64);

impl KeepInterval {
    pub const EVERY_FRAME: Self = KeepInterval(1.0);

    pub fn get(self) -> f64 {
        self.0
    }
}

/// A negative `output_fps` keeps the source rate. Both rates are rounded to whole
/// numbers before dividing.
pub fn plan(source_fps: f64, output_fps: f64) -> Result<KeepInterval, InvalidRate> {
    let source = source_fps.round();
    if !source.is_finite() || source <= 0.0 {
        return Err(InvalidRate::Source(source_fps));
    }

    if output_fps < 0.0 {
        return Ok(KeepInterval::EVERY_FRAME);
    }

    let output = output_fps.round();
    if !output.is_finite() || output <= 0.0 {
        return Err(InvalidRate::Output(output_fps));
    }

    Ok(KeepInterval(source / output))
}

/// Slack for fractional intervals, so that 2.9999999 counts as having reached 3.
const TOLERANCE: f64 = 1e-6;

/// Decides frame by frame. The frame at index `i` is kept if it has reached the next
/// threshold, which is `kept * interval`. For whole intervals this is the same as `i %
/// interval == 0`.
#[derive(Debug)]
pub struct Decimator {
    interval: f64,
    kept: u64,
}

impl Decimator {
    pub fn new(interval: KeepInterval) -> Self {
        Self {
            interval: interval.get(),
            kept: 0,
        }
    }

    /// Must be called for every decoded frame, in order, starting at zero.
    pub fn keep(&mut self, index: u64) -> bool {
        let threshold = self.kept as f64 * self.interval;
        if index as f64 + TOLERANCE >= threshold {
            self.kept += 1;
            true
        } else {
            false
        }
    }
}
