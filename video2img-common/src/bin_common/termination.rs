use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use signal_hook::{consts::signal::*, low_level};

/// Counts received termination requests. Cheap to clone, all clones share the count.
#[derive(Clone, Debug, Default)]
pub struct Cookie {
    count: Arc<AtomicUsize>,
}

impl Cookie {
    /// Registers handlers for SIGINT and SIGTERM. The third signal runs the default
    /// handler, i.e., kills the process.
    pub fn new() -> Result<Self, std::io::Error> {
        let count = Arc::new(AtomicUsize::new(0));

        for flag in [SIGINT, SIGTERM] {
            let count = Arc::clone(&count);
            // SAFETY: this only uses atomic stuff and functions the crate itself is using
            // in signal handlers
            unsafe {
                low_level::register(flag, move || {
                    let prev = count.fetch_add(1, Ordering::SeqCst);
                    if prev >= 2 {
                        let _ = low_level::emulate_default_handler(flag);
                    }
                })?;
            };
        }

        Ok(Self { count })
    }

    /// A cookie not connected to any signals, only [`Cookie::terminate`] affects it.
    pub fn unregistered() -> Self {
        Self::default()
    }

    /// Behave as if a signal was received.
    pub fn terminate(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_terminating(&self) -> bool {
        self.count.load(Ordering::SeqCst) >= 1
    }
}
