pub mod batch;
pub mod config;
pub mod convert;
pub mod decimate;
pub mod discovery;
pub mod frame_source;
pub mod layout;

#[cfg(test)]
mod testing;
