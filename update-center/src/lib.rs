//! Version resolution and download bookkeeping for the update center mirror.

pub mod cache;
pub mod download_counter;
pub mod metrics_defs;
pub mod resolver;
#[cfg(test)]
mod testutils;
pub mod upstream;
pub mod work_pool;
