use crate::config::ValidationError;
use std::io;
use update_center::upstream::UpstreamError;

#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
    #[error("upstream client error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("could not build response: {0}")]
    Http(#[from] http::Error),
}
