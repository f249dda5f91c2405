use thiserror::Error;

use crate::track::TrackId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("failed to load profile: {0}")]
    Config(#[from] config::ConfigError),

    #[error("collision map storage failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("frame {frame} of track {track} arrived after frame {last}")]
    FrameOrder { track: TrackId, frame: u32, last: u32 },

    #[error("hash list is too short to build fingerprints (given {given}, required at least {required})")]
    QueryTooShort { given: usize, required: usize },

    #[error("invalid match set: {0}")]
    InvalidMatchSet(&'static str),

    #[error("ingestion channel closed")]
    ChannelClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
