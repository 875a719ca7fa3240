//! Playback statistics shared between the scheduler and the host.

pub mod log;

pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, PlaybackStats,
    SharedPlaybackStats, StatsSnapshot,
};
