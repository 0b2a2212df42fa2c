//! Local snapshot of the last fetched task data.
//!
//! This module provides the `CacheManager` for keeping the most recent task
//! list and statistics on disk, so they can be shown without a round trip.
//! Data is cached in JSON format and considered stale after 60 minutes.

pub mod manager;

pub use manager::{CacheManager, CachedData};
