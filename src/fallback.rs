//! Multi-source fallback engine
//!
//! When the primary catalog will not serve a track, its title and artist
//! are searched concurrently on six third-party catalogs. The outcomes are
//! merged by a fixed priority order and the verdict is cached per track.

pub mod cache;
pub mod fanout;
pub mod orchestrator;
pub mod resolver;
pub mod source;
pub mod sources;

#[cfg(test)]
mod testing;

pub use cache::{HIT_TTL, KeyValueCache, MISS_TTL, MemoryCache, ResolutionCache};
pub use fanout::FanOut;
pub use orchestrator::{NOT_PLAYABLE_MESSAGE, PLAYABLE_MESSAGE, Playability, Unblocker};
pub use resolver::{AggregationResult, PRIORITY, merge};
pub use source::{
    Candidate, Resolved, SourceAdapter, SourceError, SourceName, SourceOutcome, TrackQuery,
};
pub use sources::default_sources;
