//! Resource caching.
//!
//! - Size-bounded cache with water-mark eviction
//! - Registry deduplicating concurrent downloads

pub mod bounded_cache;
pub mod in_flight;

pub use bounded_cache::{
    BoundedCache, CacheEntryInfo, CachePolicy, CacheStats, DEFAULT_HIGH_WATER_MARK,
    DEFAULT_LOW_WATER_MARK,
};
pub use in_flight::{FlightOwner, FlightWaiter, InFlightRegistry, Joined};
