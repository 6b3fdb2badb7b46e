//! Weather and photo enrichment for a selected place.
//!
//! Both lookups are best-effort: a failure is logged and reported as "nothing to show",
//! never as an error to the caller. Results are memoized in bounded caches.

pub mod photo;
pub mod weather;

pub use photo::{PhotoClient, WikiPhoto};
pub use weather::{WeatherClient, WeatherInfo};

/// Default entry bound for each enrichment cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1_000;
