//! Concurrency-hardened in-process caching primitives.
//!
//! This crate provides two independent building blocks:
//!
//! - [`LruCache`]: a bounded, sharded LRU cache for hot read paths where
//!   many threads contend on the same store. One concurrent hash index
//!   answers existence; recency lives in per-shard lists so promotions on
//!   different shards never touch the same lock. An optional item lifetime
//!   turns it time-aware (expired entries read as absent), and
//!   [`LoadingCache`] layers a synchronous loader plus cache warming on
//!   top. [`NoopCache`] is the disabled stand-in behind the same [`Cache`]
//!   trait.
//! - [`LazyMap`]: an unbounded, read-mostly map that materializes values
//!   on first access through a deferred loader, guaranteeing that
//!   concurrent requests for a missing key share exactly one load, that a
//!   caller's wait is bounded only by its own [`CancelSignal`], and that a
//!   misbehaving loader is cut off by a per-load budget.
//!
//! # Caching reads
//!
//! ```
//! use strand_cache::CacheBuilder;
//!
//! let cache = CacheBuilder::<u64, String>::new()
//!   .capacity(2)
//!   .concurrency(1)
//!   .build()
//!   .unwrap();
//!
//! cache.put(1, "one".to_string());
//! assert_eq!(cache.get(&1).as_deref(), Some(&"one".to_string()));
//! assert_eq!(cache.get(&2), None);
//! ```
//!
//! # Loading lazily, once
//!
//! ```
//! use strand_cache::{CancelSignal, DynError, LazyMapBuilder};
//!
//! let map = LazyMapBuilder::new(|key: u64, _cancel| async move {
//!   Ok::<_, DynError>(key.to_string())
//! })
//! .build()
//! .unwrap();
//!
//! let cancel = CancelSignal::new();
//! let value = map.get(&7, &cancel).unwrap();
//! assert_eq!(value.as_str(), "7");
//! ```

mod builder;
mod cache;
mod counters;
mod entry;
mod error;
mod index;
mod lazy;
mod list;
mod loader;
mod loading;
mod log_sink;
mod rng;
mod signal;
mod time;

pub use builder::{CacheBuilder, LazyMapBuilder};
pub use cache::{Cache, LruCache, NoopCache};
pub use counters::CounterSnapshot;
pub use error::{BuildError, DynError, LoadError, LoadTimeout};
pub use lazy::{GetFuture, LazyMap};
pub use loader::BoxLoadFuture;
pub use loading::LoadingCache;
pub use log_sink::{FacadeSink, LogSink};
pub use signal::{CancelSignal, WaitCancelled};
