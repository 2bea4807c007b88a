//! # Cache Module
//!
//! Small bounded caches used by the bot.
//!
//! The only consumer today is the duration resolver, which memoizes
//! `ffprobe` results by file path so repeated seeks and fades on the same
//! track do not spawn a probe process every time.
//!
//! ## Configuration
//!
//! ```env
//! DURATION_CACHE_SIZE=64      # Maximum number of memoized durations
//! ```

pub mod lru_cache;

use lru_cache::LRUCache;
use std::path::PathBuf;

/// Duraciones memorizadas en segundos, por ruta de archivo
pub type DurationCache = LRUCache<PathBuf, f64>;
