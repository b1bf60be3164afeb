//! Frontend cache purging.
//!
//! Write endpoints decide what the public site must drop and say so in an
//! `X-Cache-Invalidate` response header. The middleware here turns those
//! headers into queued events, and the consumer merges them and forwards the
//! result to a purge webhook.
//!
//! ```toml
//! [cache]
//! enabled = true
//! purge_url = "http://frontend.internal/purge"
//! auto_consume_interval_ms = 2000
//! ```

mod config;
mod consumer;
mod events;
mod lock;
mod middleware;
mod planner;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use middleware::{CACHE_INVALIDATE_HEADER, purge_layer};
pub use planner::PurgePlan;
pub use trigger::CacheTrigger;
