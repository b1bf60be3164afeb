//! Publishes purge events and optionally consumes them right away.

use std::sync::Arc;

use tracing::debug;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

#[derive(Clone)]
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub async fn trigger(&self, kind: EventKind) {
        if !self.config.is_enabled() {
            debug!(
                target = "quire::cache::trigger",
                event_kind = ?kind,
                "purge skipped: cache disabled"
            );
            return;
        }

        self.queue.publish(kind);

        if self.config.consume_immediately {
            self.consumer.consume().await;
        }
    }

    /// Publish the purge described by an `X-Cache-Invalidate` value.
    pub async fn invalidate_header(&self, value: &str) {
        if let Some(kind) = EventKind::from_header(value) {
            self.trigger(kind).await;
        }
    }
}
