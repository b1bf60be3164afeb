//! Drains purge events and forwards the merged plan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::Client;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner::PurgePlan;

const METRIC_PURGE_TOTAL: &str = "quire_cache_purge_total";
const METRIC_PURGE_FAILED_TOTAL: &str = "quire_cache_purge_failed_total";
const METRIC_CACHE_CONSUME_MS: &str = "quire_cache_consume_ms";

/// Forwards purge plans to the configured webhook, or logs them when none is
/// configured.
pub struct CacheConsumer {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    client: Client,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            config,
            queue,
            client,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Consume pending events. Returns the plan that was executed, if any.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> Option<PurgePlan> {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.batch_limit());
        if events.is_empty() {
            return None;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = PurgePlan::from_events(events);

        info!(
            target = "quire::cache::consumer",
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "purge consumption starting"
        );

        let scope = if plan.all { "all" } else { "paths" };
        match self.forward(&plan).await {
            Ok(()) => {
                counter!(METRIC_PURGE_TOTAL, "scope" => scope).increment(1);
            }
            Err(err) => {
                counter!(METRIC_PURGE_FAILED_TOTAL, "scope" => scope).increment(1);
                error!(
                    target = "quire::cache::consumer",
                    error = %err,
                    plan = %plan,
                    "purge webhook failed"
                );
            }
        }

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        Some(plan)
    }

    async fn forward(&self, plan: &PurgePlan) -> Result<(), reqwest::Error> {
        let Some(url) = self.config.purge_url.clone() else {
            info!(
                target = "quire::cache::consumer",
                purge = plan.header_value().unwrap_or_default(),
                "purge recorded (no webhook configured)"
            );
            return Ok(());
        };

        self.client
            .post(url)
            .json(plan)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EventKind;

    fn consumer(queue: Arc<EventQueue>, batch: usize) -> CacheConsumer {
        let config = CacheConfig {
            consume_batch_limit: batch,
            ..Default::default()
        };
        CacheConsumer::new(config, queue).expect("client")
    }

    #[tokio::test]
    async fn empty_queue_consumes_nothing() {
        let queue = Arc::new(EventQueue::new());
        assert!(consumer(queue, 10).consume().await.is_none());
    }

    #[tokio::test]
    async fn consume_respects_batch_limit() {
        let queue = Arc::new(EventQueue::new());
        queue.publish(EventKind::PurgePaths {
            paths: vec!["/p/a/".into()],
        });
        queue.publish(EventKind::PurgeAll);

        let consumer = consumer(queue.clone(), 1);
        let plan = consumer.consume().await.expect("plan");
        assert!(!plan.all);
        assert_eq!(queue.len(), 1);

        let plan = consumer.consume().await.expect("plan");
        assert!(plan.all);
        assert!(queue.is_empty());
    }
}
