//! Metric summaries with read-through caching.
//!
//! Cache key: `summary:{type}:{period}`. Empty summaries are never cached so
//! a type that starts receiving data shows up immediately. Cache failures
//! are logged and the summary is recomputed; they never fail the request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analytics::storage::MetricStore;
use crate::store::{CacheStore, Store};

/// Aggregate of all stored metrics of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub period: String,
    pub average_value: f64,
    pub count: usize,
}

/// Computes summaries, consulting the shared cache first.
pub struct SummaryService<C: ?Sized = dyn Store> {
    metrics: MetricStore,
    cache: Arc<C>,
    ttl_secs: u64,
}

impl<C: CacheStore + ?Sized> SummaryService<C> {
    pub fn new(metrics: MetricStore, cache: Arc<C>, ttl_secs: u64) -> Self {
        Self {
            metrics,
            cache,
            ttl_secs,
        }
    }

    pub fn cache_key(kind: &str, period: &str) -> String {
        format!("summary:{}:{}", kind, period)
    }

    pub async fn summarize(&self, kind: &str, period: &str) -> MetricSummary {
        let key = Self::cache_key(kind, period);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<MetricSummary>(&cached) {
                Ok(summary) => {
                    tracing::debug!(key = %key, "Summary cache hit");
                    return summary;
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Discarding unreadable cached summary"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Summary cache unavailable"),
        }

        let values = self.metrics.values_of(kind);
        if values.is_empty() {
            return MetricSummary {
                kind: kind.to_string(),
                period: period.to_string(),
                average_value: 0.0,
                count: 0,
            };
        }

        let count = values.len();
        let summary = MetricSummary {
            kind: kind.to_string(),
            period: period.to_string(),
            average_value: values.iter().sum::<f64>() / count as f64,
            count,
        };

        match serde_json::to_string(&summary) {
            Ok(json) => {
                if let Err(e) = self.cache.set_with_ttl(&key, &json, self.ttl_secs).await {
                    tracing::warn!(key = %key, error = %e, "Failed to cache summary");
                }
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to encode summary"),
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::storage::MetricRecord;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn seeded(values: &[(&str, f64)]) -> MetricStore {
        let metrics = MetricStore::new();
        for (kind, value) in values {
            metrics.add(MetricRecord {
                timestamp: Utc::now(),
                value: *value,
                kind: kind.to_string(),
            });
        }
        metrics
    }

    #[tokio::test]
    async fn test_average_and_cache_fill() {
        let cache = Arc::new(MemoryStore::new());
        let service = SummaryService::new(seeded(&[("cpu", 10.0), ("cpu", 20.0)]), cache.clone(), 60);

        let summary = service.summarize("cpu", "daily").await;
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average_value, 15.0);
        assert!(cache.contains_key("summary:cpu:daily"));
    }

    #[tokio::test]
    async fn test_empty_summary_not_cached() {
        let cache = Arc::new(MemoryStore::new());
        let service = SummaryService::new(MetricStore::new(), cache.clone(), 60);

        let summary = service.summarize("cpu", "daily").await;
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average_value, 0.0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cached_summary_wins_until_expiry() {
        let cache = Arc::new(MemoryStore::new());
        let metrics = seeded(&[("cpu", 10.0)]);
        let service = SummaryService::new(metrics.clone(), cache, 60);

        service.summarize("cpu", "daily").await;
        metrics.add(MetricRecord {
            timestamp: Utc::now(),
            value: 50.0,
            kind: "cpu".into(),
        });

        let summary = service.summarize("cpu", "daily").await;
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average_value, 10.0);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_recomputed() {
        let cache = Arc::new(MemoryStore::new());
        cache.set_with_ttl("summary:cpu:daily", "not json", 60).await.unwrap();
        let service = SummaryService::new(seeded(&[("cpu", 4.0)]), cache, 60);

        let summary = service.summarize("cpu", "daily").await;
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average_value, 4.0);
    }
}
