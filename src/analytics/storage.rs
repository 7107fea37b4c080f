//! In-memory metric storage.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Append-only, process-local metric list.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    records: Arc<RwLock<Vec<MetricRecord>>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: MetricRecord) {
        let mut records = self.records.write().expect("metric store lock poisoned");
        records.push(record);
    }

    /// Values of every record of the given type, in arrival order.
    pub fn values_of(&self, kind: &str) -> Vec<f64> {
        let records = self.records.read().expect("metric store lock poisoned");
        records
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.value)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("metric store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
