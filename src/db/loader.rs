//! Batched writes of the final table with bounded, linearly backed-off
//! retries. A batch that exhausts its retries is counted as failed and the
//! load moves on to the next one.

use crate::config::{LoaderConfig, MAX_BATCH_SIZE};
use crate::db::models::{AirQualityRecord, LoadSummary};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

/// Destination for batches of records.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Write one batch, returning the number of rows written.
    async fn insert_batch(&self, table: &str, batch: &[AirQualityRecord]) -> Result<u64>;
}

pub struct BatchLoader<S> {
    config: LoaderConfig,
    sink: S,
}

impl<S: BatchSink> BatchLoader<S> {
    pub fn new(config: LoaderConfig, sink: S) -> Self {
        Self { config, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn load(&self, records: &[AirQualityRecord]) -> LoadSummary {
        let mut summary = LoadSummary {
            total_rows: records.len(),
            ..LoadSummary::default()
        };

        if records.is_empty() {
            info!("No rows to load");
            return summary;
        }

        let batch_size = self.config.batch_size.clamp(1, MAX_BATCH_SIZE);
        let batch_count = records.len().div_ceil(batch_size);

        for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
            let first_row = batch_idx * batch_size;
            match self.insert_with_retry(batch_idx, batch_count, batch).await {
                Ok(attempt) => {
                    summary.inserted_rows += batch.len();
                    info!(
                        "Inserted batch {}-{} ({} rows) on attempt {}",
                        first_row,
                        first_row + batch.len() - 1,
                        batch.len(),
                        attempt
                    );
                }
                Err(e) => {
                    summary.failed_rows += batch.len();
                    summary.failed_batches += 1;
                    error!(
                        "Max retries exceeded for batch {}-{}, skipping {} rows: {}",
                        first_row,
                        first_row + batch.len() - 1,
                        batch.len(),
                        e
                    );
                }
            }
        }

        info!(
            "Load summary: {} total, {} inserted, {} failed ({} batches)",
            summary.total_rows, summary.inserted_rows, summary.failed_rows, summary.failed_batches
        );
        summary
    }

    /// Returns the 1-based attempt that succeeded, or the last error.
    async fn insert_with_retry(
        &self,
        batch_idx: usize,
        batch_count: usize,
        batch: &[AirQualityRecord],
    ) -> Result<u32> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.insert_batch(&self.config.table_name, batch).await {
                Ok(_) => return Ok(attempt),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Batch {}/{} insert failed (attempt {}/{}): {}. Retrying in {:?}...",
                        batch_idx + 1,
                        batch_count,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.config.backoff_seconds * f64::from(attempt);
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::enrich;
    use crate::model::CanonicalRow;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    struct NullSink;

    #[async_trait]
    impl BatchSink for NullSink {
        async fn insert_batch(&self, _table: &str, batch: &[AirQualityRecord]) -> Result<u64> {
            Ok(batch.len() as u64)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batch_lens: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn insert_batch(&self, _table: &str, batch: &[AirQualityRecord]) -> Result<u64> {
            self.batch_lens.lock().unwrap().push(batch.len());
            Ok(batch.len() as u64)
        }
    }

    fn config(backoff_seconds: f64) -> LoaderConfig {
        LoaderConfig {
            backoff_seconds,
            ..LoaderConfig::default()
        }
    }

    #[test]
    fn test_backoff_is_linear() {
        let loader = BatchLoader::new(config(2.0), NullSink);
        assert_eq!(loader.backoff(1), Duration::from_secs(2));
        assert_eq!(loader.backoff(2), Duration::from_secs(4));
        assert_eq!(loader.backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn test_zero_backoff() {
        let loader = BatchLoader::new(config(0.0), NullSink);
        assert_eq!(loader.backoff(5), Duration::ZERO);
    }

    #[test]
    fn test_empty_load() {
        let loader = BatchLoader::new(config(0.0), NullSink);
        let summary = tokio_test::block_on(loader.load(&[]));
        assert_eq!(summary, LoadSummary::default());
        assert!(summary.is_complete());
    }

    #[test]
    fn test_oversized_batches_are_split_to_bind_limit() {
        let record = AirQualityRecord::from(&enrich(CanonicalRow::empty(
            "Delhi",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )));
        let records = vec![record; MAX_BATCH_SIZE + 1];
        let loader = BatchLoader::new(
            LoaderConfig {
                batch_size: 10_000,
                ..config(0.0)
            },
            RecordingSink::default(),
        );

        let summary = tokio_test::block_on(loader.load(&records));

        assert_eq!(summary.inserted_rows, MAX_BATCH_SIZE + 1);
        assert_eq!(*loader.sink().batch_lens.lock().unwrap(), vec![MAX_BATCH_SIZE, 1]);
    }
}
