use std::sync::Arc;

use tracing::{error, info, instrument};

use super::{
    event::{SensorEvent, ValidationError},
    outcome::{Backend, DualWriteResult, WriteOutcome},
    sink::MetricsSink,
    store::{AdapterError, RelationalStore, TimeSeriesStore},
};

/// Writes every reading to both stores and reports each store's verdict.
///
/// Flow:
/// 1. Validate the event (no store is touched for a malformed event)
/// 2. Commit to the relational and time-series stores concurrently
/// 3. Count one success or failure per store
/// 4. Return both outcomes
///
/// The two commits share no transaction. A failure in one store never
/// prevents or undoes the write to the other.
pub struct IngestService {
    relational: Arc<dyn RelationalStore>,
    time_series: Arc<dyn TimeSeriesStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl IngestService {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        time_series: Arc<dyn TimeSeriesStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            relational,
            time_series,
            metrics,
        }
    }

    /// Dual-write one reading.
    ///
    /// Only a malformed event produces an `Err`. Store failures are reported
    /// in the returned [`DualWriteResult`]; both commits always run to
    /// completion before this returns.
    #[instrument(skip_all, fields(device_id = ?event.device_id))]
    pub async fn ingest(&self, event: &SensorEvent) -> Result<DualWriteResult, ValidationError> {
        let record = event.validate()?;

        let (relational, time_series) = tokio::join!(
            self.relational.commit_reading(&record),
            self.time_series.commit_point(&record),
        );

        Ok(DualWriteResult {
            relational: self.settle(Backend::Relational, &record.device_id, relational),
            time_series: self.settle(Backend::TimeSeries, &record.device_id, time_series),
        })
    }

    fn settle(
        &self,
        backend: Backend,
        device_id: &str,
        result: Result<(), AdapterError>,
    ) -> WriteOutcome {
        match &result {
            Ok(()) => {
                self.metrics.inc_success(backend);
                info!(device_id = %device_id, backend = %backend, "Reading committed");
            }
            Err(e) => {
                self.metrics.inc_failure(backend);
                error!(device_id = %device_id, backend = %backend, error = %e, "Reading commit failed");
            }
        }
        WriteOutcome::from(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::ingest::{
        event::{Channel, SensorRecord},
        sink::MockMetricsSink,
        store::{MockRelationalStore, MockTimeSeriesStore},
    };

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    /// Keeps every committed record, or fails every call with `fault`.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<SensorRecord>>,
        fault: Option<&'static str>,
    }

    impl MemoryStore {
        fn failing(fault: &'static str) -> Self {
            Self {
                records: Mutex::default(),
                fault: Some(fault),
            }
        }

        fn commit(&self, record: &SensorRecord) -> Result<(), AdapterError> {
            if let Some(fault) = self.fault {
                return Err(AdapterError::Connection(fault.to_owned()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn records(&self) -> Vec<SensorRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelationalStore for MemoryStore {
        async fn commit_reading(&self, record: &SensorRecord) -> Result<(), AdapterError> {
            self.commit(record)
        }
    }

    #[async_trait]
    impl TimeSeriesStore for MemoryStore {
        async fn commit_point(&self, record: &SensorRecord) -> Result<(), AdapterError> {
            self.commit(record)
        }
    }

    #[derive(Default)]
    struct CountingMetrics {
        // [relational success, relational failure, ts success, ts failure]
        counts: [AtomicU64; 4],
    }

    impl CountingMetrics {
        fn slot(backend: Backend, success: bool) -> usize {
            let base = match backend {
                Backend::Relational => 0,
                Backend::TimeSeries => 2,
            };
            base + usize::from(!success)
        }

        fn get(&self, backend: Backend, success: bool) -> u64 {
            self.counts[Self::slot(backend, success)].load(Ordering::SeqCst)
        }

        fn total(&self) -> u64 {
            self.counts.iter().map(|c| c.load(Ordering::SeqCst)).sum()
        }
    }

    impl MetricsSink for CountingMetrics {
        fn inc_success(&self, backend: Backend) {
            self.counts[Self::slot(backend, true)].fetch_add(1, Ordering::SeqCst);
        }

        fn inc_failure(&self, backend: Backend) {
            self.counts[Self::slot(backend, false)].fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        relational: Arc<MemoryStore>,
        time_series: Arc<MemoryStore>,
        metrics: Arc<CountingMetrics>,
        service: IngestService,
    }

    fn harness(relational: MemoryStore, time_series: MemoryStore) -> Harness {
        let relational = Arc::new(relational);
        let time_series = Arc::new(time_series);
        let metrics = Arc::new(CountingMetrics::default());
        let service = IngestService::new(relational.clone(), time_series.clone(), metrics.clone());
        Harness {
            relational,
            time_series,
            metrics,
            service,
        }
    }

    fn store(fails: bool) -> MemoryStore {
        if fails {
            MemoryStore::failing("connection fault")
        } else {
            MemoryStore::default()
        }
    }

    fn child123() -> SensorEvent {
        SensorEvent::new("child123")
            .with_reading(Channel::Temperature, 21.5)
            .with_reading(Channel::Humidity, 60.0)
            .with_reading(Channel::Light, 300.0)
            .with_reading(Channel::SoilCapacitive, 450.0)
            .with_reading(Channel::SoilResistive, 200.0)
            .with_reading(Channel::WaterLevel, 80.0)
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn healthy_stores_both_succeed() {
        let h = harness(store(false), store(false));

        let result = h.service.ingest(&child123()).await.unwrap();

        assert_eq!(result.relational, WriteOutcome::Success);
        assert_eq!(result.time_series, WriteOutcome::Success);
        assert_eq!(h.metrics.get(Backend::Relational, true), 1);
        assert_eq!(h.metrics.get(Backend::TimeSeries, true), 1);
        assert_eq!(h.metrics.total(), 2);

        let rows = h.relational.records();
        let points = h.time_series.records();
        assert_eq!(rows.len(), 1);
        assert_eq!(points.len(), 1);
        assert_eq!(rows[0].device_id, "child123");
        assert_eq!(points[0].device_id, "child123");
    }

    #[tokio::test]
    async fn time_series_fault_keeps_relational_write() {
        let h = harness(store(false), store(true));

        let result = h.service.ingest(&child123()).await.unwrap();

        assert_eq!(result.relational, WriteOutcome::Success);
        assert_eq!(result.time_series, WriteOutcome::failure("connection fault"));
        assert_eq!(h.relational.records().len(), 1);
        assert_eq!(h.metrics.get(Backend::TimeSeries, true), 0);
        assert_eq!(h.metrics.get(Backend::TimeSeries, false), 1);
        assert_eq!(h.metrics.get(Backend::Relational, true), 1);
    }

    #[tokio::test]
    async fn missing_temperature_touches_nothing() {
        let h = harness(store(false), store(false));
        let mut event = child123();
        event.readings.remove(&Channel::Temperature);

        let err = h.service.ingest(&event).await.unwrap_err();

        assert_eq!(err, ValidationError::MissingChannel(Channel::Temperature));
        assert!(h.relational.records().is_empty());
        assert!(h.time_series.records().is_empty());
        assert_eq!(h.metrics.total(), 0);
    }

    #[tokio::test]
    async fn every_outcome_pair_is_reported_independently() {
        for (rel_fails, ts_fails) in [(false, false), (false, true), (true, false), (true, true)] {
            let h = harness(store(rel_fails), store(ts_fails));

            let result = h.service.ingest(&child123()).await.unwrap();

            assert_eq!(result.relational.is_success(), !rel_fails);
            assert_eq!(result.time_series.is_success(), !ts_fails);

            assert_eq!(h.metrics.get(Backend::Relational, true), u64::from(!rel_fails));
            assert_eq!(h.metrics.get(Backend::Relational, false), u64::from(rel_fails));
            assert_eq!(h.metrics.get(Backend::TimeSeries, true), u64::from(!ts_fails));
            assert_eq!(h.metrics.get(Backend::TimeSeries, false), u64::from(ts_fails));
            assert_eq!(h.metrics.total(), 2);
        }
    }

    #[tokio::test]
    async fn same_event_twice_writes_twice() {
        let h = harness(store(false), store(false));
        let event = child123();

        h.service.ingest(&event).await.unwrap();
        h.service.ingest(&event).await.unwrap();

        assert_eq!(h.relational.records().len(), 2);
        assert_eq!(h.time_series.records().len(), 2);
        assert_eq!(h.metrics.get(Backend::Relational, true), 2);
        assert_eq!(h.metrics.get(Backend::TimeSeries, true), 2);
    }

    #[tokio::test]
    async fn event_is_left_untouched() {
        let h = harness(store(false), store(true));
        let event = child123().with_gateway("gw-7");
        let before = event.clone();

        h.service.ingest(&event).await.unwrap();

        assert_eq!(event, before);
    }

    // -----------------------------------------------------------------------
    // Call-count expectations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn relational_failure_still_attempts_time_series() {
        let mut relational = MockRelationalStore::new();
        let mut time_series = MockTimeSeriesStore::new();
        let mut metrics = MockMetricsSink::new();

        relational
            .expect_commit_reading()
            .times(1)
            .returning(|_| Err(AdapterError::Connection("db down".into())));
        time_series
            .expect_commit_point()
            .withf(|record: &SensorRecord| record.device_id == "child123" && record.light == 300.0)
            .times(1)
            .returning(|_| Ok(()));
        metrics
            .expect_inc_failure()
            .withf(|b: &Backend| *b == Backend::Relational)
            .times(1)
            .return_const(());
        metrics
            .expect_inc_success()
            .withf(|b: &Backend| *b == Backend::TimeSeries)
            .times(1)
            .return_const(());

        let service =
            IngestService::new(Arc::new(relational), Arc::new(time_series), Arc::new(metrics));
        let result = service.ingest(&child123()).await.unwrap();

        assert_eq!(result.relational, WriteOutcome::failure("db down"));
        assert_eq!(result.time_series, WriteOutcome::Success);
    }

    #[tokio::test]
    async fn missing_device_id_invokes_no_store() {
        let mut relational = MockRelationalStore::new();
        let mut time_series = MockTimeSeriesStore::new();
        let mut metrics = MockMetricsSink::new();
        relational.expect_commit_reading().never();
        time_series.expect_commit_point().never();
        metrics.expect_inc_success().never();
        metrics.expect_inc_failure().never();

        let service =
            IngestService::new(Arc::new(relational), Arc::new(time_series), Arc::new(metrics));
        let mut event = child123();
        event.device_id = None;

        let err = service.ingest(&event).await.unwrap_err();
        assert_eq!(err, ValidationError::MissingDeviceId);
    }
}
