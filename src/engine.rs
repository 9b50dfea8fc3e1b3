//! `MetricsEngine`: the surface consumed by the HTTP layer. Bundles the
//! aggregators, dispatcher, scorer and refresher over one set of injected
//! stores, and memoizes financial range reads in the cache.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::attendance::AttendanceAggregator;
use crate::dashboard::DashboardRefresher;
use crate::dispatch::EventDispatcher;
use crate::error::{EngineError, Result};
use crate::financial::FinancialAggregator;
use crate::keys;
use crate::models::{
    AttendanceSnapshot, DashboardView, DispatchOutcome, FinancialSnapshot, InboundEvent,
    OperationalSnapshot, QualityCheckResult,
};
use crate::operational::OperationalAggregator;
use crate::quality::QualityScorer;
use crate::store::{Cache, DateRange, EventLedger, QualityLedger, RawRecords, SnapshotStore};

/// How long memoized range reads live. Invalidation happens earlier when
/// an aggregator drops the domain version key.
const READ_CACHE_TTL_SECONDS: u64 = 300;

pub struct MetricsEngine {
    store: Arc<dyn SnapshotStore>,
    cache: Arc<dyn Cache>,
    financial: FinancialAggregator,
    attendance: AttendanceAggregator,
    operational: OperationalAggregator,
    refresher: DashboardRefresher,
    dispatcher: EventDispatcher,
    scorer: QualityScorer,
    quality_ledger: Arc<dyn QualityLedger>,
}

impl MetricsEngine {
    pub fn new(
        raw: Arc<dyn RawRecords>,
        store: Arc<dyn SnapshotStore>,
        events: Arc<dyn EventLedger>,
        quality_ledger: Arc<dyn QualityLedger>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let financial = FinancialAggregator::new(raw.clone(), store.clone(), cache.clone());
        let attendance = AttendanceAggregator::new(raw.clone(), store.clone(), cache.clone());
        let operational = OperationalAggregator::new(raw.clone(), store.clone(), cache.clone());
        let dispatcher = EventDispatcher::new(
            events,
            financial.clone(),
            attendance.clone(),
            operational.clone(),
        );
        let scorer = QualityScorer::new(raw, quality_ledger.clone());

        MetricsEngine {
            refresher: DashboardRefresher::new(store.clone()),
            store,
            cache,
            financial,
            attendance,
            operational,
            dispatcher,
            scorer,
            quality_ledger,
        }
    }

    // -- aggregation entry points -----------------------------------------

    pub async fn aggregate_financial(&self, date: NaiveDate) -> Result<FinancialSnapshot> {
        self.financial.aggregate(date).await
    }

    pub async fn aggregate_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceSnapshot>> {
        self.attendance.aggregate(date).await
    }

    pub async fn aggregate_operational(&self, date: NaiveDate) -> Result<OperationalSnapshot> {
        self.operational.aggregate(date).await
    }

    /// Run all three aggregators for `date`, then refresh the dashboard
    /// view.
    pub async fn aggregate_all(&self, date: NaiveDate) -> Result<DashboardView> {
        self.financial.aggregate(date).await?;
        self.attendance.aggregate(date).await?;
        self.operational.aggregate(date).await?;
        self.refresher.refresh().await
    }

    pub async fn refresh_dashboard(&self) -> Result<DashboardView> {
        self.refresher.refresh().await
    }

    pub async fn process_event(&self, event: &InboundEvent) -> Result<DispatchOutcome> {
        self.dispatcher.process(event).await
    }

    // -- reads -------------------------------------------------------------

    /// Financial snapshots for a date range, memoized in the cache under
    /// the current financial version. A cache failure only costs the
    /// memoization: the snapshot store stays authoritative.
    pub async fn financial_metrics(&self, range: DateRange) -> Result<Vec<FinancialSnapshot>> {
        let entry_key = match self.domain_version(keys::FINANCIAL_VERSION).await {
            Some(version) => Some(format!(
                "metrics:financial:{version}:{}:{}",
                range.start(),
                range.end()
            )),
            None => None,
        };

        if let Some(key) = &entry_key {
            if let Ok(Some(cached)) = self.cache.get(key).await {
                if let Ok(rows) = serde_json::from_str::<Vec<FinancialSnapshot>>(&cached) {
                    debug!(key, "financial metrics served from cache");
                    return Ok(rows);
                }
            }
        }

        let rows = self.store.financial_in(range).await?;

        if let Some(key) = &entry_key {
            if let Ok(body) = serde_json::to_string(&rows) {
                if let Err(err) = self
                    .cache
                    .set_with_expiry(key, READ_CACHE_TTL_SECONDS, &body)
                    .await
                {
                    debug!(%err, "failed to memoize financial metrics");
                }
            }
        }
        Ok(rows)
    }

    pub async fn attendance_metrics(
        &self,
        since_days: i64,
        class_id: Option<Uuid>,
    ) -> Result<Vec<AttendanceSnapshot>> {
        let since = window_start(since_days)?;
        self.store.attendance_since(since, class_id).await
    }

    pub async fn operational_metrics(&self, since_days: i64) -> Result<Vec<OperationalSnapshot>> {
        let since = window_start(since_days)?;
        self.store.operational_since(since).await
    }

    pub async fn latest_dashboard_view(&self) -> Result<Option<DashboardView>> {
        self.store.latest_dashboard_view().await
    }

    // -- quality -----------------------------------------------------------

    pub async fn run_full_quality_check(&self) -> Result<Vec<QualityCheckResult>> {
        self.scorer.run_full_check().await
    }

    /// Latest ledger entry per audited table.
    pub async fn quality_report(&self) -> Result<Vec<QualityCheckResult>> {
        self.quality_ledger.latest_per_table().await
    }

    pub async fn quality_history(&self, table: &str, days: i64) -> Result<Vec<QualityCheckResult>> {
        if !self.scorer.tables().contains(&table) {
            return Err(EngineError::validation(format!("unknown table: {table}")));
        }
        if days <= 0 {
            return Err(EngineError::validation("days must be positive"));
        }
        self.quality_ledger.history(table, days).await
    }

    /// Current value of a per-domain cache version, established on first
    /// use. `None` when the cache is unreachable, which disables
    /// memoization for the call.
    async fn domain_version(&self, version_key: &str) -> Option<String> {
        match self.cache.get(version_key).await {
            Ok(Some(version)) => Some(version),
            Ok(None) => {
                let version = Uuid::new_v4().simple().to_string();
                match self
                    .cache
                    .set_with_expiry(version_key, 86_400, &version)
                    .await
                {
                    Ok(()) => Some(version),
                    Err(_) => None,
                }
            }
            Err(err) => {
                debug!(%err, version_key, "cache unreachable, skipping memoization");
                None
            }
        }
    }
}

fn window_start(since_days: i64) -> Result<NaiveDate> {
    if since_days <= 0 {
        return Err(EngineError::validation("since_days must be positive"));
    }
    Ok(Utc::now().date_naive() - Duration::days(since_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, MemoryCache};
    use crate::models::{BillRecord, BillStatus};
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn engine(backend: Arc<MemoryBackend>) -> MetricsEngine {
        MetricsEngine::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
            Arc::new(MemoryCache::new()),
        )
    }

    fn paid_bill(amount: f64, paid_on: NaiveDate) -> BillRecord {
        BillRecord {
            id: Uuid::new_v4(),
            student_id: None,
            amount,
            status: BillStatus::Paid,
            issued_on: paid_on - Duration::days(3),
            due_on: Some(paid_on + Duration::days(7)),
            paid_on: Some(paid_on),
        }
    }

    #[tokio::test]
    async fn cached_read_is_invalidated_by_aggregation() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend.clone());

        let date = d(2026, 5, 10);
        let range = DateRange::day(date);
        backend.push_bill(paid_bill(100.0, d(2026, 5, 3)));
        engine.aggregate_financial(date).await.unwrap();

        let rows = engine.financial_metrics(range).await.unwrap();
        assert_eq!(rows[0].mrr, 100.0);

        // Mutate the store behind the cache's back: the memoized value
        // still answers.
        backend
            .upsert_financial(&FinancialSnapshot {
                mrr: 999.0,
                ..rows[0].clone()
            })
            .await
            .unwrap();
        let cached = engine.financial_metrics(range).await.unwrap();
        assert_eq!(cached[0].mrr, 100.0);

        // Aggregating drops the domain version, so the next read is fresh.
        backend.push_bill(paid_bill(150.0, d(2026, 5, 4)));
        engine.aggregate_financial(date).await.unwrap();
        let fresh = engine.financial_metrics(range).await.unwrap();
        assert_eq!(fresh[0].mrr, 250.0);
    }

    #[tokio::test]
    async fn event_processing_reaches_the_snapshot_store() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend.clone());

        let event = InboundEvent {
            event_id: "evt-engine".to_string(),
            event_type: "payment.confirmed".to_string(),
            payload: serde_json::Value::Null,
            timestamp: Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap(),
        };
        assert!(engine.process_event(&event).await.unwrap().accepted);
        assert!(!engine.process_event(&event).await.unwrap().accepted);
        assert!(backend.financial_row(d(2026, 5, 10)).is_some());
    }

    #[tokio::test]
    async fn quality_history_rejects_unknown_table_and_bad_window() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend);

        assert!(matches!(
            engine.quality_history("payments", 30).await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.quality_history("students", 0).await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(engine.quality_history("students", 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quality_report_keeps_latest_entry_per_table() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend);

        engine.run_full_quality_check().await.unwrap();
        engine.run_full_quality_check().await.unwrap();

        let report = engine.quality_report().await.unwrap();
        assert_eq!(report.len(), 5);
        let history = engine.quality_history("billing", 7).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn windowed_reads_validate_and_filter() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend.clone());

        assert!(matches!(
            engine.attendance_metrics(0, None).await.unwrap_err(),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            engine.operational_metrics(-3).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        let today = Utc::now().date_naive();
        engine.aggregate_operational(today).await.unwrap();
        engine
            .aggregate_operational(today - Duration::days(45))
            .await
            .unwrap();

        let recent = engine.operational_metrics(30).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].date, today);

        assert!(engine.attendance_metrics(30, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn aggregate_all_materializes_the_dashboard() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = engine(backend);

        let view = engine.aggregate_all(d(2026, 5, 10)).await.unwrap();
        assert!(view.financial.is_some());
        assert!(view.operational.is_some());
        assert!(engine.latest_dashboard_view().await.unwrap().is_some());
    }
}
