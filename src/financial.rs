//! Daily financial aggregation: MRR, delinquency, bill conversion and DSO
//! computed from raw billing records and upserted as one snapshot per date.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::keys;
use crate::models::{pct, round2, FinancialSnapshot};
use crate::store::{Cache, DateRange, RawRecords, SnapshotStore};

#[derive(Clone)]
pub struct FinancialAggregator {
    raw: Arc<dyn RawRecords>,
    store: Arc<dyn SnapshotStore>,
    cache: Arc<dyn Cache>,
}

impl FinancialAggregator {
    pub fn new(
        raw: Arc<dyn RawRecords>,
        store: Arc<dyn SnapshotStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        FinancialAggregator { raw, store, cache }
    }

    /// Recompute the financial snapshot for `date` from raw billing
    /// records. Any storage failure aborts the run before the upsert, so
    /// no partial snapshot is ever committed.
    pub async fn aggregate(&self, date: NaiveDate) -> Result<FinancialSnapshot> {
        // MRR: bills paid anywhere within date's calendar month.
        let paid_this_month = self
            .raw
            .bills_paid_in(DateRange::calendar_month(date))
            .await?;
        let mrr = round2(paid_this_month.iter().map(|b| b.amount).sum());

        // Delinquency: overdue and unpaid as of `date`, over everything
        // due on or before it.
        let due = self.raw.bills_due_on_or_before(date).await?;
        let bills_overdue = due.iter().filter(|b| b.is_delinquent(date)).count() as i64;
        let delinquency_pct = pct(bills_overdue, due.len() as i64);

        // Conversion: issued on `date` and already paid.
        let issued = self.raw.bills_issued_on(date).await?;
        let bills_paid = issued.iter().filter(|b| b.is_paid()).count() as i64;
        let conversion_pct = pct(bills_paid, issued.len() as i64);

        // DSO: mean days from issue to payment over the trailing 30 days.
        let paid_recent = self
            .raw
            .bills_paid_in(DateRange::trailing(date, 30))
            .await?;
        let settle_days: Vec<i64> = paid_recent
            .iter()
            .filter_map(|b| b.paid_on.map(|paid| (paid - b.issued_on).num_days()))
            .collect();
        let dso_days = if settle_days.is_empty() {
            0
        } else {
            let mean = settle_days.iter().sum::<i64>() as f64 / settle_days.len() as f64;
            (mean.round() as i64).max(0)
        };

        let snapshot = FinancialSnapshot {
            date,
            mrr,
            delinquency_pct,
            conversion_pct,
            dso_days,
            bills_issued: issued.len() as i64,
            bills_paid,
            bills_overdue,
        };

        self.store.upsert_financial(&snapshot).await?;
        self.cache.delete(keys::FINANCIAL_VERSION).await?;

        info!(%date, mrr, delinquency_pct, "financial metrics aggregated");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FaultyRaw, MemoryBackend, MemoryCache};
    use crate::models::{BillRecord, BillStatus};
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bill(
        amount: f64,
        status: BillStatus,
        issued_on: NaiveDate,
        due_on: NaiveDate,
        paid_on: Option<NaiveDate>,
    ) -> BillRecord {
        BillRecord {
            id: Uuid::new_v4(),
            student_id: Some(Uuid::new_v4()),
            amount,
            status,
            issued_on,
            due_on: Some(due_on),
            paid_on,
        }
    }

    fn aggregator(backend: Arc<MemoryBackend>) -> FinancialAggregator {
        FinancialAggregator::new(backend.clone(), backend, Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn empty_billing_produces_zeroed_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let snap = aggregator(backend.clone())
            .aggregate(d(2026, 5, 10))
            .await
            .unwrap();

        assert_eq!(snap.mrr, 0.0);
        assert_eq!(snap.delinquency_pct, 0.0);
        assert_eq!(snap.conversion_pct, 0.0);
        assert_eq!(snap.dso_days, 0);
        assert!(backend.financial_row(d(2026, 5, 10)).is_some());
    }

    #[tokio::test]
    async fn delinquency_counts_overdue_unpaid_over_all_due() {
        let backend = Arc::new(MemoryBackend::new());
        let today = d(2026, 5, 10);
        // 3 overdue and unpaid.
        for _ in 0..3 {
            backend.push_bill(bill(
                100.0,
                BillStatus::Open,
                d(2026, 4, 1),
                d(2026, 4, 20),
                None,
            ));
        }
        // 7 due on or before today but settled or not yet overdue.
        for _ in 0..5 {
            backend.push_bill(bill(
                100.0,
                BillStatus::Paid,
                d(2026, 4, 1),
                d(2026, 4, 20),
                Some(d(2026, 4, 18)),
            ));
        }
        for _ in 0..2 {
            backend.push_bill(bill(100.0, BillStatus::Open, d(2026, 5, 1), today, None));
        }

        let snap = aggregator(backend).aggregate(today).await.unwrap();
        assert_eq!(snap.delinquency_pct, 30.0);
        assert_eq!(snap.bills_overdue, 3);
    }

    #[tokio::test]
    async fn mrr_sums_payments_across_the_whole_month() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 5, 10);
        // Paid before and after the aggregation date, same month.
        backend.push_bill(bill(
            150.0,
            BillStatus::Paid,
            d(2026, 4, 25),
            d(2026, 5, 5),
            Some(d(2026, 5, 3)),
        ));
        backend.push_bill(bill(
            200.0,
            BillStatus::Paid,
            d(2026, 5, 1),
            d(2026, 5, 20),
            Some(d(2026, 5, 28)),
        ));
        // Paid in the previous month: excluded.
        backend.push_bill(bill(
            500.0,
            BillStatus::Paid,
            d(2026, 4, 1),
            d(2026, 4, 10),
            Some(d(2026, 4, 9)),
        ));

        let snap = aggregator(backend).aggregate(date).await.unwrap();
        assert_eq!(snap.mrr, 350.0);
    }

    #[tokio::test]
    async fn conversion_tracks_bills_issued_on_the_date() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 5, 10);
        backend.push_bill(bill(
            80.0,
            BillStatus::Paid,
            date,
            d(2026, 5, 25),
            Some(date),
        ));
        backend.push_bill(bill(80.0, BillStatus::Open, date, d(2026, 5, 25), None));
        backend.push_bill(bill(80.0, BillStatus::Open, date, d(2026, 5, 25), None));
        backend.push_bill(bill(
            80.0,
            BillStatus::Paid,
            d(2026, 5, 9),
            d(2026, 5, 25),
            Some(date),
        ));

        let snap = aggregator(backend).aggregate(date).await.unwrap();
        assert_eq!(snap.bills_issued, 3);
        assert_eq!(snap.bills_paid, 1);
        assert_eq!(snap.conversion_pct, 33.33);
    }

    #[tokio::test]
    async fn dso_rounds_the_mean_settlement_lag() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 5, 10);
        // 3 and 4 days to settle: mean 3.5 rounds to 4.
        backend.push_bill(bill(
            80.0,
            BillStatus::Paid,
            d(2026, 5, 1),
            d(2026, 5, 15),
            Some(d(2026, 5, 4)),
        ));
        backend.push_bill(bill(
            80.0,
            BillStatus::Paid,
            d(2026, 5, 2),
            d(2026, 5, 15),
            Some(d(2026, 5, 6)),
        ));
        // Settled outside the trailing 30 days: ignored.
        backend.push_bill(bill(
            80.0,
            BillStatus::Paid,
            d(2026, 1, 1),
            d(2026, 1, 15),
            Some(d(2026, 1, 30)),
        ));

        let snap = aggregator(backend).aggregate(date).await.unwrap();
        assert_eq!(snap.dso_days, 4);
    }

    #[tokio::test]
    async fn rerun_overwrites_the_same_date() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 5, 10);
        let agg = aggregator(backend.clone());

        agg.aggregate(date).await.unwrap();
        assert_eq!(backend.financial_row(date).unwrap().mrr, 0.0);

        backend.push_bill(bill(
            300.0,
            BillStatus::Paid,
            d(2026, 5, 2),
            d(2026, 5, 9),
            Some(d(2026, 5, 8)),
        ));
        agg.aggregate(date).await.unwrap();

        let rows = backend
            .financial_in(DateRange::day(date))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mrr, 300.0);
    }

    #[tokio::test]
    async fn read_failure_aborts_without_a_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let raw = Arc::new(FaultyRaw::new(MemoryBackend::new()).fail_on("bills_issued_on"));
        let agg = FinancialAggregator::new(raw, backend.clone(), Arc::new(MemoryCache::new()));

        let date = d(2026, 5, 10);
        assert!(agg.aggregate(date).await.is_err());
        assert!(backend.financial_row(date).is_none());
    }
}
