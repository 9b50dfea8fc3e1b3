//! Injected storage seams. Components take these as trait objects at
//! construction so tests can substitute the in-memory backend.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    ActiveEntityCounts, AttendanceSnapshot, BillRecord, ClassRecord, DashboardView,
    FinancialSnapshot, GuardianRecord, OperationalSnapshot, PresenceRecord, ProcessedEvent,
    QualityCheckResult, SessionRecord, SlotRecord, StudentRecord,
};

/// Inclusive calendar date range. Built through `new` so a reversed range
/// is rejected before it reaches a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(EngineError::validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        DateRange {
            start: date,
            end: date,
        }
    }

    /// Trailing window of `days` ending at `end`, inclusive.
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        DateRange {
            start: end - Duration::days(days.max(0)),
            end,
        }
    }

    /// The whole calendar month containing `date`.
    pub fn calendar_month(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let next_month = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        };
        let end = next_month
            .map(|first| first - Duration::days(1))
            .unwrap_or(date);
        DateRange { start, end }
    }

    /// From the first day of `date`'s month through `date`.
    pub fn month_to_date(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        DateRange { start, end: date }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Read-only access to the raw operational tables owned by upstream
/// services. Queries are the fixed shapes the aggregators and quality
/// audits need, always parameterized by typed dates.
#[async_trait]
pub trait RawRecords: Send + Sync {
    // Billing windows.
    async fn bills_due_on_or_before(&self, date: NaiveDate) -> Result<Vec<BillRecord>>;
    async fn bills_issued_on(&self, date: NaiveDate) -> Result<Vec<BillRecord>>;
    async fn bills_paid_in(&self, window: DateRange) -> Result<Vec<BillRecord>>;

    // Class attendance.
    async fn active_classes(&self) -> Result<Vec<ClassRecord>>;
    async fn enrolled_student_ids(&self, class_id: Uuid) -> Result<Vec<Uuid>>;
    async fn sessions_in(&self, class_id: Uuid, window: DateRange) -> Result<Vec<SessionRecord>>;
    async fn presences_in(&self, class_id: Uuid, window: DateRange)
        -> Result<Vec<PresenceRecord>>;

    // Activity and scheduling.
    async fn active_user_ids_in(&self, window: DateRange) -> Result<Vec<Uuid>>;
    async fn active_entity_counts(&self) -> Result<ActiveEntityCounts>;
    async fn slots_on(&self, date: NaiveDate) -> Result<Vec<SlotRecord>>;

    // Whole-table reads for quality audits.
    async fn all_students(&self) -> Result<Vec<StudentRecord>>;
    async fn all_guardians(&self) -> Result<Vec<GuardianRecord>>;
    async fn all_bills(&self) -> Result<Vec<BillRecord>>;
    async fn all_classes(&self) -> Result<Vec<ClassRecord>>;
    async fn all_sessions(&self) -> Result<Vec<SessionRecord>>;
    async fn all_presences(&self) -> Result<Vec<PresenceRecord>>;
    async fn all_teacher_ids(&self) -> Result<Vec<Uuid>>;
}

/// Durable snapshot rows with upsert-by-natural-key semantics. Each upsert
/// is atomic per key; recomputation overwrites, never appends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert_financial(&self, snapshot: &FinancialSnapshot) -> Result<()>;
    async fn upsert_attendance(&self, snapshot: &AttendanceSnapshot) -> Result<()>;
    async fn upsert_operational(&self, snapshot: &OperationalSnapshot) -> Result<()>;

    async fn financial_in(&self, range: DateRange) -> Result<Vec<FinancialSnapshot>>;
    async fn attendance_since(
        &self,
        since: NaiveDate,
        class_id: Option<Uuid>,
    ) -> Result<Vec<AttendanceSnapshot>>;
    async fn operational_since(&self, since: NaiveDate) -> Result<Vec<OperationalSnapshot>>;

    async fn latest_financial(&self) -> Result<Option<FinancialSnapshot>>;
    /// All rows for the most recent attendance snapshot date.
    async fn latest_attendance(&self) -> Result<Vec<AttendanceSnapshot>>;
    async fn latest_operational(&self) -> Result<Option<OperationalSnapshot>>;

    async fn store_dashboard_view(&self, view: &DashboardView) -> Result<()>;
    async fn latest_dashboard_view(&self) -> Result<Option<DashboardView>>;
}

/// Processed-event ledger backing the dispatcher's dedup gate.
#[async_trait]
pub trait EventLedger: Send + Sync {
    async fn contains(&self, event_id: &str) -> Result<bool>;

    /// Insert-once. Returns `false` when the unique key on `event_id`
    /// already holds a row (a concurrent delivery won the race); that is
    /// the authoritative duplicate signal, not an error.
    async fn record(&self, event: &ProcessedEvent) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

/// Append-only log of quality-check runs. Never updated in place.
#[async_trait]
pub trait QualityLedger: Send + Sync {
    async fn append(&self, result: &QualityCheckResult) -> Result<()>;
    /// Most recent entry per table, ordered by table name.
    async fn latest_per_table(&self) -> Result<Vec<QualityCheckResult>>;
    /// Entries for one table within the trailing `days`, newest first.
    async fn history(&self, table: &str, days: i64) -> Result<Vec<QualityCheckResult>>;
}

/// External key/value cache. Never authoritative: a miss or an error on
/// the read path falls back to the snapshot store.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_expiry(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = DateRange::new(d(2026, 3, 2), d(2026, 3, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn month_to_date_starts_on_the_first() {
        let range = DateRange::month_to_date(d(2026, 2, 17));
        assert_eq!(range.start(), d(2026, 2, 1));
        assert_eq!(range.end(), d(2026, 2, 17));
    }

    #[test]
    fn calendar_month_covers_december() {
        let range = DateRange::calendar_month(d(2025, 12, 15));
        assert_eq!(range.start(), d(2025, 12, 1));
        assert_eq!(range.end(), d(2025, 12, 31));
    }

    #[test]
    fn trailing_window_is_inclusive() {
        let range = DateRange::trailing(d(2026, 3, 31), 30);
        assert_eq!(range.start(), d(2026, 3, 1));
        assert!(range.contains(d(2026, 3, 1)));
        assert!(range.contains(d(2026, 3, 31)));
        assert!(!range.contains(d(2026, 2, 28)));
    }
}
