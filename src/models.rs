use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Derived snapshots (one row per key, upsert-on-conflict)
// ---------------------------------------------------------------------------

/// Daily financial metrics, keyed by `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub date: NaiveDate,
    pub mrr: f64,
    pub delinquency_pct: f64,
    pub conversion_pct: f64,
    pub dso_days: i64,
    pub bills_issued: i64,
    pub bills_paid: i64,
    pub bills_overdue: i64,
}

/// Daily per-class attendance metrics, keyed by `(date, class_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSnapshot {
    pub date: NaiveDate,
    pub class_id: Uuid,
    pub class_name: String,
    pub avg_attendance_pct: f64,
    pub checkin_adherence_pct: f64,
    pub total_attendance_records: i64,
    pub total_sessions: i64,
    pub low_attendance_students: i64,
}

/// Daily operational metrics, keyed by `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalSnapshot {
    pub date: NaiveDate,
    pub dau: i64,
    pub mau: i64,
    pub court_occupancy_pct: f64,
    pub active_students: i64,
    pub active_teachers: i64,
    pub active_classes: i64,
}

/// Denormalized latest-state view refreshed after aggregation runs.
/// Single row, overwritten on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardView {
    pub refreshed_at: DateTime<Utc>,
    pub financial: Option<FinancialSnapshot>,
    pub attendance: Vec<AttendanceSnapshot>,
    pub operational: Option<OperationalSnapshot>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Domain event delivered by the upstream broker. Redeliveries carry the
/// same `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Accepted event, recorded once. The unique key on `event_id` is the
/// dedup gate for the dispatcher.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of `EventDispatcher::process`. A rejected duplicate is a
/// reported no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub accepted: bool,
    pub reason: Option<&'static str>,
}

impl DispatchOutcome {
    pub fn accepted() -> Self {
        DispatchOutcome {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: &'static str) -> Self {
        DispatchOutcome {
            accepted: false,
            reason: Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Data quality
// ---------------------------------------------------------------------------

/// One finding from a quality check, e.g. "3 bills reference a missing
/// student".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub count: i64,
}

impl Anomaly {
    pub fn rule(kind: impl Into<String>, count: i64) -> Self {
        Anomaly {
            kind: kind.into(),
            field: None,
            count,
        }
    }

    pub fn field(kind: impl Into<String>, field: impl Into<String>, count: i64) -> Self {
        Anomaly {
            kind: kind.into(),
            field: Some(field.into()),
            count,
        }
    }
}

/// One append-only quality ledger entry per (table, run). A failed check
/// keeps its slot in the batch with `error` set and scores zeroed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheckResult {
    pub table: String,
    pub checked_at: DateTime<Utc>,
    pub integrity_score: f64,
    pub completeness_score: f64,
    pub consistency_score: f64,
    pub accuracy_score: f64,
    pub overall_score: f64,
    pub total_records: i64,
    pub anomalies: Vec<Anomaly>,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw domain records (read-only; owned by upstream collaborators)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Open,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BillRecord {
    pub id: Uuid,
    pub student_id: Option<Uuid>,
    pub amount: f64,
    pub status: BillStatus,
    pub issued_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
    pub paid_on: Option<NaiveDate>,
}

impl BillRecord {
    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }

    /// Overdue and unpaid as of the given date.
    pub fn is_delinquent(&self, as_of: NaiveDate) -> bool {
        match self.due_on {
            Some(due) => due < as_of && !self.is_paid(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: Uuid,
    pub name: String,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub guardian_id: Option<Uuid>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct GuardianRecord {
    pub id: Uuid,
    pub name: String,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub id: Uuid,
    pub name: String,
    pub teacher_id: Option<Uuid>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub class_id: Uuid,
    pub held_on: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub session_id: Uuid,
    pub marked_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Occupied,
    Free,
}

/// One court booking slot on the scheduling grid.
#[derive(Debug, Clone)]
pub struct SlotRecord {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub status: SlotStatus,
}

/// Activity-log actions that count a user as active for DAU/MAU.
pub const ACTIVE_ACTIONS: &[&str] = &["login", "api_call", "page_view"];

/// Current totals of entities flagged active, not date-scoped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveEntityCounts {
    pub students: i64,
    pub teachers: i64,
    pub classes: i64,
}

/// Round to two decimal places, matching how snapshot percentages are
/// persisted.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of `part` over `whole`, 0 when the denominator is 0.
pub fn pct(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn pct_handles_zero_denominator() {
        assert_eq!(pct(3, 0), 0.0);
        assert_eq!(pct(3, 10), 30.0);
        assert_eq!(pct(1, 3), 33.33);
    }

    #[test]
    fn delinquency_requires_past_due_and_unpaid() {
        let bill = BillRecord {
            id: Uuid::new_v4(),
            student_id: None,
            amount: 120.0,
            status: BillStatus::Open,
            issued_on: d(2026, 1, 2),
            due_on: Some(d(2026, 1, 10)),
            paid_on: None,
        };
        assert!(bill.is_delinquent(d(2026, 1, 11)));
        assert!(!bill.is_delinquent(d(2026, 1, 10)));

        let paid = BillRecord {
            status: BillStatus::Paid,
            paid_on: Some(d(2026, 1, 12)),
            ..bill
        };
        assert!(!paid.is_delinquent(d(2026, 1, 20)));
    }
}
