//! Postgres implementations of the storage seams, plus schema setup and
//! seed data for a local environment. The raw tables are owned by
//! upstream services in production; this backend only reads them.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::{uuid, Uuid};

use crate::error::{EngineError, Result};
use crate::models::{
    ActiveEntityCounts, Anomaly, AttendanceSnapshot, BillRecord, BillStatus, ClassRecord,
    DashboardView, FinancialSnapshot, GuardianRecord, OperationalSnapshot, PresenceRecord,
    ProcessedEvent, QualityCheckResult, SessionRecord, SlotRecord, SlotStatus, StudentRecord,
    ACTIVE_ACTIONS,
};
use crate::store::{DateRange, EventLedger, QualityLedger, RawRecords, SnapshotStore};

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        PgBackend { pool }
    }
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|err| EngineError::Backend(err.to_string()))?;
    Ok(())
}

fn bill_status(value: &str) -> BillStatus {
    match value {
        "paid" => BillStatus::Paid,
        "cancelled" => BillStatus::Cancelled,
        // Open covers pending and overdue rows alike; overdue is derived
        // from due_on, never stored.
        _ => BillStatus::Open,
    }
}

fn bill_from_row(row: &PgRow) -> BillRecord {
    let status: String = row.get("status");
    BillRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        amount: row.get("amount"),
        status: bill_status(&status),
        issued_on: row.get("issued_on"),
        due_on: row.get("due_on"),
        paid_on: row.get("paid_on"),
    }
}

fn student_from_row(row: &PgRow) -> StudentRecord {
    StudentRecord {
        id: row.get("id"),
        name: row.get("name"),
        national_id: row.get("national_id"),
        email: row.get("email"),
        phone: row.get("phone"),
        birth_date: row.get("birth_date"),
        guardian_id: row.get("guardian_id"),
        active: row.get("active"),
    }
}

fn class_from_row(row: &PgRow) -> ClassRecord {
    ClassRecord {
        id: row.get("id"),
        name: row.get("name"),
        teacher_id: row.get("teacher_id"),
        active: row.get("active"),
    }
}

fn financial_from_row(row: &PgRow) -> FinancialSnapshot {
    FinancialSnapshot {
        date: row.get("date"),
        mrr: row.get("mrr"),
        delinquency_pct: row.get("delinquency_pct"),
        conversion_pct: row.get("conversion_pct"),
        dso_days: row.get("dso_days"),
        bills_issued: row.get("bills_issued"),
        bills_paid: row.get("bills_paid"),
        bills_overdue: row.get("bills_overdue"),
    }
}

fn attendance_from_row(row: &PgRow) -> AttendanceSnapshot {
    AttendanceSnapshot {
        date: row.get("date"),
        class_id: row.get("class_id"),
        class_name: row.get("class_name"),
        avg_attendance_pct: row.get("avg_attendance_pct"),
        checkin_adherence_pct: row.get("checkin_adherence_pct"),
        total_attendance_records: row.get("total_attendance_records"),
        total_sessions: row.get("total_sessions"),
        low_attendance_students: row.get("low_attendance_students"),
    }
}

fn operational_from_row(row: &PgRow) -> OperationalSnapshot {
    OperationalSnapshot {
        date: row.get("date"),
        dau: row.get("dau"),
        mau: row.get("mau"),
        court_occupancy_pct: row.get("court_occupancy_pct"),
        active_students: row.get("active_students"),
        active_teachers: row.get("active_teachers"),
        active_classes: row.get("active_classes"),
    }
}

fn quality_from_row(row: &PgRow) -> Result<QualityCheckResult> {
    let anomalies: serde_json::Value = row.get("anomalies");
    let anomalies: Vec<Anomaly> = serde_json::from_value(anomalies)
        .map_err(|err| EngineError::Backend(format!("bad anomalies payload: {err}")))?;
    Ok(QualityCheckResult {
        table: row.get("table_name"),
        checked_at: row.get("checked_at"),
        integrity_score: row.get("integrity_score"),
        completeness_score: row.get("completeness_score"),
        consistency_score: row.get("consistency_score"),
        accuracy_score: row.get("accuracy_score"),
        overall_score: row.get("overall_score"),
        total_records: row.get("total_records"),
        anomalies,
        details: row.get("details"),
        error: None,
    })
}

#[async_trait]
impl RawRecords for PgBackend {
    async fn bills_due_on_or_before(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, amount, status, issued_on, due_on, paid_on \
             FROM arena_reports.bills WHERE due_on IS NOT NULL AND due_on <= $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(bill_from_row).collect())
    }

    async fn bills_issued_on(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, amount, status, issued_on, due_on, paid_on \
             FROM arena_reports.bills WHERE issued_on = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(bill_from_row).collect())
    }

    async fn bills_paid_in(&self, window: DateRange) -> Result<Vec<BillRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, amount, status, issued_on, due_on, paid_on \
             FROM arena_reports.bills \
             WHERE status = 'paid' AND paid_on BETWEEN $1 AND $2",
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(bill_from_row).collect())
    }

    async fn active_classes(&self) -> Result<Vec<ClassRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, teacher_id, active FROM arena_reports.classes WHERE active",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(class_from_row).collect())
    }

    async fn enrolled_student_ids(&self, class_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT DISTINCT student_id FROM arena_reports.enrollments \
             WHERE class_id = $1 AND active",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("student_id")).collect())
    }

    async fn sessions_in(&self, class_id: Uuid, window: DateRange) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query(
            "SELECT id, class_id, held_on FROM arena_reports.sessions \
             WHERE class_id = $1 AND held_on BETWEEN $2 AND $3",
        )
        .bind(class_id)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| SessionRecord {
                id: row.get("id"),
                class_id: row.get("class_id"),
                held_on: row.get("held_on"),
            })
            .collect())
    }

    async fn presences_in(
        &self,
        class_id: Uuid,
        window: DateRange,
    ) -> Result<Vec<PresenceRecord>> {
        let rows = sqlx::query(
            "SELECT p.id, p.student_id, p.session_id, p.marked_on \
             FROM arena_reports.presences p \
             JOIN arena_reports.sessions s ON s.id = p.session_id \
             WHERE s.class_id = $1 AND s.held_on BETWEEN $2 AND $3",
        )
        .bind(class_id)
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| PresenceRecord {
                id: row.get("id"),
                student_id: row.get("student_id"),
                session_id: row.get("session_id"),
                marked_on: row.get("marked_on"),
            })
            .collect())
    }

    async fn active_user_ids_in(&self, window: DateRange) -> Result<Vec<Uuid>> {
        let actions: Vec<String> = ACTIVE_ACTIONS.iter().map(|a| a.to_string()).collect();
        let rows = sqlx::query(
            "SELECT DISTINCT user_id FROM arena_reports.activity_log \
             WHERE occurred_on BETWEEN $1 AND $2 AND action = ANY($3)",
        )
        .bind(window.start())
        .bind(window.end())
        .bind(&actions)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    async fn active_entity_counts(&self) -> Result<ActiveEntityCounts> {
        let row = sqlx::query(
            "SELECT \
               (SELECT COUNT(*) FROM arena_reports.students WHERE active) AS students, \
               (SELECT COUNT(*) FROM arena_reports.teachers WHERE active) AS teachers, \
               (SELECT COUNT(*) FROM arena_reports.classes WHERE active) AS classes",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ActiveEntityCounts {
            students: row.get("students"),
            teachers: row.get("teachers"),
            classes: row.get("classes"),
        })
    }

    async fn slots_on(&self, date: NaiveDate) -> Result<Vec<SlotRecord>> {
        let rows = sqlx::query(
            "SELECT id, slot_date, status FROM arena_reports.slots WHERE slot_date = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                SlotRecord {
                    id: row.get("id"),
                    slot_date: row.get("slot_date"),
                    status: if status == "occupied" {
                        SlotStatus::Occupied
                    } else {
                        SlotStatus::Free
                    },
                }
            })
            .collect())
    }

    async fn all_students(&self) -> Result<Vec<StudentRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, national_id, email, phone, birth_date, guardian_id, active \
             FROM arena_reports.students",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(student_from_row).collect())
    }

    async fn all_guardians(&self) -> Result<Vec<GuardianRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, national_id, email, phone FROM arena_reports.guardians",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| GuardianRecord {
                id: row.get("id"),
                name: row.get("name"),
                national_id: row.get("national_id"),
                email: row.get("email"),
                phone: row.get("phone"),
            })
            .collect())
    }

    async fn all_bills(&self) -> Result<Vec<BillRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, amount, status, issued_on, due_on, paid_on \
             FROM arena_reports.bills",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(bill_from_row).collect())
    }

    async fn all_classes(&self) -> Result<Vec<ClassRecord>> {
        let rows =
            sqlx::query("SELECT id, name, teacher_id, active FROM arena_reports.classes")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(class_from_row).collect())
    }

    async fn all_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query("SELECT id, class_id, held_on FROM arena_reports.sessions")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| SessionRecord {
                id: row.get("id"),
                class_id: row.get("class_id"),
                held_on: row.get("held_on"),
            })
            .collect())
    }

    async fn all_presences(&self) -> Result<Vec<PresenceRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, session_id, marked_on FROM arena_reports.presences",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| PresenceRecord {
                id: row.get("id"),
                student_id: row.get("student_id"),
                session_id: row.get("session_id"),
                marked_on: row.get("marked_on"),
            })
            .collect())
    }

    async fn all_teacher_ids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM arena_reports.teachers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

#[async_trait]
impl SnapshotStore for PgBackend {
    async fn upsert_financial(&self, snapshot: &FinancialSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.metrics_financial
            (date, mrr, delinquency_pct, conversion_pct, dso_days,
             bills_issued, bills_paid, bills_overdue)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date) DO UPDATE SET
              mrr = EXCLUDED.mrr,
              delinquency_pct = EXCLUDED.delinquency_pct,
              conversion_pct = EXCLUDED.conversion_pct,
              dso_days = EXCLUDED.dso_days,
              bills_issued = EXCLUDED.bills_issued,
              bills_paid = EXCLUDED.bills_paid,
              bills_overdue = EXCLUDED.bills_overdue,
              updated_at = now()
            "#,
        )
        .bind(snapshot.date)
        .bind(snapshot.mrr)
        .bind(snapshot.delinquency_pct)
        .bind(snapshot.conversion_pct)
        .bind(snapshot.dso_days)
        .bind(snapshot.bills_issued)
        .bind(snapshot.bills_paid)
        .bind(snapshot.bills_overdue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_attendance(&self, snapshot: &AttendanceSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.metrics_attendance
            (date, class_id, class_name, avg_attendance_pct, checkin_adherence_pct,
             total_attendance_records, total_sessions, low_attendance_students)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date, class_id) DO UPDATE SET
              class_name = EXCLUDED.class_name,
              avg_attendance_pct = EXCLUDED.avg_attendance_pct,
              checkin_adherence_pct = EXCLUDED.checkin_adherence_pct,
              total_attendance_records = EXCLUDED.total_attendance_records,
              total_sessions = EXCLUDED.total_sessions,
              low_attendance_students = EXCLUDED.low_attendance_students,
              updated_at = now()
            "#,
        )
        .bind(snapshot.date)
        .bind(snapshot.class_id)
        .bind(&snapshot.class_name)
        .bind(snapshot.avg_attendance_pct)
        .bind(snapshot.checkin_adherence_pct)
        .bind(snapshot.total_attendance_records)
        .bind(snapshot.total_sessions)
        .bind(snapshot.low_attendance_students)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_operational(&self, snapshot: &OperationalSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.metrics_operational
            (date, dau, mau, court_occupancy_pct, active_students,
             active_teachers, active_classes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (date) DO UPDATE SET
              dau = EXCLUDED.dau,
              mau = EXCLUDED.mau,
              court_occupancy_pct = EXCLUDED.court_occupancy_pct,
              active_students = EXCLUDED.active_students,
              active_teachers = EXCLUDED.active_teachers,
              active_classes = EXCLUDED.active_classes,
              updated_at = now()
            "#,
        )
        .bind(snapshot.date)
        .bind(snapshot.dau)
        .bind(snapshot.mau)
        .bind(snapshot.court_occupancy_pct)
        .bind(snapshot.active_students)
        .bind(snapshot.active_teachers)
        .bind(snapshot.active_classes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn financial_in(&self, range: DateRange) -> Result<Vec<FinancialSnapshot>> {
        let rows = sqlx::query(
            "SELECT date, mrr, delinquency_pct, conversion_pct, dso_days, \
                    bills_issued, bills_paid, bills_overdue \
             FROM arena_reports.metrics_financial \
             WHERE date BETWEEN $1 AND $2 ORDER BY date ASC",
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(financial_from_row).collect())
    }

    async fn attendance_since(
        &self,
        since: NaiveDate,
        class_id: Option<Uuid>,
    ) -> Result<Vec<AttendanceSnapshot>> {
        let mut query = String::from(
            "SELECT date, class_id, class_name, avg_attendance_pct, checkin_adherence_pct, \
                    total_attendance_records, total_sessions, low_attendance_students \
             FROM arena_reports.metrics_attendance WHERE date >= $1",
        );
        if class_id.is_some() {
            query.push_str(" AND class_id = $2");
        }
        query.push_str(" ORDER BY date DESC, class_name ASC");

        let mut rows = sqlx::query(&query).bind(since);
        if let Some(id) = class_id {
            rows = rows.bind(id);
        }

        let records = rows.fetch_all(&self.pool).await?;
        Ok(records.iter().map(attendance_from_row).collect())
    }

    async fn operational_since(&self, since: NaiveDate) -> Result<Vec<OperationalSnapshot>> {
        let rows = sqlx::query(
            "SELECT date, dau, mau, court_occupancy_pct, active_students, \
                    active_teachers, active_classes \
             FROM arena_reports.metrics_operational \
             WHERE date >= $1 ORDER BY date DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(operational_from_row).collect())
    }

    async fn latest_financial(&self) -> Result<Option<FinancialSnapshot>> {
        let row = sqlx::query(
            "SELECT date, mrr, delinquency_pct, conversion_pct, dso_days, \
                    bills_issued, bills_paid, bills_overdue \
             FROM arena_reports.metrics_financial ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(financial_from_row))
    }

    async fn latest_attendance(&self) -> Result<Vec<AttendanceSnapshot>> {
        let rows = sqlx::query(
            "SELECT date, class_id, class_name, avg_attendance_pct, checkin_adherence_pct, \
                    total_attendance_records, total_sessions, low_attendance_students \
             FROM arena_reports.metrics_attendance \
             WHERE date = (SELECT MAX(date) FROM arena_reports.metrics_attendance) \
             ORDER BY class_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(attendance_from_row).collect())
    }

    async fn latest_operational(&self) -> Result<Option<OperationalSnapshot>> {
        let row = sqlx::query(
            "SELECT date, dau, mau, court_occupancy_pct, active_students, \
                    active_teachers, active_classes \
             FROM arena_reports.metrics_operational ORDER BY date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(operational_from_row))
    }

    async fn store_dashboard_view(&self, view: &DashboardView) -> Result<()> {
        let body = serde_json::to_value(view)
            .map_err(|err| EngineError::Backend(format!("bad dashboard view: {err}")))?;
        sqlx::query(
            r#"
            INSERT INTO arena_reports.dashboard_view (id, refreshed_at, body)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
              refreshed_at = EXCLUDED.refreshed_at,
              body = EXCLUDED.body
            "#,
        )
        .bind(view.refreshed_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_dashboard_view(&self) -> Result<Option<DashboardView>> {
        let row = sqlx::query("SELECT body FROM arena_reports.dashboard_view WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let body: serde_json::Value = row.get("body");
                let view = serde_json::from_value(body)
                    .map_err(|err| EngineError::Backend(format!("bad dashboard view: {err}")))?;
                Ok(Some(view))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EventLedger for PgBackend {
    async fn contains(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM arena_reports.processed_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn record(&self, event: &ProcessedEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO arena_reports.processed_events
            (event_id, event_type, payload, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM arena_reports.processed_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl QualityLedger for PgBackend {
    async fn append(&self, result: &QualityCheckResult) -> Result<()> {
        let anomalies = serde_json::to_value(&result.anomalies)
            .map_err(|err| EngineError::Backend(format!("bad anomalies payload: {err}")))?;
        sqlx::query(
            r#"
            INSERT INTO arena_reports.data_quality_log
            (table_name, checked_at, integrity_score, completeness_score,
             consistency_score, accuracy_score, overall_score, total_records,
             anomalies, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&result.table)
        .bind(result.checked_at)
        .bind(result.integrity_score)
        .bind(result.completeness_score)
        .bind(result.consistency_score)
        .bind(result.accuracy_score)
        .bind(result.overall_score)
        .bind(result.total_records)
        .bind(anomalies)
        .bind(&result.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_per_table(&self) -> Result<Vec<QualityCheckResult>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (table_name) \
                    table_name, checked_at, integrity_score, completeness_score, \
                    consistency_score, accuracy_score, overall_score, total_records, \
                    anomalies, details \
             FROM arena_reports.data_quality_log \
             ORDER BY table_name, checked_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(quality_from_row).collect()
    }

    async fn history(&self, table: &str, days: i64) -> Result<Vec<QualityCheckResult>> {
        let rows = sqlx::query(
            "SELECT table_name, checked_at, integrity_score, completeness_score, \
                    consistency_score, accuracy_score, overall_score, total_records, \
                    anomalies, details \
             FROM arena_reports.data_quality_log \
             WHERE table_name = $1 AND checked_at >= now() - ($2 * interval '1 day') \
             ORDER BY checked_at DESC",
        )
        .bind(table)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(quality_from_row).collect()
    }
}

/// Load a small, re-runnable set of raw records so every aggregation and
/// quality path has something to chew on locally.
pub async fn seed(pool: &PgPool) -> Result<()> {
    let today = Utc::now().date_naive();

    let guardians = vec![
        (
            uuid!("7b1f9f0a-51c4-4673-9a63-2f1c55b6e6c1"),
            "Marta Ribeiro",
            "39053344705",
            "marta.ribeiro@example.com",
            "11987654321",
        ),
        (
            uuid!("c0a8d2a4-6a11-4c5b-9c3e-47d9f4f0b6a2"),
            "Paulo Siqueira",
            "52998224725",
            "paulo.siqueira@example.com",
            "1133334444",
        ),
    ];
    for (id, name, national_id, email, phone) in &guardians {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.guardians (id, name, national_id, email, phone)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(national_id)
        .bind(email)
        .bind(phone)
        .execute(pool)
        .await?;
    }

    let teachers = vec![
        (
            uuid!("4de1c6a2-9c31-4a8e-a9cf-0d7b35c1f0aa"),
            "Renata Costa",
        ),
        (
            uuid!("88aa0b94-12db-41d4-9df4-6ec2a5b7f3b9"),
            "Diego Fontes",
        ),
    ];
    for (id, name) in &teachers {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.teachers (id, name, active)
            VALUES ($1, $2, true)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    // Third student carries deliberately broken data to exercise the
    // quality checks: dangling guardian, repeated-digit id, bad email.
    let students = vec![
        (
            uuid!("5f2b8c7e-3f14-4f7a-8a3e-bb0e2a4d9c11"),
            "Lia Martins",
            Some("529.982.247-25"),
            Some("lia.martins@example.com"),
            Some(guardians[0].0),
            NaiveDate::from_ymd_opt(2012, 3, 14),
        ),
        (
            uuid!("0d4a2f61-88a9-4c52-a43e-3d8f4b2e7a55"),
            "Tomas Arantes",
            Some("390.533.447-05"),
            Some("tomas.arantes@example.com"),
            Some(guardians[1].0),
            NaiveDate::from_ymd_opt(2010, 11, 2),
        ),
        (
            uuid!("e7c93b10-65af-4f0e-9b57-1a2b3c4d5e6f"),
            "Bento Sales",
            Some("11111111111"),
            Some("bento.sales@"),
            Some(uuid!("99999999-0000-4000-8000-000000000000")),
            NaiveDate::from_ymd_opt(2013, 6, 21),
        ),
    ];
    for (id, name, national_id, email, guardian_id, birth_date) in &students {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.students
            (id, name, national_id, email, phone, birth_date, guardian_id, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(national_id)
        .bind(email)
        .bind("11912345678")
        .bind(birth_date)
        .bind(guardian_id)
        .execute(pool)
        .await?;
    }

    let classes = vec![
        (
            uuid!("31b7a2c4-0f5d-4f6e-8a1b-2c3d4e5f6a70"),
            "Tennis Juniors A",
            teachers[0].0,
        ),
        (
            uuid!("9c8b7a65-4321-4d5e-8f90-a1b2c3d4e5f6"),
            "Beach Volley B",
            teachers[1].0,
        ),
    ];
    for (id, name, teacher_id) in &classes {
        sqlx::query(
            r#"
            INSERT INTO arena_reports.classes (id, name, teacher_id, active)
            VALUES ($1, $2, $3, true)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(teacher_id)
        .execute(pool)
        .await?;
    }

    for (class_id, _, _) in &classes {
        for (student_id, _, _, _, _, _) in &students {
            sqlx::query(
                r#"
                INSERT INTO arena_reports.enrollments (class_id, student_id, active)
                VALUES ($1, $2, true)
                ON CONFLICT (class_id, student_id) DO NOTHING
                "#,
            )
            .bind(class_id)
            .bind(student_id)
            .execute(pool)
            .await?;
        }
    }

    // A session per class today plus a handful across the trailing month.
    let mut session_ids = Vec::new();
    for (index, (class_id, _, _)) in classes.iter().enumerate() {
        for offset in [0i64, 7, 14, 21] {
            let session_id = Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("seed-session-{index}-{offset}").as_bytes(),
            );
            sqlx::query(
                r#"
                INSERT INTO arena_reports.sessions (id, class_id, held_on)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE SET held_on = EXCLUDED.held_on
                "#,
            )
            .bind(session_id)
            .bind(class_id)
            .bind(today - Duration::days(offset))
            .execute(pool)
            .await?;
            if offset == 0 {
                session_ids.push(session_id);
            }
        }
    }

    for (slot, session_id) in session_ids.iter().enumerate() {
        for (student_id, _, _, _, _, _) in students.iter().take(2) {
            let presence_id = Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("seed-presence-{slot}-{student_id}").as_bytes(),
            );
            sqlx::query(
                r#"
                INSERT INTO arena_reports.presences (id, student_id, session_id, marked_on)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(presence_id)
            .bind(student_id)
            .bind(session_id)
            .bind(today)
            .execute(pool)
            .await?;
        }
    }

    let bills = vec![
        ("seed-bill-1", students[0].0, 250.0, "paid", 10i64, Some(6i64)),
        ("seed-bill-2", students[1].0, 250.0, "paid", 3, Some(1)),
        ("seed-bill-3", students[2].0, 250.0, "open", 40, None),
        ("seed-bill-4", students[0].0, 250.0, "open", 0, None),
    ];
    for (key, student_id, amount, status, issued_days_ago, paid_days_ago) in &bills {
        let bill_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        let issued_on = today - Duration::days(*issued_days_ago);
        sqlx::query(
            r#"
            INSERT INTO arena_reports.bills
            (id, student_id, amount, status, issued_on, due_on, paid_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(bill_id)
        .bind(student_id)
        .bind(amount)
        .bind(status)
        .bind(issued_on)
        .bind(issued_on + Duration::days(15))
        .bind(paid_days_ago.map(|days| today - Duration::days(days)))
        .execute(pool)
        .await?;
    }

    for hour in 0..6i64 {
        let slot_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("seed-slot-{hour}").as_bytes(),
        );
        let status = if hour < 4 { "occupied" } else { "free" };
        sqlx::query(
            r#"
            INSERT INTO arena_reports.slots (id, slot_date, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(slot_id)
        .bind(today)
        .bind(status)
        .execute(pool)
        .await?;
    }

    for (user, day_offset) in [(0u32, 0i64), (1, 0), (2, 0), (3, 9)] {
        let entry_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("seed-activity-{user}-{day_offset}").as_bytes(),
        );
        let user_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("seed-user-{user}").as_bytes(),
        );
        sqlx::query(
            r#"
            INSERT INTO arena_reports.activity_log (id, user_id, action, occurred_on)
            VALUES ($1, $2, 'login', $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry_id)
        .bind(user_id)
        .bind(today - Duration::days(day_offset))
        .execute(pool)
        .await?;
    }

    Ok(())
}
