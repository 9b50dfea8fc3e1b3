//! Data quality scoring: four independent check families (integrity,
//! completeness, consistency, accuracy) per raw table, combined into a
//! composite score and appended to the quality ledger.
//!
//! Tables are audited through a registered list of `TableAudit`
//! strategies rather than a hardcoded branch per table, so new tables
//! plug in without touching the scorer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{round2, Anomaly, QualityCheckResult};
use crate::store::{QualityLedger, RawRecords};

/// Raw findings of one table audit, before scoring. Zero-count findings
/// are not recorded; the per-dimension denominators live in
/// `total_records` and `required_fields`.
#[derive(Debug, Default)]
pub struct TableFindings {
    pub total_records: i64,
    pub required_fields: i64,
    pub integrity: Vec<Anomaly>,
    pub missing: Vec<Anomaly>,
    pub consistency: Vec<Anomaly>,
    pub accuracy: Vec<Anomaly>,
}

impl TableFindings {
    pub fn new(total_records: i64, required_fields: i64) -> Self {
        TableFindings {
            total_records,
            required_fields,
            ..Default::default()
        }
    }

    pub fn integrity_rule(&mut self, kind: &str, count: i64) {
        if count > 0 {
            self.integrity.push(Anomaly::rule(kind, count));
        }
    }

    pub fn missing_field(&mut self, field: &str, count: i64) {
        if count > 0 {
            self.missing.push(Anomaly::field("completeness", field, count));
        }
    }

    pub fn consistency_rule(&mut self, kind: &str, count: i64) {
        if count > 0 {
            self.consistency.push(Anomaly::rule(kind, count));
        }
    }

    pub fn invalid_field(&mut self, field: &str, count: i64) {
        if count > 0 {
            self.accuracy.push(Anomaly::field("invalid_format", field, count));
        }
    }
}

/// One table's audit strategy: fetches the rows it needs through
/// `RawRecords` and reports findings for all four dimensions.
#[async_trait]
pub trait TableAudit: Send + Sync {
    fn table(&self) -> &'static str;
    async fn collect(&self, raw: &dyn RawRecords, as_of: NaiveDate) -> Result<TableFindings>;
}

/// Score and findings for a single dimension of a single table.
#[derive(Debug, Clone)]
pub struct DimensionReport {
    pub score: f64,
    pub anomalies: Vec<Anomaly>,
    pub total_records: i64,
}

// Violation-ratio score, floored at 0. No applicable records means no
// evidence of defect, which scores 100.
fn ratio_score(violations: i64, total: i64) -> f64 {
    if total <= 0 {
        100.0
    } else {
        round2((100.0 - violations as f64 / total as f64 * 100.0).max(0.0))
    }
}

fn completeness_score(missing: i64, slots: i64) -> f64 {
    if slots <= 0 {
        100.0
    } else {
        round2((slots - missing) as f64 / slots as f64 * 100.0)
    }
}

fn sum_counts(anomalies: &[Anomaly]) -> i64 {
    anomalies.iter().map(|a| a.count).sum()
}

// ---------------------------------------------------------------------------
// Field format validators
// ---------------------------------------------------------------------------

fn digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// National id: 11 digits after stripping separators, and not a single
/// repeated digit.
pub fn valid_national_id(value: &str) -> bool {
    let digits = digits(value);
    if digits.len() != 11 {
        return false;
    }
    let first = digits.as_bytes()[0];
    !digits.bytes().all(|b| b == first)
}

pub fn valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((_, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Phone: 10 or 11 digits (landline or mobile with area code).
pub fn valid_phone(value: &str) -> bool {
    matches!(digits(value).len(), 10 | 11)
}

fn count_invalid<T>(rows: &[T], value: impl Fn(&T) -> Option<&str>, valid: impl Fn(&str) -> bool) -> i64 {
    rows.iter()
        .filter_map(|row| value(row))
        .filter(|v| !valid(v))
        .count() as i64
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Default audits, one per raw table
// ---------------------------------------------------------------------------

struct StudentsAudit;

#[async_trait]
impl TableAudit for StudentsAudit {
    fn table(&self) -> &'static str {
        "students"
    }

    async fn collect(&self, raw: &dyn RawRecords, as_of: NaiveDate) -> Result<TableFindings> {
        let students = raw.all_students().await?;
        let guardians: HashSet<Uuid> = raw.all_guardians().await?.iter().map(|g| g.id).collect();

        let mut findings = TableFindings::new(students.len() as i64, 4);

        let orphaned = students
            .iter()
            .filter(|s| matches!(s.guardian_id, Some(id) if !guardians.contains(&id)))
            .count() as i64;
        findings.integrity_rule("student_missing_guardian", orphaned);

        findings.missing_field(
            "name",
            students.iter().filter(|s| s.name.trim().is_empty()).count() as i64,
        );
        findings.missing_field(
            "national_id",
            students.iter().filter(|s| blank(&s.national_id)).count() as i64,
        );
        findings.missing_field(
            "birth_date",
            students.iter().filter(|s| s.birth_date.is_none()).count() as i64,
        );
        findings.missing_field(
            "guardian_id",
            students.iter().filter(|s| s.guardian_id.is_none()).count() as i64,
        );

        findings.consistency_rule(
            "birth_date_in_future",
            students
                .iter()
                .filter(|s| matches!(s.birth_date, Some(b) if b > as_of))
                .count() as i64,
        );
        let oldest = as_of.checked_sub_months(Months::new(1200)).unwrap_or(as_of);
        let youngest = as_of.checked_sub_months(Months::new(48)).unwrap_or(as_of);
        findings.consistency_rule(
            "age_out_of_range",
            students
                .iter()
                .filter(|s| matches!(s.birth_date, Some(b) if b < oldest || b > youngest))
                .count() as i64,
        );

        findings.invalid_field(
            "national_id",
            count_invalid(&students, |s| s.national_id.as_deref(), valid_national_id),
        );
        findings.invalid_field(
            "email",
            count_invalid(&students, |s| s.email.as_deref(), valid_email),
        );
        findings.invalid_field(
            "phone",
            count_invalid(&students, |s| s.phone.as_deref(), valid_phone),
        );

        Ok(findings)
    }
}

struct GuardiansAudit;

#[async_trait]
impl TableAudit for GuardiansAudit {
    fn table(&self) -> &'static str {
        "guardians"
    }

    async fn collect(&self, raw: &dyn RawRecords, _as_of: NaiveDate) -> Result<TableFindings> {
        let guardians = raw.all_guardians().await?;
        let mut findings = TableFindings::new(guardians.len() as i64, 3);

        findings.missing_field(
            "name",
            guardians.iter().filter(|g| g.name.trim().is_empty()).count() as i64,
        );
        findings.missing_field(
            "national_id",
            guardians.iter().filter(|g| blank(&g.national_id)).count() as i64,
        );
        findings.missing_field(
            "email",
            guardians.iter().filter(|g| blank(&g.email)).count() as i64,
        );

        findings.invalid_field(
            "national_id",
            count_invalid(&guardians, |g| g.national_id.as_deref(), valid_national_id),
        );
        findings.invalid_field(
            "email",
            count_invalid(&guardians, |g| g.email.as_deref(), valid_email),
        );
        findings.invalid_field(
            "phone",
            count_invalid(&guardians, |g| g.phone.as_deref(), valid_phone),
        );

        Ok(findings)
    }
}

struct BillingAudit;

#[async_trait]
impl TableAudit for BillingAudit {
    fn table(&self) -> &'static str {
        "billing"
    }

    async fn collect(&self, raw: &dyn RawRecords, as_of: NaiveDate) -> Result<TableFindings> {
        let bills = raw.all_bills().await?;
        let students: HashSet<Uuid> = raw.all_students().await?.iter().map(|s| s.id).collect();

        let mut findings = TableFindings::new(bills.len() as i64, 3);

        let orphaned = bills
            .iter()
            .filter(|b| matches!(b.student_id, Some(id) if !students.contains(&id)))
            .count() as i64;
        findings.integrity_rule("bill_missing_student", orphaned);

        findings.missing_field(
            "amount",
            bills.iter().filter(|b| b.amount <= 0.0).count() as i64,
        );
        findings.missing_field(
            "due_on",
            bills.iter().filter(|b| b.due_on.is_none()).count() as i64,
        );
        findings.missing_field(
            "student_id",
            bills.iter().filter(|b| b.student_id.is_none()).count() as i64,
        );

        let stale_cutoff = as_of.checked_sub_months(Months::new(24)).unwrap_or(as_of);
        findings.consistency_rule(
            "due_date_stale",
            bills
                .iter()
                .filter(|b| matches!(b.due_on, Some(due) if due < stale_cutoff))
                .count() as i64,
        );
        findings.consistency_rule(
            "amount_not_positive",
            bills.iter().filter(|b| b.amount <= 0.0).count() as i64,
        );

        Ok(findings)
    }
}

struct AttendanceAudit;

#[async_trait]
impl TableAudit for AttendanceAudit {
    fn table(&self) -> &'static str {
        "attendance"
    }

    async fn collect(&self, raw: &dyn RawRecords, _as_of: NaiveDate) -> Result<TableFindings> {
        let presences = raw.all_presences().await?;
        let sessions: HashSet<Uuid> = raw.all_sessions().await?.iter().map(|s| s.id).collect();

        let mut findings = TableFindings::new(presences.len() as i64, 0);

        let dangling = presences
            .iter()
            .filter(|p| !sessions.contains(&p.session_id))
            .count() as i64;
        findings.integrity_rule("presence_missing_session", dangling);

        let mut pairs: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        for presence in &presences {
            *pairs.entry((presence.student_id, presence.session_id)).or_default() += 1;
        }
        let duplicated_pairs = pairs.values().filter(|n| **n > 1).count() as i64;
        findings.consistency_rule("duplicate_presence", duplicated_pairs);

        Ok(findings)
    }
}

struct ClassesAudit;

#[async_trait]
impl TableAudit for ClassesAudit {
    fn table(&self) -> &'static str {
        "classes"
    }

    async fn collect(&self, raw: &dyn RawRecords, _as_of: NaiveDate) -> Result<TableFindings> {
        let classes = raw.all_classes().await?;
        let teachers: HashSet<Uuid> = raw.all_teacher_ids().await?.into_iter().collect();

        let mut findings = TableFindings::new(classes.len() as i64, 0);
        let orphaned = classes
            .iter()
            .filter(|c| matches!(c.teacher_id, Some(id) if !teachers.contains(&id)))
            .count() as i64;
        findings.integrity_rule("class_missing_teacher", orphaned);

        Ok(findings)
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct QualityScorer {
    raw: Arc<dyn RawRecords>,
    ledger: Arc<dyn QualityLedger>,
    audits: Vec<Box<dyn TableAudit>>,
}

impl QualityScorer {
    /// Scorer with the default audit registry.
    pub fn new(raw: Arc<dyn RawRecords>, ledger: Arc<dyn QualityLedger>) -> Self {
        let mut scorer = QualityScorer {
            raw,
            ledger,
            audits: Vec::new(),
        };
        scorer.register(Box::new(StudentsAudit));
        scorer.register(Box::new(GuardiansAudit));
        scorer.register(Box::new(BillingAudit));
        scorer.register(Box::new(AttendanceAudit));
        scorer.register(Box::new(ClassesAudit));
        scorer
    }

    pub fn register(&mut self, audit: Box<dyn TableAudit>) {
        self.audits.push(audit);
    }

    pub fn tables(&self) -> Vec<&'static str> {
        self.audits.iter().map(|a| a.table()).collect()
    }

    fn audit_for(&self, table: &str) -> Result<&dyn TableAudit> {
        self.audits
            .iter()
            .map(|a| a.as_ref())
            .find(|a| a.table() == table)
            .ok_or_else(|| EngineError::validation(format!("unknown table: {table}")))
    }

    async fn findings(&self, table: &str, as_of: NaiveDate) -> Result<TableFindings> {
        self.audit_for(table)?.collect(self.raw.as_ref(), as_of).await
    }

    pub async fn check_integrity(&self, table: &str) -> Result<DimensionReport> {
        let f = self.findings(table, Utc::now().date_naive()).await?;
        Ok(DimensionReport {
            score: ratio_score(sum_counts(&f.integrity), f.total_records),
            anomalies: f.integrity,
            total_records: f.total_records,
        })
    }

    pub async fn check_completeness(&self, table: &str) -> Result<DimensionReport> {
        let f = self.findings(table, Utc::now().date_naive()).await?;
        let slots = f.required_fields * f.total_records;
        Ok(DimensionReport {
            score: completeness_score(sum_counts(&f.missing), slots),
            anomalies: f.missing,
            total_records: f.total_records,
        })
    }

    pub async fn check_consistency(&self, table: &str) -> Result<DimensionReport> {
        let f = self.findings(table, Utc::now().date_naive()).await?;
        Ok(DimensionReport {
            score: ratio_score(sum_counts(&f.consistency), f.total_records),
            anomalies: f.consistency,
            total_records: f.total_records,
        })
    }

    pub async fn check_accuracy(&self, table: &str) -> Result<DimensionReport> {
        let f = self.findings(table, Utc::now().date_naive()).await?;
        Ok(DimensionReport {
            score: ratio_score(sum_counts(&f.accuracy), f.total_records),
            anomalies: f.accuracy,
            total_records: f.total_records,
        })
    }

    /// All four dimensions of one table, scored but not appended to the
    /// ledger.
    pub async fn check_table(&self, table: &str, as_of: NaiveDate) -> Result<QualityCheckResult> {
        let findings = self.findings(table, as_of).await?;
        Ok(assemble(table, findings))
    }

    /// Audit every registered table and append one ledger entry per
    /// table. This is a point-in-time audit, never idempotent: each call
    /// appends a fresh batch. A failing table is caught, returned as an
    /// entry carrying its error, and does not abort the other tables.
    pub async fn run_full_check(&self) -> Result<Vec<QualityCheckResult>> {
        let as_of = Utc::now().date_naive();
        let mut results = Vec::with_capacity(self.audits.len());

        for audit in &self.audits {
            let table = audit.table();
            let outcome = match audit.collect(self.raw.as_ref(), as_of).await {
                Ok(findings) => {
                    let result = assemble(table, findings);
                    match self.ledger.append(&result).await {
                        Ok(()) => {
                            info!(table, overall = result.overall_score, "quality check recorded");
                            result
                        }
                        Err(err) => {
                            warn!(table, %err, "quality ledger append failed");
                            error_entry(table, err.to_string())
                        }
                    }
                }
                Err(err) => {
                    warn!(table, %err, "quality check failed");
                    error_entry(table, err.to_string())
                }
            };
            results.push(outcome);
        }

        Ok(results)
    }
}

fn assemble(table: &str, findings: TableFindings) -> QualityCheckResult {
    let total = findings.total_records;
    let slots = findings.required_fields * total;

    let integrity_score = ratio_score(sum_counts(&findings.integrity), total);
    let completeness = completeness_score(sum_counts(&findings.missing), slots);
    let consistency = ratio_score(sum_counts(&findings.consistency), total);
    let accuracy = ratio_score(sum_counts(&findings.accuracy), total);
    let overall =
        round2((integrity_score + completeness + consistency + accuracy) / 4.0);

    let details = serde_json::json!({
        "integrity_violations": sum_counts(&findings.integrity),
        "missing_required_values": sum_counts(&findings.missing),
        "required_field_slots": slots,
        "consistency_violations": sum_counts(&findings.consistency),
        "invalid_values": sum_counts(&findings.accuracy),
    });

    let mut anomalies = findings.integrity;
    anomalies.extend(findings.missing);
    anomalies.extend(findings.consistency);
    anomalies.extend(findings.accuracy);

    QualityCheckResult {
        table: table.to_string(),
        checked_at: Utc::now(),
        integrity_score,
        completeness_score: completeness,
        consistency_score: consistency,
        accuracy_score: accuracy,
        overall_score: overall,
        total_records: total,
        anomalies,
        details,
        error: None,
    }
}

fn error_entry(table: &str, message: String) -> QualityCheckResult {
    QualityCheckResult {
        table: table.to_string(),
        checked_at: Utc::now(),
        integrity_score: 0.0,
        completeness_score: 0.0,
        consistency_score: 0.0,
        accuracy_score: 0.0,
        overall_score: 0.0,
        total_records: 0,
        anomalies: Vec::new(),
        details: serde_json::Value::Null,
        error: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FaultyRaw, MemoryBackend};
    use crate::models::{
        BillRecord, BillStatus, ClassRecord, GuardianRecord, PresenceRecord, SessionRecord,
        StudentRecord,
    };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn student(guardian_id: Option<Uuid>) -> StudentRecord {
        StudentRecord {
            id: Uuid::new_v4(),
            name: "Lia Martins".to_string(),
            national_id: Some("529.982.247-25".to_string()),
            email: Some("lia@example.com".to_string()),
            phone: Some("11 98765-4321".to_string()),
            birth_date: Some(d(2012, 3, 14)),
            guardian_id,
            active: true,
        }
    }

    fn guardian() -> GuardianRecord {
        GuardianRecord {
            id: Uuid::new_v4(),
            name: "Marta Martins".to_string(),
            national_id: Some("39053344705".to_string()),
            email: Some("marta@example.com".to_string()),
            phone: Some("1133334444".to_string()),
        }
    }

    fn scorer(backend: Arc<MemoryBackend>) -> QualityScorer {
        QualityScorer::new(backend.clone(), backend)
    }

    #[test]
    fn national_id_needs_eleven_varied_digits() {
        assert!(valid_national_id("529.982.247-25"));
        assert!(valid_national_id("39053344705"));
        assert!(!valid_national_id("123"));
        assert!(!valid_national_id("11111111111"));
        assert!(!valid_national_id("529.982.247-256"));
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(valid_email("a.b@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@example.com"));
        assert!(!valid_email("a@example.c0m"));
    }

    #[test]
    fn phone_needs_ten_or_eleven_digits() {
        assert!(valid_phone("11 98765-4321"));
        assert!(valid_phone("1133334444"));
        assert!(!valid_phone("12345"));
        assert!(!valid_phone("123456789012"));
    }

    #[tokio::test]
    async fn empty_table_scores_one_hundred_everywhere() {
        let backend = Arc::new(MemoryBackend::new());
        let result = scorer(backend)
            .check_table("students", d(2026, 8, 1))
            .await
            .unwrap();

        assert_eq!(result.integrity_score, 100.0);
        assert_eq!(result.completeness_score, 100.0);
        assert_eq!(result.consistency_score, 100.0);
        assert_eq!(result.accuracy_score, 100.0);
        assert_eq!(result.overall_score, 100.0);
        assert_eq!(result.total_records, 0);
        assert!(result.anomalies.is_empty());
    }

    #[tokio::test]
    async fn orphaned_guardian_reference_lowers_integrity() {
        let backend = Arc::new(MemoryBackend::new());
        let known = guardian();
        let known_id = known.id;
        backend.push_guardian(known);

        for _ in 0..3 {
            backend.push_student(student(Some(known_id)));
        }
        backend.push_student(student(Some(Uuid::new_v4()))); // dangling ref

        let report = scorer(backend).check_integrity("students").await.unwrap();
        assert_eq!(report.score, 75.0);
        assert_eq!(
            report.anomalies,
            vec![Anomaly::rule("student_missing_guardian", 1)]
        );
    }

    #[tokio::test]
    async fn completeness_counts_missing_required_slots() {
        let backend = Arc::new(MemoryBackend::new());
        let g = guardian();
        let gid = g.id;
        backend.push_guardian(g);

        backend.push_student(student(Some(gid)));
        backend.push_student(StudentRecord {
            national_id: None,
            birth_date: None,
            ..student(Some(gid))
        });

        // 2 students x 4 required fields = 8 slots, 2 missing.
        let report = scorer(backend)
            .check_completeness("students")
            .await
            .unwrap();
        assert_eq!(report.score, 75.0);
    }

    #[tokio::test]
    async fn consistency_flags_future_birth_dates_and_duplicate_presences() {
        let backend = Arc::new(MemoryBackend::new());
        let g = guardian();
        let gid = g.id;
        backend.push_guardian(g);
        backend.push_student(student(Some(gid)));
        backend.push_student(StudentRecord {
            birth_date: Some(Utc::now().date_naive() + chrono::Duration::days(30)),
            ..student(Some(gid))
        });

        let report = scorer(backend.clone())
            .check_consistency("students")
            .await
            .unwrap();
        // The future birth date also falls outside the age bounds, so it
        // trips both rules: 2 violations over 2 rows floors at 0.
        assert_eq!(report.score, 0.0);
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.kind == "birth_date_in_future" && a.count == 1));

        let session = SessionRecord {
            id: Uuid::new_v4(),
            class_id: Uuid::new_v4(),
            held_on: d(2026, 8, 1),
        };
        let student_id = Uuid::new_v4();
        backend.push_session(session.clone());
        for _ in 0..2 {
            backend.push_presence(PresenceRecord {
                id: Uuid::new_v4(),
                student_id,
                session_id: session.id,
                marked_on: d(2026, 8, 1),
            });
        }

        let report = scorer(backend)
            .check_consistency("attendance")
            .await
            .unwrap();
        assert_eq!(
            report.anomalies,
            vec![Anomaly::rule("duplicate_presence", 1)]
        );
        assert_eq!(report.score, 50.0);
    }

    #[tokio::test]
    async fn accuracy_validates_field_formats() {
        let backend = Arc::new(MemoryBackend::new());
        let g = guardian();
        let gid = g.id;
        backend.push_guardian(g);

        backend.push_student(student(Some(gid)));
        backend.push_student(StudentRecord {
            national_id: Some("11111111111".to_string()),
            email: Some("broken@".to_string()),
            ..student(Some(gid))
        });

        let report = scorer(backend).check_accuracy("students").await.unwrap();
        // 2 invalid values over 2 rows.
        assert_eq!(report.score, 0.0);
        assert_eq!(report.anomalies.len(), 2);
        assert_eq!(report.anomalies[0].field.as_deref(), Some("national_id"));
        assert_eq!(report.anomalies[1].field.as_deref(), Some("email"));
    }

    #[tokio::test]
    async fn billing_orphans_and_negative_amounts() {
        let backend = Arc::new(MemoryBackend::new());
        let g = guardian();
        let gid = g.id;
        backend.push_guardian(g);
        let s = student(Some(gid));
        let student_id = s.id;
        backend.push_student(s);

        backend.push_bill(BillRecord {
            id: Uuid::new_v4(),
            student_id: Some(student_id),
            amount: 120.0,
            status: BillStatus::Open,
            issued_on: d(2026, 7, 1),
            due_on: Some(d(2026, 7, 10)),
            paid_on: None,
        });
        backend.push_bill(BillRecord {
            id: Uuid::new_v4(),
            student_id: Some(Uuid::new_v4()), // no such student
            amount: -5.0,
            status: BillStatus::Open,
            issued_on: d(2026, 7, 1),
            due_on: Some(d(2026, 7, 10)),
            paid_on: None,
        });

        let result = scorer(backend)
            .check_table("billing", d(2026, 8, 1))
            .await
            .unwrap();
        assert_eq!(result.integrity_score, 50.0);
        assert_eq!(result.consistency_score, 50.0);
        // 6 slots, 1 missing (the non-positive amount).
        assert_eq!(result.completeness_score, 83.33);
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.kind == "amount_not_positive"));
    }

    #[tokio::test]
    async fn full_check_appends_one_entry_per_table_every_run() {
        let backend = Arc::new(MemoryBackend::new());
        let scorer = scorer(backend.clone());

        let results = scorer.run_full_check().await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(backend.quality_log_len(), 5);

        // Point-in-time audit: a second run appends a second batch.
        scorer.run_full_check().await.unwrap();
        assert_eq!(backend.quality_log_len(), 10);
    }

    #[tokio::test]
    async fn one_broken_table_does_not_hide_the_others() {
        let backend = Arc::new(MemoryBackend::new());
        let raw = Arc::new(FaultyRaw::new(MemoryBackend::new()).fail_on("all_bills"));
        let scorer = QualityScorer::new(raw, backend.clone());

        let results = scorer.run_full_check().await.unwrap();
        assert_eq!(results.len(), 5);

        let billing = results.iter().find(|r| r.table == "billing").unwrap();
        assert!(billing.error.as_deref().unwrap().contains("all_bills"));

        let students = results.iter().find(|r| r.table == "students").unwrap();
        assert!(students.error.is_none());
        assert_eq!(students.overall_score, 100.0);

        // Only clean tables reach the ledger.
        assert_eq!(backend.quality_log_len(), 4);
    }

    #[tokio::test]
    async fn unknown_table_is_a_validation_error() {
        let backend = Arc::new(MemoryBackend::new());
        let err = scorer(backend)
            .check_table("payments", d(2026, 8, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn registered_audit_extends_the_full_check() {
        struct NoopAudit;

        #[async_trait]
        impl TableAudit for NoopAudit {
            fn table(&self) -> &'static str {
                "equipment"
            }

            async fn collect(
                &self,
                _raw: &dyn RawRecords,
                _as_of: NaiveDate,
            ) -> Result<TableFindings> {
                Ok(TableFindings::new(0, 0))
            }
        }

        let backend = Arc::new(MemoryBackend::new());
        let mut scorer = scorer(backend);
        scorer.register(Box::new(NoopAudit));

        assert!(scorer.tables().contains(&"equipment"));
        let results = scorer.run_full_check().await.unwrap();
        assert_eq!(results.len(), 6);
    }
}
