//! In-memory implementations of the storage seams. These back the unit
//! tests and provide the drop-in substitution point for the Postgres
//! backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    ActiveEntityCounts, AttendanceSnapshot, BillRecord, ClassRecord, DashboardView,
    FinancialSnapshot, GuardianRecord, OperationalSnapshot, PresenceRecord, ProcessedEvent,
    QualityCheckResult, SessionRecord, SlotRecord, StudentRecord, ACTIVE_ACTIONS,
};
use crate::store::{Cache, DateRange, EventLedger, QualityLedger, RawRecords, SnapshotStore};

#[derive(Default)]
struct Inner {
    // Raw domain tables (read-only from the engine's perspective).
    students: Vec<StudentRecord>,
    guardians: Vec<GuardianRecord>,
    teachers: Vec<Uuid>,
    classes: Vec<ClassRecord>,
    enrollments: Vec<(Uuid, Uuid)>, // (class_id, student_id), active
    sessions: Vec<SessionRecord>,
    presences: Vec<PresenceRecord>,
    bills: Vec<BillRecord>,
    slots: Vec<SlotRecord>,
    activity: Vec<(Uuid, String, NaiveDate)>, // (user_id, action, day)

    // Derived state owned by the engine.
    financial: BTreeMap<NaiveDate, FinancialSnapshot>,
    attendance: BTreeMap<(NaiveDate, Uuid), AttendanceSnapshot>,
    operational: BTreeMap<NaiveDate, OperationalSnapshot>,
    dashboard: Option<DashboardView>,
    events: HashMap<String, ProcessedEvent>,
    quality_log: Vec<QualityCheckResult>,
}

/// Whole backend behind one lock. Raw tables are seeded through the
/// `push_*` methods; derived state is reached only through the traits.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panicking test; propagating the panic
        // is the right behavior there.
        self.inner.lock().expect("memory backend lock poisoned")
    }

    pub fn push_student(&self, student: StudentRecord) {
        self.lock().students.push(student);
    }

    pub fn push_guardian(&self, guardian: GuardianRecord) {
        self.lock().guardians.push(guardian);
    }

    pub fn push_teacher(&self, teacher_id: Uuid) {
        self.lock().teachers.push(teacher_id);
    }

    pub fn push_class(&self, class: ClassRecord) {
        self.lock().classes.push(class);
    }

    pub fn enroll(&self, class_id: Uuid, student_id: Uuid) {
        self.lock().enrollments.push((class_id, student_id));
    }

    pub fn push_session(&self, session: SessionRecord) {
        self.lock().sessions.push(session);
    }

    pub fn push_presence(&self, presence: PresenceRecord) {
        self.lock().presences.push(presence);
    }

    pub fn push_bill(&self, bill: BillRecord) {
        self.lock().bills.push(bill);
    }

    pub fn push_slot(&self, slot: SlotRecord) {
        self.lock().slots.push(slot);
    }

    pub fn push_activity(&self, user_id: Uuid, action: &str, day: NaiveDate) {
        self.lock().activity.push((user_id, action.to_string(), day));
    }

    pub fn financial_row(&self, date: NaiveDate) -> Option<FinancialSnapshot> {
        self.lock().financial.get(&date).cloned()
    }

    pub fn attendance_row(&self, date: NaiveDate, class_id: Uuid) -> Option<AttendanceSnapshot> {
        self.lock().attendance.get(&(date, class_id)).cloned()
    }

    pub fn operational_row(&self, date: NaiveDate) -> Option<OperationalSnapshot> {
        self.lock().operational.get(&date).cloned()
    }

    pub fn attendance_row_count(&self) -> usize {
        self.lock().attendance.len()
    }

    pub fn quality_log_len(&self) -> usize {
        self.lock().quality_log.len()
    }
}

#[async_trait]
impl RawRecords for MemoryBackend {
    async fn bills_due_on_or_before(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        Ok(self
            .lock()
            .bills
            .iter()
            .filter(|b| matches!(b.due_on, Some(due) if due <= date))
            .cloned()
            .collect())
    }

    async fn bills_issued_on(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        Ok(self
            .lock()
            .bills
            .iter()
            .filter(|b| b.issued_on == date)
            .cloned()
            .collect())
    }

    async fn bills_paid_in(&self, window: DateRange) -> Result<Vec<BillRecord>> {
        Ok(self
            .lock()
            .bills
            .iter()
            .filter(|b| b.is_paid() && matches!(b.paid_on, Some(paid) if window.contains(paid)))
            .cloned()
            .collect())
    }

    async fn active_classes(&self) -> Result<Vec<ClassRecord>> {
        Ok(self
            .lock()
            .classes
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect())
    }

    async fn enrolled_student_ids(&self, class_id: Uuid) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        let mut seen = HashSet::new();
        Ok(inner
            .enrollments
            .iter()
            .filter(|(class, _)| *class == class_id)
            .map(|(_, student)| *student)
            .filter(|student| seen.insert(*student))
            .collect())
    }

    async fn sessions_in(&self, class_id: Uuid, window: DateRange) -> Result<Vec<SessionRecord>> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.class_id == class_id && window.contains(s.held_on))
            .cloned()
            .collect())
    }

    async fn presences_in(
        &self,
        class_id: Uuid,
        window: DateRange,
    ) -> Result<Vec<PresenceRecord>> {
        let inner = self.lock();
        let session_ids: HashSet<Uuid> = inner
            .sessions
            .iter()
            .filter(|s| s.class_id == class_id && window.contains(s.held_on))
            .map(|s| s.id)
            .collect();
        Ok(inner
            .presences
            .iter()
            .filter(|p| session_ids.contains(&p.session_id))
            .cloned()
            .collect())
    }

    async fn active_user_ids_in(&self, window: DateRange) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        let mut seen = HashSet::new();
        Ok(inner
            .activity
            .iter()
            .filter(|(_, action, day)| {
                window.contains(*day) && ACTIVE_ACTIONS.contains(&action.as_str())
            })
            .map(|(user, _, _)| *user)
            .filter(|user| seen.insert(*user))
            .collect())
    }

    async fn active_entity_counts(&self) -> Result<ActiveEntityCounts> {
        let inner = self.lock();
        Ok(ActiveEntityCounts {
            students: inner.students.iter().filter(|s| s.active).count() as i64,
            teachers: inner.teachers.len() as i64,
            classes: inner.classes.iter().filter(|c| c.active).count() as i64,
        })
    }

    async fn slots_on(&self, date: NaiveDate) -> Result<Vec<SlotRecord>> {
        Ok(self
            .lock()
            .slots
            .iter()
            .filter(|s| s.slot_date == date)
            .cloned()
            .collect())
    }

    async fn all_students(&self) -> Result<Vec<StudentRecord>> {
        Ok(self.lock().students.clone())
    }

    async fn all_guardians(&self) -> Result<Vec<GuardianRecord>> {
        Ok(self.lock().guardians.clone())
    }

    async fn all_bills(&self) -> Result<Vec<BillRecord>> {
        Ok(self.lock().bills.clone())
    }

    async fn all_classes(&self) -> Result<Vec<ClassRecord>> {
        Ok(self.lock().classes.clone())
    }

    async fn all_sessions(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.lock().sessions.clone())
    }

    async fn all_presences(&self) -> Result<Vec<PresenceRecord>> {
        Ok(self.lock().presences.clone())
    }

    async fn all_teacher_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.lock().teachers.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemoryBackend {
    async fn upsert_financial(&self, snapshot: &FinancialSnapshot) -> Result<()> {
        self.lock().financial.insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    async fn upsert_attendance(&self, snapshot: &AttendanceSnapshot) -> Result<()> {
        self.lock()
            .attendance
            .insert((snapshot.date, snapshot.class_id), snapshot.clone());
        Ok(())
    }

    async fn upsert_operational(&self, snapshot: &OperationalSnapshot) -> Result<()> {
        self.lock()
            .operational
            .insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    async fn financial_in(&self, range: DateRange) -> Result<Vec<FinancialSnapshot>> {
        Ok(self
            .lock()
            .financial
            .range(range.start()..=range.end())
            .map(|(_, snap)| snap.clone())
            .collect())
    }

    async fn attendance_since(
        &self,
        since: NaiveDate,
        class_id: Option<Uuid>,
    ) -> Result<Vec<AttendanceSnapshot>> {
        let inner = self.lock();
        let mut rows: Vec<AttendanceSnapshot> = inner
            .attendance
            .values()
            .filter(|snap| snap.date >= since)
            .filter(|snap| class_id.map_or(true, |id| snap.class_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.class_name.cmp(&b.class_name)));
        Ok(rows)
    }

    async fn operational_since(&self, since: NaiveDate) -> Result<Vec<OperationalSnapshot>> {
        let inner = self.lock();
        let mut rows: Vec<OperationalSnapshot> = inner
            .operational
            .values()
            .filter(|snap| snap.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn latest_financial(&self) -> Result<Option<FinancialSnapshot>> {
        Ok(self
            .lock()
            .financial
            .values()
            .next_back()
            .cloned())
    }

    async fn latest_attendance(&self) -> Result<Vec<AttendanceSnapshot>> {
        let inner = self.lock();
        let latest = match inner.attendance.keys().map(|(date, _)| *date).max() {
            Some(date) => date,
            None => return Ok(Vec::new()),
        };
        let mut rows: Vec<AttendanceSnapshot> = inner
            .attendance
            .values()
            .filter(|snap| snap.date == latest)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        Ok(rows)
    }

    async fn latest_operational(&self) -> Result<Option<OperationalSnapshot>> {
        Ok(self
            .lock()
            .operational
            .values()
            .next_back()
            .cloned())
    }

    async fn store_dashboard_view(&self, view: &DashboardView) -> Result<()> {
        self.lock().dashboard = Some(view.clone());
        Ok(())
    }

    async fn latest_dashboard_view(&self) -> Result<Option<DashboardView>> {
        Ok(self.lock().dashboard.clone())
    }
}

#[async_trait]
impl EventLedger for MemoryBackend {
    async fn contains(&self, event_id: &str) -> Result<bool> {
        Ok(self.lock().events.contains_key(event_id))
    }

    async fn record(&self, event: &ProcessedEvent) -> Result<bool> {
        let mut inner = self.lock();
        if inner.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        inner.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.lock().events.len() as i64)
    }
}

#[async_trait]
impl QualityLedger for MemoryBackend {
    async fn append(&self, result: &QualityCheckResult) -> Result<()> {
        self.lock().quality_log.push(result.clone());
        Ok(())
    }

    async fn latest_per_table(&self) -> Result<Vec<QualityCheckResult>> {
        let inner = self.lock();
        let mut latest: BTreeMap<String, QualityCheckResult> = BTreeMap::new();
        for entry in inner.quality_log.iter() {
            match latest.get(&entry.table) {
                Some(existing) if existing.checked_at >= entry.checked_at => {}
                _ => {
                    latest.insert(entry.table.clone(), entry.clone());
                }
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn history(&self, table: &str, days: i64) -> Result<Vec<QualityCheckResult>> {
        let cutoff = Utc::now() - ChronoDuration::days(days.max(0));
        let mut rows: Vec<QualityCheckResult> = self
            .lock()
            .quality_log
            .iter()
            .filter(|entry| entry.table == table && entry.checked_at >= cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        Ok(rows)
    }
}

/// In-process cache with per-key expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// `RawRecords` wrapper that fails selected reads, for exercising the
/// abort and isolation error paths.
pub struct FaultyRaw<R> {
    inner: R,
    failing: HashSet<&'static str>,
    failing_for_class: HashSet<(&'static str, Uuid)>,
}

impl<R> FaultyRaw<R> {
    pub fn new(inner: R) -> Self {
        FaultyRaw {
            inner,
            failing: HashSet::new(),
            failing_for_class: HashSet::new(),
        }
    }

    pub fn fail_on(mut self, method: &'static str) -> Self {
        self.failing.insert(method);
        self
    }

    /// Fail a class-scoped read only for the given class.
    pub fn fail_on_class(mut self, method: &'static str, class_id: Uuid) -> Self {
        self.failing_for_class.insert((method, class_id));
        self
    }

    fn check(&self, method: &'static str) -> Result<()> {
        if self.failing.contains(method) {
            return Err(EngineError::Backend(format!("injected failure: {method}")));
        }
        Ok(())
    }

    fn check_class(&self, method: &'static str, class_id: Uuid) -> Result<()> {
        self.check(method)?;
        if self.failing_for_class.contains(&(method, class_id)) {
            return Err(EngineError::Backend(format!(
                "injected failure: {method} for class {class_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: RawRecords> RawRecords for FaultyRaw<R> {
    async fn bills_due_on_or_before(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        self.check("bills_due_on_or_before")?;
        self.inner.bills_due_on_or_before(date).await
    }

    async fn bills_issued_on(&self, date: NaiveDate) -> Result<Vec<BillRecord>> {
        self.check("bills_issued_on")?;
        self.inner.bills_issued_on(date).await
    }

    async fn bills_paid_in(&self, window: DateRange) -> Result<Vec<BillRecord>> {
        self.check("bills_paid_in")?;
        self.inner.bills_paid_in(window).await
    }

    async fn active_classes(&self) -> Result<Vec<ClassRecord>> {
        self.check("active_classes")?;
        self.inner.active_classes().await
    }

    async fn enrolled_student_ids(&self, class_id: Uuid) -> Result<Vec<Uuid>> {
        self.check_class("enrolled_student_ids", class_id)?;
        self.inner.enrolled_student_ids(class_id).await
    }

    async fn sessions_in(&self, class_id: Uuid, window: DateRange) -> Result<Vec<SessionRecord>> {
        self.check_class("sessions_in", class_id)?;
        self.inner.sessions_in(class_id, window).await
    }

    async fn presences_in(
        &self,
        class_id: Uuid,
        window: DateRange,
    ) -> Result<Vec<PresenceRecord>> {
        self.check_class("presences_in", class_id)?;
        self.inner.presences_in(class_id, window).await
    }

    async fn active_user_ids_in(&self, window: DateRange) -> Result<Vec<Uuid>> {
        self.check("active_user_ids_in")?;
        self.inner.active_user_ids_in(window).await
    }

    async fn active_entity_counts(&self) -> Result<ActiveEntityCounts> {
        self.check("active_entity_counts")?;
        self.inner.active_entity_counts().await
    }

    async fn slots_on(&self, date: NaiveDate) -> Result<Vec<SlotRecord>> {
        self.check("slots_on")?;
        self.inner.slots_on(date).await
    }

    async fn all_students(&self) -> Result<Vec<StudentRecord>> {
        self.check("all_students")?;
        self.inner.all_students().await
    }

    async fn all_guardians(&self) -> Result<Vec<GuardianRecord>> {
        self.check("all_guardians")?;
        self.inner.all_guardians().await
    }

    async fn all_bills(&self) -> Result<Vec<BillRecord>> {
        self.check("all_bills")?;
        self.inner.all_bills().await
    }

    async fn all_classes(&self) -> Result<Vec<ClassRecord>> {
        self.check("all_classes")?;
        self.inner.all_classes().await
    }

    async fn all_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.check("all_sessions")?;
        self.inner.all_sessions().await
    }

    async fn all_presences(&self) -> Result<Vec<PresenceRecord>> {
        self.check("all_presences")?;
        self.inner.all_presences().await
    }

    async fn all_teacher_ids(&self) -> Result<Vec<Uuid>> {
        self.check("all_teacher_ids")?;
        self.inner.all_teacher_ids().await
    }
}
