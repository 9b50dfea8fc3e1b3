//! Per-class daily attendance aggregation: attendance rate, check-in
//! adherence and the trailing-30-day low-attendance count, one snapshot
//! per (date, class).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::keys;
use crate::models::{pct, AttendanceSnapshot, ClassRecord};
use crate::store::{Cache, DateRange, RawRecords, SnapshotStore};

/// Presence ratio below which a student counts as low-attendance.
const LOW_ATTENDANCE_THRESHOLD: f64 = 0.75;

#[derive(Clone)]
pub struct AttendanceAggregator {
    raw: Arc<dyn RawRecords>,
    store: Arc<dyn SnapshotStore>,
    cache: Arc<dyn Cache>,
}

impl AttendanceAggregator {
    pub fn new(
        raw: Arc<dyn RawRecords>,
        store: Arc<dyn SnapshotStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        AttendanceAggregator { raw, store, cache }
    }

    /// Recompute attendance snapshots for every active class on `date`.
    ///
    /// The per-class loop is best-effort: each class is attempted, a
    /// failed class is collected, and the run returns
    /// `AttendancePartial` after the loop. Snapshots upserted for the
    /// classes that succeeded stand.
    pub async fn aggregate(&self, date: NaiveDate) -> Result<Vec<AttendanceSnapshot>> {
        let classes = self.raw.active_classes().await?;
        let attempted = classes.len();

        let mut snapshots = Vec::with_capacity(attempted);
        let mut failures = Vec::new();

        for class in classes {
            match self.aggregate_class(&class, date).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    warn!(class_id = %class.id, %err, "class attendance aggregation failed");
                    failures.push((class.id, err.to_string()));
                }
            }
        }

        if !snapshots.is_empty() {
            self.cache.delete(keys::ATTENDANCE_VERSION).await?;
        }

        if !failures.is_empty() {
            return Err(EngineError::AttendancePartial {
                attempted,
                failures,
            });
        }

        info!(%date, classes = attempted, "attendance metrics aggregated");
        Ok(snapshots)
    }

    async fn aggregate_class(
        &self,
        class: &ClassRecord,
        date: NaiveDate,
    ) -> Result<AttendanceSnapshot> {
        let day = DateRange::day(date);

        let enrolled = self.raw.enrolled_student_ids(class.id).await?;
        let sessions_today = self.raw.sessions_in(class.id, day).await?;
        let presences_today = self.raw.presences_in(class.id, day).await?;

        let present_students: HashSet<Uuid> =
            presences_today.iter().map(|p| p.student_id).collect();
        let avg_attendance_pct = pct(present_students.len() as i64, enrolled.len() as i64);

        let sessions_with_presence = sessions_today
            .iter()
            .filter(|s| presences_today.iter().any(|p| p.session_id == s.id))
            .count() as i64;
        let checkin_adherence_pct =
            pct(sessions_with_presence, sessions_today.len() as i64);

        let low_attendance_students = self.low_attendance_count(class.id, &enrolled, date).await?;

        let snapshot = AttendanceSnapshot {
            date,
            class_id: class.id,
            class_name: class.name.clone(),
            avg_attendance_pct,
            checkin_adherence_pct,
            total_attendance_records: present_students.len() as i64,
            total_sessions: sessions_today.len() as i64,
            low_attendance_students,
        };

        self.store.upsert_attendance(&snapshot).await?;
        Ok(snapshot)
    }

    /// Enrolled students whose presence ratio over sessions held in the
    /// trailing 30 days is strictly below the threshold. A window with no
    /// sessions leaves every student without a denominator, so none count.
    async fn low_attendance_count(
        &self,
        class_id: Uuid,
        enrolled: &[Uuid],
        date: NaiveDate,
    ) -> Result<i64> {
        let window = DateRange::trailing(date, 30);
        let sessions = self.raw.sessions_in(class_id, window).await?;
        if sessions.is_empty() {
            return Ok(0);
        }

        let presences = self.raw.presences_in(class_id, window).await?;
        let mut attended: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for presence in &presences {
            attended
                .entry(presence.student_id)
                .or_default()
                .insert(presence.session_id);
        }

        let held = sessions.len() as f64;
        let low = enrolled
            .iter()
            .filter(|student| {
                let count = attended.get(student).map(|s| s.len()).unwrap_or(0);
                (count as f64 / held) < LOW_ATTENDANCE_THRESHOLD
            })
            .count();
        Ok(low as i64)
    }
}
