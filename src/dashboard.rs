//! Dashboard view refresher: the explicit read-aggregate-store step that
//! replaces a database materialized view. Re-runnable on demand; readers
//! always see the last fully stored view.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::models::DashboardView;
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct DashboardRefresher {
    store: Arc<dyn SnapshotStore>,
}

impl DashboardRefresher {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        DashboardRefresher { store }
    }

    /// Compose the latest rows of the three snapshot families into one
    /// denormalized view and store it. Each source upsert is atomic per
    /// key, so the reads never observe a partially written snapshot.
    pub async fn refresh(&self) -> Result<DashboardView> {
        let view = DashboardView {
            refreshed_at: Utc::now(),
            financial: self.store.latest_financial().await?,
            attendance: self.store.latest_attendance().await?,
            operational: self.store.latest_operational().await?,
        };

        self.store.store_dashboard_view(&view).await?;
        info!(
            has_financial = view.financial.is_some(),
            attendance_rows = view.attendance.len(),
            "dashboard view refreshed"
        );
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::models::{AttendanceSnapshot, FinancialSnapshot, OperationalSnapshot};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn refresh_with_empty_store_yields_empty_view() {
        let backend = Arc::new(MemoryBackend::new());
        let view = DashboardRefresher::new(backend.clone()).refresh().await.unwrap();

        assert!(view.financial.is_none());
        assert!(view.attendance.is_empty());
        assert!(view.operational.is_none());
        assert!(backend.latest_dashboard_view().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_picks_latest_rows_per_family() {
        let backend = Arc::new(MemoryBackend::new());

        for (date, mrr) in [(d(2026, 8, 1), 100.0), (d(2026, 8, 2), 200.0)] {
            backend
                .upsert_financial(&FinancialSnapshot {
                    date,
                    mrr,
                    delinquency_pct: 0.0,
                    conversion_pct: 0.0,
                    dso_days: 0,
                    bills_issued: 0,
                    bills_paid: 0,
                    bills_overdue: 0,
                })
                .await
                .unwrap();
        }

        for (date, name) in [(d(2026, 8, 1), "Old"), (d(2026, 8, 2), "New")] {
            backend
                .upsert_attendance(&AttendanceSnapshot {
                    date,
                    class_id: Uuid::new_v4(),
                    class_name: name.to_string(),
                    avg_attendance_pct: 80.0,
                    checkin_adherence_pct: 100.0,
                    total_attendance_records: 8,
                    total_sessions: 1,
                    low_attendance_students: 0,
                })
                .await
                .unwrap();
        }

        backend
            .upsert_operational(&OperationalSnapshot {
                date: d(2026, 8, 2),
                dau: 12,
                mau: 40,
                court_occupancy_pct: 55.0,
                active_students: 90,
                active_teachers: 7,
                active_classes: 12,
            })
            .await
            .unwrap();

        let view = DashboardRefresher::new(backend).refresh().await.unwrap();
        assert_eq!(view.financial.unwrap().mrr, 200.0);
        assert_eq!(view.attendance.len(), 1);
        assert_eq!(view.attendance[0].class_name, "New");
        assert_eq!(view.operational.unwrap().dau, 12);
    }
}
