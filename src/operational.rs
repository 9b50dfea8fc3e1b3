//! Daily operational aggregation: DAU/MAU, active-entity totals and court
//! occupancy, one snapshot per date.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::error::Result;
use crate::keys;
use crate::models::{pct, OperationalSnapshot, SlotStatus};
use crate::store::{Cache, DateRange, RawRecords, SnapshotStore};

#[derive(Clone)]
pub struct OperationalAggregator {
    raw: Arc<dyn RawRecords>,
    store: Arc<dyn SnapshotStore>,
    cache: Arc<dyn Cache>,
}

impl OperationalAggregator {
    pub fn new(
        raw: Arc<dyn RawRecords>,
        store: Arc<dyn SnapshotStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        OperationalAggregator { raw, store, cache }
    }

    pub async fn aggregate(&self, date: NaiveDate) -> Result<OperationalSnapshot> {
        let dau = self
            .raw
            .active_user_ids_in(DateRange::day(date))
            .await?
            .len() as i64;
        let mau = self
            .raw
            .active_user_ids_in(DateRange::month_to_date(date))
            .await?
            .len() as i64;

        // Active entity totals are current counts, not scoped to `date`.
        let entities = self.raw.active_entity_counts().await?;

        let slots = self.raw.slots_on(date).await?;
        let occupied = slots
            .iter()
            .filter(|s| s.status == SlotStatus::Occupied)
            .count() as i64;
        let court_occupancy_pct = pct(occupied, slots.len() as i64);

        let snapshot = OperationalSnapshot {
            date,
            dau,
            mau,
            court_occupancy_pct,
            active_students: entities.students,
            active_teachers: entities.teachers,
            active_classes: entities.classes,
        };

        self.store.upsert_operational(&snapshot).await?;
        self.cache.delete(keys::OPERATIONAL_VERSION).await?;

        info!(%date, dau, mau, court_occupancy_pct, "operational metrics aggregated");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, MemoryCache};
    use crate::models::SlotRecord;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn aggregator(backend: Arc<MemoryBackend>) -> OperationalAggregator {
        OperationalAggregator::new(backend.clone(), backend, Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn dau_and_mau_count_distinct_users() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 7, 15);
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        // Users 0..3 active today, user 3 earlier in the month.
        for user in users.iter().take(3) {
            backend.push_activity(*user, "login", date);
        }
        backend.push_activity(users[0], "page_view", date); // repeat, still one user
        backend.push_activity(users[3], "api_call", d(2026, 7, 2));
        // Previous month: excluded from both.
        backend.push_activity(Uuid::new_v4(), "login", d(2026, 6, 28));
        // Irrelevant action: excluded.
        backend.push_activity(Uuid::new_v4(), "password_reset", date);

        let snap = aggregator(backend).aggregate(date).await.unwrap();
        assert_eq!(snap.dau, 3);
        assert_eq!(snap.mau, 4);
    }

    #[tokio::test]
    async fn occupancy_over_slots_of_the_day() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 7, 15);
        for status in [SlotStatus::Occupied, SlotStatus::Occupied, SlotStatus::Free] {
            backend.push_slot(SlotRecord {
                id: Uuid::new_v4(),
                slot_date: date,
                status,
            });
        }
        backend.push_slot(SlotRecord {
            id: Uuid::new_v4(),
            slot_date: d(2026, 7, 16),
            status: SlotStatus::Occupied,
        });

        let snap = aggregator(backend).aggregate(date).await.unwrap();
        assert_eq!(snap.court_occupancy_pct, 66.67);
    }

    #[tokio::test]
    async fn no_slots_means_zero_occupancy() {
        let backend = Arc::new(MemoryBackend::new());
        let snap = aggregator(backend).aggregate(d(2026, 7, 15)).await.unwrap();
        assert_eq!(snap.court_occupancy_pct, 0.0);
        assert_eq!(snap.dau, 0);
        assert_eq!(snap.mau, 0);
    }

    #[tokio::test]
    async fn rerun_overwrites_the_same_date() {
        let backend = Arc::new(MemoryBackend::new());
        let date = d(2026, 7, 15);
        let agg = aggregator(backend.clone());

        agg.aggregate(date).await.unwrap();
        backend.push_activity(Uuid::new_v4(), "login", date);
        agg.aggregate(date).await.unwrap();

        let rows = backend.operational_since(d(2026, 7, 1)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dau, 1);
    }
}
