//! Inbound event consumption: dedup by event id, route to the relevant
//! aggregator, then durably mark the event processed. Aggregation runs
//! before the processed row is written, so a half-applied event is
//! redelivered rather than silently lost, while true duplicates stay
//! cheap no-ops.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::attendance::AttendanceAggregator;
use crate::error::{EngineError, Result};
use crate::financial::FinancialAggregator;
use crate::models::{DispatchOutcome, InboundEvent, ProcessedEvent};
use crate::operational::OperationalAggregator;
use crate::store::EventLedger;

/// Aggregation target for one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Financial,
    Attendance,
    Operational,
}

pub struct EventDispatcher {
    ledger: Arc<dyn EventLedger>,
    financial: FinancialAggregator,
    attendance: AttendanceAggregator,
    operational: OperationalAggregator,
    routes: HashMap<String, Route>,
}

impl EventDispatcher {
    /// Dispatcher with the default broker event types registered.
    pub fn new(
        ledger: Arc<dyn EventLedger>,
        financial: FinancialAggregator,
        attendance: AttendanceAggregator,
        operational: OperationalAggregator,
    ) -> Self {
        let mut dispatcher = EventDispatcher {
            ledger,
            financial,
            attendance,
            operational,
            routes: HashMap::new(),
        };
        dispatcher.register_route("payment.confirmed", Route::Financial);
        dispatcher.register_route("attendance.marked", Route::Attendance);
        dispatcher.register_route("student.enrolled", Route::Operational);
        dispatcher.register_route("class.scheduled", Route::Operational);
        dispatcher
    }

    pub fn register_route(&mut self, event_type: impl Into<String>, route: Route) {
        self.routes.insert(event_type.into(), route);
    }

    /// Consume one event. Duplicates (by `event_id`) are reported no-ops;
    /// unknown event types are recorded as processed without invoking an
    /// aggregator; aggregation failures propagate and leave the event
    /// unrecorded so a redelivery can retry.
    pub async fn process(&self, event: &InboundEvent) -> Result<DispatchOutcome> {
        if event.event_id.trim().is_empty() {
            return Err(EngineError::validation("event_id must not be empty"));
        }
        if event.event_type.trim().is_empty() {
            return Err(EngineError::validation("event_type must not be empty"));
        }

        if self.ledger.contains(&event.event_id).await? {
            debug!(event_id = %event.event_id, "event already processed");
            return Ok(DispatchOutcome::rejected("duplicate"));
        }

        let date = event.timestamp.date_naive();
        match self.routes.get(&event.event_type) {
            Some(Route::Financial) => {
                self.financial.aggregate(date).await?;
            }
            Some(Route::Attendance) => {
                self.attendance.aggregate(date).await?;
            }
            Some(Route::Operational) => {
                self.operational.aggregate(date).await?;
            }
            None => {
                // Forward compatible: unknown types are consumed, not errors.
                debug!(event_type = %event.event_type, "no route for event type");
            }
        }

        let row = ProcessedEvent {
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            processed_at: Utc::now(),
        };
        if !self.ledger.record(&row).await? {
            // A concurrent delivery of the same id won the insert race;
            // the unique key is the authoritative dedup guard.
            return Ok(DispatchOutcome::rejected("duplicate"));
        }

        info!(event_id = %event.event_id, event_type = %event.event_type, "event processed");
        Ok(DispatchOutcome::accepted())
    }
}
