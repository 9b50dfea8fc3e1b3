//! Metrics aggregation and data-quality scoring for arena operations:
//! raw payment, attendance, enrollment and scheduling records become
//! daily snapshots, while independent audits score the same raw tables
//! for integrity, completeness, consistency and accuracy.

pub mod attendance;
pub mod dashboard;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod financial;
pub mod memory;
pub mod models;
pub mod operational;
pub mod pg;
pub mod quality;
pub mod report;
pub mod store;

/// Cache version keys, one per metric domain. Aggregators delete the
/// domain's key after a write; every memoized range read embeds the
/// current version, so dropping the key invalidates them all at once.
pub mod keys {
    pub const FINANCIAL_VERSION: &str = "metrics:financial:ver";
    pub const ATTENDANCE_VERSION: &str = "metrics:attendance:ver";
    pub const OPERATIONAL_VERSION: &str = "metrics:operational:ver";
}

pub use engine::MetricsEngine;
pub use error::{EngineError, Result};
pub use store::DateRange;
