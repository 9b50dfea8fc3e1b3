use std::fmt::Write;

use crate::models::{DashboardView, QualityCheckResult};

/// Render the latest dashboard view and quality report as markdown.
pub fn build_report(view: Option<&DashboardView>, quality: &[QualityCheckResult]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Arena Operations Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Financial");

    match view.and_then(|v| v.financial.as_ref()) {
        Some(financial) => {
            let _ = writeln!(output, "Snapshot for {}:", financial.date);
            let _ = writeln!(output, "- MRR: {:.2}", financial.mrr);
            let _ = writeln!(output, "- Delinquency: {:.2}%", financial.delinquency_pct);
            let _ = writeln!(
                output,
                "- Bill conversion: {:.2}% ({} issued, {} paid)",
                financial.conversion_pct, financial.bills_issued, financial.bills_paid
            );
            let _ = writeln!(output, "- DSO: {} days", financial.dso_days);
        }
        None => {
            let _ = writeln!(output, "No financial snapshot yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");

    let attendance = view.map(|v| v.attendance.as_slice()).unwrap_or_default();
    if attendance.is_empty() {
        let _ = writeln!(output, "No attendance snapshots yet.");
    } else {
        for snap in attendance {
            let _ = writeln!(
                output,
                "- {} ({}): attendance {:.2}%, adherence {:.2}%, {} low-attendance students",
                snap.class_name,
                snap.date,
                snap.avg_attendance_pct,
                snap.checkin_adherence_pct,
                snap.low_attendance_students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Operations");

    match view.and_then(|v| v.operational.as_ref()) {
        Some(ops) => {
            let _ = writeln!(
                output,
                "Snapshot for {}: DAU {}, MAU {}, court occupancy {:.2}%",
                ops.date, ops.dau, ops.mau, ops.court_occupancy_pct
            );
            let _ = writeln!(
                output,
                "Active: {} students, {} teachers, {} classes",
                ops.active_students, ops.active_teachers, ops.active_classes
            );
        }
        None => {
            let _ = writeln!(output, "No operational snapshot yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");

    if quality.is_empty() {
        let _ = writeln!(output, "No quality checks recorded yet.");
    } else {
        for entry in quality {
            match &entry.error {
                Some(err) => {
                    let _ = writeln!(output, "- {}: check failed ({err})", entry.table);
                }
                None => {
                    let _ = writeln!(
                        output,
                        "- {}: overall {:.2} (integrity {:.2}, completeness {:.2}, consistency {:.2}, accuracy {:.2}), {} anomalies",
                        entry.table,
                        entry.overall_score,
                        entry.integrity_score,
                        entry.completeness_score,
                        entry.consistency_score,
                        entry.accuracy_score,
                        entry.anomalies.len()
                    );
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anomaly, FinancialSnapshot};
    use chrono::{NaiveDate, Utc};

    #[test]
    fn empty_state_renders_placeholders() {
        let report = build_report(None, &[]);
        assert!(report.contains("# Arena Operations Report"));
        assert!(report.contains("No financial snapshot yet."));
        assert!(report.contains("No quality checks recorded yet."));
    }

    #[test]
    fn populated_view_and_quality_rows_are_listed() {
        let view = DashboardView {
            refreshed_at: Utc::now(),
            financial: Some(FinancialSnapshot {
                date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
                mrr: 12_500.0,
                delinquency_pct: 8.5,
                conversion_pct: 40.0,
                dso_days: 6,
                bills_issued: 10,
                bills_paid: 4,
                bills_overdue: 2,
            }),
            attendance: Vec::new(),
            operational: None,
        };
        let quality = vec![
            QualityCheckResult {
                table: "students".to_string(),
                checked_at: Utc::now(),
                integrity_score: 95.0,
                completeness_score: 90.0,
                consistency_score: 100.0,
                accuracy_score: 85.0,
                overall_score: 92.5,
                total_records: 120,
                anomalies: vec![Anomaly::field("invalid_format", "email", 3)],
                details: serde_json::Value::Null,
                error: None,
            },
            QualityCheckResult {
                table: "billing".to_string(),
                checked_at: Utc::now(),
                integrity_score: 0.0,
                completeness_score: 0.0,
                consistency_score: 0.0,
                accuracy_score: 0.0,
                overall_score: 0.0,
                total_records: 0,
                anomalies: Vec::new(),
                details: serde_json::Value::Null,
                error: Some("connection reset".to_string()),
            },
        ];

        let report = build_report(Some(&view), &quality);
        assert!(report.contains("MRR: 12500.00"));
        assert!(report.contains("students: overall 92.50"));
        assert!(report.contains("billing: check failed (connection reset)"));
    }
}
