use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_date, parse_status},
};
use crate::models::{AbsenceReport, RecordId};

fn row_to_report(row: &Row) -> Result<AbsenceReport> {
    let date: String = row.get("date")?;
    let status: String = row.get("status")?;

    Ok(AbsenceReport {
        user_id: row.get("user_id")?,
        full_name: row.get("full_name")?,
        date: parse_date(&date, "date")?,
        reason: row.get("reason")?,
        class_name: row.get("class_name")?,
        status: parse_status(&status)?,
    })
}

impl Database {
    pub async fn insert_absence_report(&self, report: &AbsenceReport) -> Result<RecordId> {
        let report = report.clone();
        let id = Uuid::new_v4().to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO absence_reports (
                    id, user_id, full_name, date, reason, class_name, status, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    report.user_id,
                    report.full_name,
                    report.date.format("%Y-%m-%d").to_string(),
                    report.reason,
                    report.class_name,
                    report.status.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("failed to insert absence report")?;
            Ok(id)
        })
        .await
    }

    pub async fn list_absence_reports_for_user(&self, user_id: &str) -> Result<Vec<AbsenceReport>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, full_name, date, reason, class_name, status
                 FROM absence_reports
                 WHERE user_id = ?1
                 ORDER BY date DESC, created_at DESC",
            )?;

            let mut rows = stmt.query(params![user_id])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }
            Ok(reports)
        })
        .await
    }
}
