use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_coordinate, parse_date, parse_datetime, parse_status},
};
use crate::models::{AttendanceRecord, RecordId};

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    let date: String = row.get("date")?;
    let status: String = row.get("status")?;
    let checked_in_at: String = row.get("checked_in_at")?;

    Ok(AttendanceRecord {
        id: Some(row.get("id")?),
        user_id: row.get("user_id")?,
        date: parse_date(&date, "date")?,
        coordinate: parse_coordinate(row.get("latitude")?, row.get("longitude")?)?,
        photo_reference: row.get("photo_reference")?,
        status: parse_status(&status)?,
        checked_in_at: parse_datetime(&checked_in_at, "checked_in_at")?,
    })
}

impl Database {
    /// Inserts `record` and returns the id assigned to it. Any id already on
    /// the record is ignored.
    pub async fn insert_attendance_record(&self, record: &AttendanceRecord) -> Result<RecordId> {
        let record = record.clone();
        let id = Uuid::new_v4().to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO attendance_records (
                    id, user_id, date, latitude, longitude,
                    photo_reference, status, checked_in_at, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    record.user_id,
                    record.date.format("%Y-%m-%d").to_string(),
                    record.coordinate.latitude(),
                    record.coordinate.longitude(),
                    record.photo_reference,
                    record.status.as_str(),
                    record.checked_in_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("failed to insert attendance record")?;
            Ok(id)
        })
        .await
    }

    /// Most recent first.
    pub async fn list_attendance_for_user(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, date, latitude, longitude, photo_reference, status, checked_in_at
                 FROM attendance_records
                 WHERE user_id = ?1
                 ORDER BY checked_in_at DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}
