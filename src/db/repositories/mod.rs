pub mod absence_reports;
pub mod attendance_records;
