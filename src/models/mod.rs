pub mod absence;
pub mod attendance;
pub mod identity;
pub mod location;
pub mod photo;

pub use absence::AbsenceReport;
pub use attendance::{AttendanceRecord, AttendanceStatus, RecordId};
pub use identity::Identity;
pub use location::LocationSample;
pub use photo::PhotoHandle;
