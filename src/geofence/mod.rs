pub mod config;
pub mod controller;
pub mod state;

pub use config::{GeofenceConfig, GeofenceConfigError};
pub use controller::{CheckTrigger, GeofenceEvaluator};
pub use state::{GeofenceState, GeofenceVerdict};
