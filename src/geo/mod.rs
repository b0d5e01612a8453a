pub mod coordinate;
pub mod distance;

pub use coordinate::{Coordinate, CoordinateError};
pub use distance::{distance, EARTH_RADIUS_METERS};
