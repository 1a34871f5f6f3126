use std::f64::consts::PI;
use std::time::Duration;
use crate::message::Point;

/// Seconds per full rotation
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// A circular path around the origin at a fixed height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Route {
    pub id:     u32,
    pub radius: f64,
    pub height: f64,
}

impl Route {
    pub const fn new(id: u32, radius: f64, height: f64) -> Self {
        Self { id, radius, height }
    }

    pub fn point_at(&self, angle: f64) -> Point {
        generate_point(self.id, self.radius, self.height, angle)
    }
}

/// The two routes every published message carries.
pub const ROUTES: [Route; 2] = [
    Route::new(101, 100.0, 50.0),
    Route::new(102, 300.0, 20.0),
];

/// Angle in radians after `elapsed_secs`, one full turn per `period_secs`.
/// `period_secs` must be positive; zero yields NaN.
pub fn angle(elapsed_secs: f64, period_secs: f64) -> f64 {
    2.0 * PI * elapsed_secs.rem_euclid(period_secs) / period_secs
}

pub fn generate_point(id: u32, radius: f64, height: f64, angle: f64) -> Point {
    Point {
        id,
        x: radius * angle.cos(),
        y: radius * angle.sin(),
        z: height,
    }
}
