//! Device coordinate spaces → normalized screen space
//!
//! Screen space has `(0, 0)` at the top-left and `(1, 1)` at the bottom-right.
//! All mappings are total: out-of-range inputs are clamped, NaN maps to the centre.

/// Default half field of view for angular gaze, in degrees
pub const DEFAULT_MAX_ANGLE_DEG: f64 = 35.0;

/// Clamp `value` into `[lower, upper]`
pub fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    if value.is_nan() {
        return lower + (upper - lower) * 0.5;
    }
    value.max(lower).min(upper)
}

/// Clamp `value` into `[0, 1]`
pub fn clamp_unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Map bottom-left-origin normalized coordinates (OpenGL style) to screen space
pub fn flip_origin(raw_x: f64, raw_y: f64) -> (f64, f64) {
    (clamp_unit(raw_x), clamp_unit(1.0 - raw_y))
}

/// Maps yaw/pitch gaze angles onto the screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularMapping {
    max_angle_rad: f64,
}

impl AngularMapping {
    /// Create mapping for a half field of view given in degrees
    pub fn from_degrees(max_angle_deg: f64) -> Self {
        Self::from_radians(max_angle_deg.to_radians())
    }

    pub fn from_radians(max_angle_rad: f64) -> Self {
        let max_angle_rad = if max_angle_rad.is_finite() && max_angle_rad > 0.0 {
            max_angle_rad
        } else {
            DEFAULT_MAX_ANGLE_DEG.to_radians()
        };
        Self { max_angle_rad }
    }

    pub fn max_angle_rad(&self) -> f64 {
        self.max_angle_rad
    }

    /// Horizontal screen position for a yaw angle (radians)
    pub fn yaw_to_norm(&self, yaw_rad: f64) -> f64 {
        clamp_unit(0.5 + 0.5 * clamp(yaw_rad / self.max_angle_rad, -1.0, 1.0))
    }

    /// Vertical screen position for a pitch angle (radians)
    ///
    /// The sign is inverted: positive pitch moves towards the top edge (0).
    pub fn pitch_to_norm(&self, pitch_rad: f64) -> f64 {
        clamp_unit(0.5 - 0.5 * clamp(pitch_rad / self.max_angle_rad, -1.0, 1.0))
    }

    pub fn map(&self, yaw_rad: f64, pitch_rad: f64) -> (f64, f64) {
        (self.yaw_to_norm(yaw_rad), self.pitch_to_norm(pitch_rad))
    }
}

impl Default for AngularMapping {
    fn default() -> Self {
        Self::from_degrees(DEFAULT_MAX_ANGLE_DEG)
    }
}
