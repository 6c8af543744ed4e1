//! Speed multiplier mapping
//!
//! Every backend has its own rate unit (a `speedScale` factor, a speaking
//! rate, words per minute or a signed rate delta). [`SpeedRange`] clamps the
//! requested multiplier to what the backend supports and maps it linearly to
//! the native unit.

/// Supported multiplier bounds plus a linear map to the native unit
///
/// `native = offset + multiplier * scale`, evaluated after clamping the
/// multiplier to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedRange {
    min: f32,
    max: f32,
    scale: f32,
    offset: f32,
}

impl SpeedRange {
    /// Range where the native unit is the multiplier itself
    #[must_use]
    pub const fn multiplier(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Range whose native unit is `offset + multiplier * scale`
    #[must_use]
    pub const fn linear(min: f32, max: f32, scale: f32, offset: f32) -> Self {
        Self {
            min,
            max,
            scale,
            offset,
        }
    }

    /// Lower multiplier bound
    #[must_use]
    pub const fn min(&self) -> f32 {
        self.min
    }

    /// Upper multiplier bound
    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    /// Clamp a multiplier to the supported bounds
    ///
    /// Non-finite input maps to 1.0 before clamping.
    #[must_use]
    pub fn clamp(&self, speed: f32) -> f32 {
        let speed = if speed.is_finite() { speed } else { 1.0 };
        speed.clamp(self.min, self.max)
    }

    /// Clamp and convert to the backend's native unit
    #[must_use]
    pub fn to_native(&self, speed: f32) -> f32 {
        self.clamp(speed).mul_add(self.scale, self.offset)
    }

    /// Clamp, convert and round to the nearest integer native value
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_native_rounded(&self, speed: f32) -> i32 {
        self.to_native(speed).round() as i32
    }
}
