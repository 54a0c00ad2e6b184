//! Fixed/moving pair of circular tips used by the caliper mode.
//!
//! Unlike flat probes, the pair is referenced to a calibrated zero taken with
//! both tips touching, and internal measurements add both diameters.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_DIAMETER_MM: f32 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct CircularProbe {
    pub name: String,
    pub diameter_mm: f32,
    /// Compensation for tip wear, added to every distance.
    pub wear_offset_mm: f32,
    pub usage_count: u32,
    pub active: bool,
}

impl CircularProbe {
    pub fn new(name: impl Into<String>, diameter_mm: f32) -> Self {
        Self {
            name: name.into(),
            diameter_mm,
            wear_offset_mm: 0.0,
            usage_count: 0,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct ProbePair {
    pub fixed_left: CircularProbe,
    pub moving_right: CircularProbe,
    /// Encoder reading with both tips touching.
    pub zero_distance_mm: f32,
    pub calibrated: bool,
    /// Unix seconds of the last zero calibration.
    pub calibrated_at: Option<i64>,
}

impl Default for ProbePair {
    fn default() -> Self {
        Self::with_diameter(DEFAULT_DIAMETER_MM)
    }
}

impl ProbePair {
    pub fn with_diameter(diameter_mm: f32) -> Self {
        Self {
            fixed_left: CircularProbe::new("Fisso SX", diameter_mm),
            moving_right: CircularProbe::new("Mobile DX", diameter_mm),
            zero_distance_mm: 0.0,
            calibrated: false,
            calibrated_at: None,
        }
    }

    fn wear_mm(&self) -> f32 {
        self.fixed_left.wear_offset_mm + self.moving_right.wear_offset_mm
    }

    /// Distance between the outer faces of the tips.
    pub fn external_distance(&self, encoder_mm: f32) -> f32 {
        encoder_mm - self.zero_distance_mm + self.wear_mm()
    }

    /// Distance between the inner faces, i.e. the bore being measured.
    pub fn internal_distance(&self, encoder_mm: f32) -> f32 {
        encoder_mm - self.zero_distance_mm
            + self.fixed_left.diameter_mm
            + self.moving_right.diameter_mm
            + self.wear_mm()
    }

    pub fn calibrate_zero(&mut self, encoder_reading_mm: f32, timestamp: i64) {
        self.zero_distance_mm = encoder_reading_mm;
        self.calibrated = true;
        self.calibrated_at = Some(timestamp);
        info!(
            zero_mm = encoder_reading_mm,
            timestamp, "Probe pair zero calibrated"
        );
    }

    /// Calibrate using the current wall-clock time.
    pub fn calibrate_zero_now(&mut self, encoder_reading_mm: f32) {
        self.calibrate_zero(encoder_reading_mm, chrono::Utc::now().timestamp());
    }

    pub fn reset_calibration(&mut self) {
        self.zero_distance_mm = 0.0;
        self.calibrated = false;
        self.calibrated_at = None;
        info!("Probe pair calibration reset");
    }

    pub fn increment_usage(&mut self) {
        self.fixed_left.usage_count = self.fixed_left.usage_count.saturating_add(1);
        self.moving_right.usage_count = self.moving_right.usage_count.saturating_add(1);
    }

    pub fn set_fixed_wear_offset(&mut self, offset_mm: f32) {
        self.fixed_left.wear_offset_mm = offset_mm;
    }

    pub fn set_moving_wear_offset(&mut self, offset_mm: f32) {
        self.moving_right.wear_offset_mm = offset_mm;
    }
}

/// Distance measured by a circular pair; `internal` selects bore measurement.
///
/// An uncalibrated pair still measures against a zero of 0 mm.
pub fn circular_pair_distance(pair: &ProbePair, encoder_mm: f32, internal: bool) -> f32 {
    if !pair.calibrated {
        warn!("Measuring with an uncalibrated probe pair");
    }
    if internal {
        pair.internal_distance(encoder_mm)
    } else {
        pair.external_distance(encoder_mm)
    }
}
