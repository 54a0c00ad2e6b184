//! Measurement calculator.
//!
//! Every mode uses the same formula:
//! `net = (raw + range(L) + range(R) + corr(L) + corr(R)) * factor + offset`.

use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::models::{GlassMaterial, MeasureMode};
use crate::probe::{self, Probe, ProbeCatalog};

/// Inputs for one calculation. Probes are borrowed from the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementInput<'a> {
    pub raw_mm: f32,
    pub left: Option<&'a Probe>,
    pub right: Option<&'a Probe>,
    pub factor: f32,
    pub offset_mm: f32,
}

impl<'a> MeasurementInput<'a> {
    pub fn new(raw_mm: f32) -> Self {
        Self {
            raw_mm,
            left: None,
            right: None,
            factor: 1.0,
            offset_mm: 0.0,
        }
    }

    pub fn with_left(mut self, probe: &'a Probe) -> Self {
        self.left = Some(probe);
        self
    }

    pub fn with_right(mut self, probe: &'a Probe) -> Self {
        self.right = Some(probe);
        self
    }

    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_offset(mut self, offset_mm: f32) -> Self {
        self.offset_mm = offset_mm;
        self
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct MeasurementResult {
    pub raw_mm: f32,
    pub range_offset_left_mm: f32,
    pub range_offset_right_mm: f32,
    pub correction_left_mm: f32,
    pub correction_right_mm: f32,
    pub factor: f32,
    pub offset_mm: f32,
    pub net_mm: f32,
    /// Human-readable breakdown, e.g. `1200.00 -20.00[L:EXTERNAL] = 1180.00 mm`.
    pub derivation: String,
}

pub fn calculate(input: &MeasurementInput<'_>) -> MeasurementResult {
    let range_offset_left_mm = probe::range_offset(input.left);
    let range_offset_right_mm = probe::range_offset(input.right);
    let correction_left_mm = probe::correction(input.left);
    let correction_right_mm = probe::correction(input.right);

    let net_mm = (input.raw_mm
        + range_offset_left_mm
        + range_offset_right_mm
        + correction_left_mm
        + correction_right_mm)
        * input.factor
        + input.offset_mm;

    let mut result = MeasurementResult {
        raw_mm: input.raw_mm,
        range_offset_left_mm,
        range_offset_right_mm,
        correction_left_mm,
        correction_right_mm,
        factor: input.factor,
        offset_mm: input.offset_mm,
        net_mm,
        derivation: String::new(),
    };
    result.derivation = derivation(input, &result);

    debug!(
        raw = result.raw_mm,
        left_offset = result.range_offset_left_mm,
        left_corr = result.correction_left_mm,
        right_offset = result.range_offset_right_mm,
        right_corr = result.correction_right_mm,
        net = result.net_mm,
        "Measurement calculated"
    );

    result
}

fn derivation(input: &MeasurementInput<'_>, result: &MeasurementResult) -> String {
    // Writing to a String cannot fail.
    let mut text = format!("{:.2}", result.raw_mm);

    if result.range_offset_left_mm != 0.0 {
        let _ = write!(text, " {:+.2}", result.range_offset_left_mm);
    }
    if result.range_offset_right_mm != 0.0 {
        let _ = write!(text, " {:+.2}", result.range_offset_right_mm);
    }
    if let (true, Some(tip)) = (result.correction_left_mm != 0.0, input.left) {
        let _ = write!(
            text,
            " {:+.2}[L:{}]",
            result.correction_left_mm,
            tip.reference.as_str()
        );
    }
    if let (true, Some(tip)) = (result.correction_right_mm != 0.0, input.right) {
        let _ = write!(
            text,
            " {:+.2}[R:{}]",
            result.correction_right_mm,
            tip.reference.as_str()
        );
    }
    if result.factor != 1.0 {
        let _ = write!(text, " × {:.3}", result.factor);
    }
    if result.offset_mm != 0.0 {
        let _ = write!(text, " {:+.2}", result.offset_mm);
    }
    let _ = write!(text, " = {:.2} mm", result.net_mm);

    text
}

/// True when `value_mm` lies within `[min_mm, max_mm]`.
pub fn validate_range(value_mm: f32, min_mm: f32, max_mm: f32) -> bool {
    value_mm >= min_mm && value_mm <= max_mm
}

/// Per-mode calculation settings: which probes are mounted plus factor and offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    pub mode: MeasureMode,
    pub left_probe_id: Option<String>,
    pub right_probe_id: Option<String>,
    pub factor: f32,
    pub offset_mm: f32,
    pub enabled: bool,
}

impl ModeProfile {
    pub fn new(mode: MeasureMode) -> Self {
        Self {
            mode,
            left_probe_id: None,
            right_probe_id: None,
            factor: 1.0,
            offset_mm: 0.0,
            enabled: true,
        }
    }

    /// Build a calculator input for a raw reading. Probe ids missing from
    /// the catalog resolve to no probe.
    pub fn resolve<'a>(&self, catalog: &'a ProbeCatalog, raw_mm: f32) -> MeasurementInput<'a> {
        MeasurementInput {
            raw_mm,
            left: self.lookup(catalog, self.left_probe_id.as_deref()),
            right: self.lookup(catalog, self.right_probe_id.as_deref()),
            factor: self.factor,
            offset_mm: self.offset_mm,
        }
    }

    fn lookup<'a>(&self, catalog: &'a ProbeCatalog, id: Option<&str>) -> Option<&'a Probe> {
        let id = id?;
        let found = catalog.get(id);
        if found.is_none() {
            warn!(mode = %self.mode, probe = id, "Probe not in catalog, measuring without it");
        }
        found
    }
}

/// Raw glass opening and the net pane size for its frame material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlassPane {
    pub width_raw_mm: f32,
    pub height_raw_mm: f32,
    pub material: GlassMaterial,
    pub quantity: u32,
}

impl GlassPane {
    pub fn new(width_raw_mm: f32, height_raw_mm: f32, material: GlassMaterial) -> Self {
        Self {
            width_raw_mm,
            height_raw_mm,
            material,
            quantity: 1,
        }
    }

    pub fn width_net_mm(&self) -> f32 {
        self.material.net_mm(self.width_raw_mm)
    }

    pub fn height_net_mm(&self) -> f32 {
        self.material.net_mm(self.height_raw_mm)
    }
}
