//! Interchangeable measuring tips and the flat correction model.
//!
//! A probe shifts the raw encoder reading by its thickness or diameter,
//! depending on which face of the workpiece it references.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProbeError;

/// Maximum number of probes kept in a catalog.
pub const MAX_PROBES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
pub enum ProbeShape {
    /// Thickness-based tip
    Flat,
    /// Diameter-based tip
    Circular,
    Conical,
    /// Shape described by an external mesh
    Custom,
}

impl ProbeShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeShape::Flat => "Flat",
            ProbeShape::Circular => "Circular",
            ProbeShape::Conical => "Conical",
            ProbeShape::Custom => "Custom",
        }
    }

    /// Decode a stored shape code. Unknown codes fall back to `Flat`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ProbeShape::Flat,
            1 => ProbeShape::Circular,
            2 => ProbeShape::Conical,
            3 => ProbeShape::Custom,
            other => {
                warn!(code = other, "Unknown probe shape code, using Flat");
                ProbeShape::Flat
            }
        }
    }
}

/// Which face of the workpiece a probe references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
pub enum ProbeReference {
    External,
    Internal,
    Center,
}

impl ProbeReference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeReference::External => "EXTERNAL",
            ProbeReference::Internal => "INTERNAL",
            ProbeReference::Center => "CENTER",
        }
    }

    /// Decode a stored reference code. Unknown codes fall back to `Center`,
    /// which applies no correction.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ProbeReference::External,
            1 => ProbeReference::Internal,
            2 => ProbeReference::Center,
            other => {
                warn!(code = other, "Unknown probe reference code, using CENTER");
                ProbeReference::Center
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct Probe {
    pub id: String,
    pub name: String,
    pub shape: ProbeShape,
    pub thickness_or_diameter_mm: f32,
    pub reference: ProbeReference,
    /// Adjustment applied to the encoder base when this probe is mounted.
    pub range_offset_mm: f32,
    pub active: bool,
    /// Mesh file describing a custom shape, if any.
    pub stl_file: Option<String>,
}

impl Probe {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        shape: ProbeShape,
        thickness_or_diameter_mm: f32,
        reference: ProbeReference,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape,
            thickness_or_diameter_mm,
            reference,
            range_offset_mm: 0.0,
            active: true,
            stl_file: None,
        }
    }

    pub fn with_range_offset(mut self, range_offset_mm: f32) -> Self {
        self.range_offset_mm = range_offset_mm;
        self
    }

    pub fn correction(&self) -> f32 {
        match self.reference {
            ProbeReference::External => -self.thickness_or_diameter_mm,
            ProbeReference::Internal => self.thickness_or_diameter_mm,
            ProbeReference::Center => 0.0,
        }
    }
}

/// Correction contributed by an optional probe; no probe contributes nothing.
pub fn correction(probe: Option<&Probe>) -> f32 {
    probe.map_or(0.0, Probe::correction)
}

/// Range offset contributed by an optional probe.
pub fn range_offset(probe: Option<&Probe>) -> f32 {
    probe.map_or(0.0, |p| p.range_offset_mm)
}

/// Bounded collection of configured probes, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeCatalog {
    probes: Vec<Probe>,
}

impl ProbeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a probe, replacing any existing probe with the same id.
    pub fn upsert(&mut self, probe: Probe) -> Result<(), ProbeError> {
        if probe.id.is_empty() {
            return Err(ProbeError::EmptyId);
        }

        if let Some(existing) = self.probes.iter_mut().find(|p| p.id == probe.id) {
            debug!(id = %probe.id, "Updating probe");
            *existing = probe;
            return Ok(());
        }

        if self.probes.len() >= MAX_PROBES {
            warn!(id = %probe.id, limit = MAX_PROBES, "Probe catalog full");
            return Err(ProbeError::CatalogFull { limit: MAX_PROBES });
        }

        debug!(id = %probe.id, "Adding probe");
        self.probes.push(probe);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Probe> {
        let index = self.probes.iter().position(|p| p.id == id)?;
        Some(self.probes.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.id == id)
    }

    pub fn get_index(&self, index: usize) -> Option<&Probe> {
        self.probes.get(index)
    }

    pub fn active(&self) -> impl Iterator<Item = &Probe> {
        self.probes.iter().filter(|p| p.active)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
