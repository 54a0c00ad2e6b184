use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Number of peer slots the instrument keeps.
pub const MAX_DEVICES: usize = 3;

/// Slot index of a paired peer, always below [`MAX_DEVICES`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u8);

impl DeviceId {
    pub fn new(raw: u8) -> Option<Self> {
        (usize::from(raw) < MAX_DEVICES).then_some(DeviceId(raw))
    }

    /// Id of slot `index`, which must be below [`MAX_DEVICES`].
    pub(crate) fn slot(index: usize) -> Self {
        debug_assert!(index < MAX_DEVICES);
        DeviceId(index as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn all() -> impl Iterator<Item = DeviceId> {
        (0..MAX_DEVICES as u8).map(DeviceId)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 48-bit radio address of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Role a peer announced during identification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    None,
    Blitz,
    Smartphone,
    Pc,
    Custom,
}

impl DeviceType {
    pub const ALL: [DeviceType; 5] = [
        DeviceType::None,
        DeviceType::Blitz,
        DeviceType::Smartphone,
        DeviceType::Pc,
        DeviceType::Custom,
    ];

    /// Display name used in acknowledgements and logs.
    pub fn name(self) -> &'static str {
        match self {
            DeviceType::None => "None",
            DeviceType::Blitz => "BLITZ",
            DeviceType::Smartphone => "Smartphone",
            DeviceType::Pc => "PC",
            DeviceType::Custom => "Custom",
        }
    }

    /// Map a handshake `device_type` token. Unknown or missing tokens become `Custom`.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("blitz") => DeviceType::Blitz,
            Some("smartphone") => DeviceType::Smartphone,
            Some("pc") => DeviceType::Pc,
            _ => DeviceType::Custom,
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            DeviceType::None => 0,
            DeviceType::Blitz => 1,
            DeviceType::Smartphone => 2,
            DeviceType::Pc => 3,
            DeviceType::Custom => 4,
        }
    }

    pub fn from_nibble(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.nibble() == value)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operating mode of the instrument; each one has its own routing entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeasureMode {
    Fermavetro,
    Vetri,
    Astine,
    Calibro,
    RilieviSpeciali,
}

impl MeasureMode {
    pub const COUNT: usize = 5;

    pub const ALL: [MeasureMode; Self::COUNT] = [
        MeasureMode::Fermavetro,
        MeasureMode::Vetri,
        MeasureMode::Astine,
        MeasureMode::Calibro,
        MeasureMode::RilieviSpeciali,
    ];

    pub fn index(self) -> usize {
        match self {
            MeasureMode::Fermavetro => 0,
            MeasureMode::Vetri => 1,
            MeasureMode::Astine => 2,
            MeasureMode::Calibro => 3,
            MeasureMode::RilieviSpeciali => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MeasureMode::Fermavetro => "Fermavetro",
            MeasureMode::Vetri => "Vetri",
            MeasureMode::Astine => "Astine",
            MeasureMode::Calibro => "Calibro",
            MeasureMode::RilieviSpeciali => "Rilievi Speciali",
        }
    }

    /// Value of the `type` field in outbound measurement messages.
    pub fn type_tag(self) -> &'static str {
        match self {
            MeasureMode::Fermavetro => "fermavetro",
            MeasureMode::Vetri => "vetri",
            MeasureMode::Astine => "astine",
            MeasureMode::Calibro => "calibro",
            MeasureMode::RilieviSpeciali => "rilievi speciali",
        }
    }

    /// Settings key holding this mode's packed routing byte.
    pub fn storage_key(self) -> &'static str {
        match self {
            MeasureMode::Fermavetro => "route_fermavetro",
            MeasureMode::Vetri => "route_vetri",
            MeasureMode::Astine => "route_astine",
            MeasureMode::Calibro => "route_calibro",
            MeasureMode::RilieviSpeciali => "route_rilievi",
        }
    }
}

impl TryFrom<u8> for MeasureMode {
    type Error = RoutingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(RoutingError::InvalidMode(value))
    }
}

impl fmt::Display for MeasureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the saw controller treats an incoming measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SawMode {
    /// Operator confirms the cut on the saw.
    #[default]
    SemiAuto,
    /// Saw starts on receipt.
    Automatico,
}

impl SawMode {
    pub fn wire_name(self) -> &'static str {
        match self {
            SawMode::SemiAuto => "semi_auto",
            SawMode::Automatico => "automatico",
        }
    }

    pub fn auto_start(self) -> bool {
        matches!(self, SawMode::Automatico)
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SawMode::SemiAuto => 0,
            SawMode::Automatico => 1,
        }
    }

    /// Decode a stored byte; anything but `1` is semi-automatic.
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => SawMode::Automatico,
            _ => SawMode::SemiAuto,
        }
    }
}

/// Frame material of a glazing survey, which fixes the clearance per side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GlassMaterial {
    #[default]
    Alluminio,
    Legno,
    Pvc,
    Custom,
}

impl GlassMaterial {
    pub fn name(self) -> &'static str {
        match self {
            GlassMaterial::Alluminio => "Alluminio",
            GlassMaterial::Legno => "Legno",
            GlassMaterial::Pvc => "PVC",
            GlassMaterial::Custom => "Custom",
        }
    }

    pub fn clearance_per_side_mm(self) -> f32 {
        match self {
            GlassMaterial::Alluminio => 6.0,
            GlassMaterial::Legno => 3.0,
            GlassMaterial::Pvc => 5.0,
            GlassMaterial::Custom => 0.0,
        }
    }

    pub fn total_clearance_mm(self) -> f32 {
        self.clearance_per_side_mm() * 2.0
    }

    /// Glass size for a raw opening measurement.
    pub fn net_mm(self, raw_mm: f32) -> f32 {
        raw_mm - self.total_clearance_mm()
    }
}
