pub mod ble;
pub mod ble_mock;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ffi;
pub mod formula;
pub mod handshake;
pub mod link;
pub mod measurement;
pub mod models;
pub mod probe;
pub mod probe_pair;
pub mod protocol;
pub mod registry;
pub mod routing;
pub mod sender;
pub mod state;
pub mod storage;
pub mod typology;

uniffi::setup_scaffolding!();

pub use ble::{LinkEvent, PeerTransport};
pub use config::MeterConfig;
pub use encoder::{EncoderSettings, PositionCell, PositionSample, PositionTracker, PulseCounter};
pub use error::{
    ConfigError, FormulaError, ProbeError, ProtocolError, RoutingError, StoreError, SurveyError,
    TransportError, TypologyError,
};
pub use link::DeviceLink;
pub use measurement::{calculate, GlassPane, MeasurementInput, MeasurementResult, ModeProfile};
pub use models::{
    ConnHandle, DeviceId, DeviceType, GlassMaterial, MeasureMode, PeerAddress, SawMode,
    MAX_DEVICES,
};
pub use probe::{Probe, ProbeCatalog, ProbeReference, ProbeShape};
pub use probe_pair::{CircularProbe, ProbePair};
pub use registry::{DataOutcome, DeviceRecord, DeviceRegistry};
pub use routing::{PackedRouting, RoutingEntry, RoutingTable};
pub use sender::{Delivery, MeasurementSender, PeerLink};
pub use state::Instrument;
pub use storage::{MemoryStore, SettingsStore};
pub use typology::{ComputedElement, FormulaVariable, Typology};
