//! Application state shared by the UI task.
//!
//! The encoder task publishes into the [`PositionCell`]; the radio task
//! feeds the link behind the sender. Everything else here is owned by the
//! application task and reached through `&mut self`.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::MeterConfig;
use crate::encoder::PositionCell;
use crate::error::{RoutingError, StoreError, SurveyError};
use crate::measurement::{calculate, GlassPane, MeasurementResult, ModeProfile};
use crate::models::{MeasureMode, SawMode};
use crate::probe::ProbeCatalog;
use crate::probe_pair::{circular_pair_distance, ProbePair};
use crate::protocol::{self, SurveyCut};
use crate::routing::{RoutingTable, SAW_MODE_KEY};
use crate::sender::{Delivery, MeasurementSender, PeerLink};
use crate::storage::SettingsStore;
use crate::typology::Typology;

/// Load the persisted routing table. The configured saw mode applies until
/// one has been saved.
pub fn initial_routing<S: SettingsStore + ?Sized>(
    store: &S,
    config: &MeterConfig,
) -> Result<RoutingTable, StoreError> {
    let mut table = RoutingTable::load(store)?;
    if store.get_u8(SAW_MODE_KEY)?.is_none() {
        table.set_saw_mode(config.routing.saw_mode);
    }
    Ok(table)
}

pub struct Instrument<L> {
    position: Arc<PositionCell>,
    catalog: ProbeCatalog,
    profiles: [ModeProfile; MeasureMode::COUNT],
    probe_pair: ProbePair,
    sender: MeasurementSender<L>,
    started_ms: i64,
}

impl<L: PeerLink> Instrument<L> {
    pub fn new(config: &MeterConfig, link: L, routing: RoutingTable) -> Self {
        Self {
            position: Arc::new(PositionCell::new()),
            catalog: ProbeCatalog::new(),
            profiles: MeasureMode::ALL.map(ModeProfile::new),
            probe_pair: ProbePair::with_diameter(config.probes.default_diameter_mm),
            sender: MeasurementSender::new(link, Arc::new(RwLock::new(routing))),
            started_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Handle for the encoder task to publish into.
    pub fn position_cell(&self) -> Arc<PositionCell> {
        Arc::clone(&self.position)
    }

    /// Latest published position, in millimetres.
    pub fn position_mm(&self) -> f32 {
        self.position.position_mm() as f32
    }

    pub fn catalog(&self) -> &ProbeCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ProbeCatalog {
        &mut self.catalog
    }

    pub fn profile(&self, mode: MeasureMode) -> &ModeProfile {
        &self.profiles[mode.index()]
    }

    pub fn profile_mut(&mut self, mode: MeasureMode) -> &mut ModeProfile {
        &mut self.profiles[mode.index()]
    }

    pub fn probe_pair(&self) -> &ProbePair {
        &self.probe_pair
    }

    pub fn probe_pair_mut(&mut self) -> &mut ProbePair {
        &mut self.probe_pair
    }

    pub fn routing(&self) -> &Arc<RwLock<RoutingTable>> {
        self.sender.routing()
    }

    pub fn sender(&self) -> &MeasurementSender<L> {
        &self.sender
    }

    fn saw_mode(&self) -> SawMode {
        self.routing()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .saw_mode()
    }

    /// Net measurement for `mode` at the current position.
    pub fn measure(&self, mode: MeasureMode) -> MeasurementResult {
        let input = self.profile(mode).resolve(&self.catalog, self.position_mm());
        calculate(&input)
    }

    /// Button press: read the position, apply the mode's probes and send
    /// the result to the routed peer.
    pub fn capture_and_send(
        &self,
        mode: MeasureMode,
    ) -> Result<(MeasurementResult, Delivery), RoutingError> {
        let profile = self.profile(mode);
        if !profile.enabled {
            warn!(%mode, "Measuring in a disabled mode");
        }
        let input = profile.resolve(&self.catalog, self.position_mm());
        let result = calculate(&input);
        info!(%mode, derivation = %result.derivation, "Measurement captured");

        let delivery = self.sender.send(mode, &result, input.left, input.right)?;
        Ok((result, delivery))
    }

    /// Zero the circular pair at the current position.
    pub fn calibrate_probe_pair(&mut self) {
        let reading = self.position_mm();
        self.probe_pair.calibrate_zero_now(reading);
    }

    /// Caliper reading from the circular pair at the current position.
    pub fn caliper_distance(&mut self, internal: bool) -> f32 {
        let distance = circular_pair_distance(&self.probe_pair, self.position_mm(), internal);
        self.probe_pair.increment_usage();
        distance
    }

    pub fn send_fermavetro(&self, misura_mm: f32) -> Result<Delivery, RoutingError> {
        let payload = protocol::encode_fermavetro(misura_mm, self.saw_mode().auto_start())?;
        self.sender.route(MeasureMode::Fermavetro, &payload)
    }

    pub fn send_vetro(&self, pane: &GlassPane) -> Result<Delivery, RoutingError> {
        let payload = protocol::encode_vetro(pane)?;
        self.sender.route(MeasureMode::Vetri, &payload)
    }

    /// Send every computed, unsent element of `typology` with a non-zero
    /// quantity and mark it sent. Stops at the first delivery error.
    pub fn send_survey(&self, typology: &mut Typology) -> Result<usize, SurveyError> {
        let auto_start = self.saw_mode().auto_start();
        let timestamp_ms =
            u64::try_from(Utc::now().timestamp_millis() - self.started_ms).unwrap_or(0);

        let ready: Vec<usize> = typology.pending_elements().map(|(i, _)| i).collect();

        let mut sent = 0;
        for index in ready {
            let element = &typology.elements()[index];
            let Some(misura_mm) = element.result else {
                continue;
            };
            let cut = SurveyCut {
                typology: typology.name(),
                element: &element.name,
                formula: &element.formula,
                misura_mm,
                pieces: element.quantity,
                auto_start,
                timestamp_ms,
            };
            let payload = protocol::encode_rilievo(&cut).map_err(RoutingError::from)?;
            self.sender.route(MeasureMode::RilieviSpeciali, &payload)?;
            typology.mark_sent(index)?;
            sent += 1;
        }
        info!(typology = typology.name(), sent, "Survey sent");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble_mock::MockTransport;
    use crate::encoder::PositionSample;
    use crate::link::DeviceLink;
    use crate::models::{ConnHandle, DeviceType, GlassMaterial, PeerAddress};
    use crate::probe::{Probe, ProbeReference, ProbeShape};
    use crate::storage::MemoryStore;
    use crate::typology::FormulaVariable;

    type TestLink = Arc<DeviceLink<Arc<MockTransport>, MemoryStore>>;

    fn setup() -> (Instrument<TestLink>, TestLink) {
        let link = Arc::new(DeviceLink::new(
            Arc::new(MockTransport::new()),
            MemoryStore::new(),
        ));
        let instrument = Instrument::new(
            &MeterConfig::default(),
            Arc::clone(&link),
            RoutingTable::defaults(),
        );
        (instrument, link)
    }

    fn publish(instrument: &Instrument<TestLink>, position_mm: f64) {
        instrument.position_cell().publish(&PositionSample {
            count: (position_mm / 0.005) as i64,
            position_mm,
            stationary: true,
        });
    }

    fn connect_blitz(link: &TestLink) {
        link.on_connect(ConnHandle(1), PeerAddress([1, 2, 3, 4, 5, 6]));
        link.on_data(
            ConnHandle(1),
            br#"{"command":"identify","device_type":"blitz"}"#,
        );
        link.transport().clear();
    }

    #[test]
    fn test_capture_and_send_end_to_end() {
        let (mut instrument, link) = setup();
        connect_blitz(&link);

        instrument
            .catalog_mut()
            .upsert(Probe::new("P20", "Piatto 20", ProbeShape::Flat, 20.0, ProbeReference::External))
            .unwrap();
        instrument.profile_mut(MeasureMode::Fermavetro).left_probe_id = Some("P20".to_string());
        publish(&instrument, 1200.0);

        let (result, delivery) = instrument
            .capture_and_send(MeasureMode::Fermavetro)
            .unwrap();
        assert!((result.net_mm - 1180.0).abs() < 1e-3);
        assert!(result.derivation.contains("1200.00 -20.00[L:EXTERNAL] = 1180.00 mm"));
        assert!(matches!(delivery, Delivery::Unicast(id) if id.get() == 0));

        let sent = link.transport().sent_to(ConnHandle(1));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with(r#"{"type":"fermavetro","misura_mm":1180.00,"auto_start":false"#));
        assert!(sent[0].contains(r#""tips":{"left":{"id":"P20","name":"Piatto 20","ref":"EXTERNAL"}}"#));
    }

    #[test]
    fn test_capture_without_peer() {
        let (instrument, _link) = setup();
        publish(&instrument, 10.0);
        assert!(matches!(
            instrument.capture_and_send(MeasureMode::Astine),
            Err(RoutingError::TargetNotFound(0))
        ));
    }

    #[test]
    fn test_legacy_messages_follow_routing() {
        let (instrument, link) = setup();
        connect_blitz(&link);
        instrument
            .routing()
            .write()
            .unwrap()
            .set_saw_mode(SawMode::Automatico);

        instrument.send_fermavetro(845.5).unwrap();
        instrument
            .send_vetro(&GlassPane::new(1000.0, 500.0, GlassMaterial::Legno))
            .unwrap();

        let sent = link.transport().sent_to(ConnHandle(1));
        assert_eq!(
            sent[0],
            r#"{"type":"fermavetro","misura_mm":845.50,"auto_start":true,"mode":"semi_auto"}"#
        );
        assert!(sent[1].contains(r#""larghezza_netta":994.00"#));
    }

    #[test]
    fn test_send_survey_marks_elements() {
        let (instrument, link) = setup();
        connect_blitz(&link);

        let mut typology = Typology::new("Finestra");
        typology.add_variable(FormulaVariable::new("L", "Larghezza")).unwrap();
        typology.add_element("Traverso", "(L+6)/2", 2).unwrap();
        typology.add_element("Montante", "L", 0).unwrap();
        typology.capture_next(994.0);
        typology.compute_elements().unwrap();

        assert_eq!(instrument.send_survey(&mut typology).unwrap(), 1);
        assert!(typology.elements()[0].sent);
        assert!(!typology.elements()[1].sent);

        let sent = link.transport().sent_to(ConnHandle(1));
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(r#""elemento":"Traverso","formula":"(L+6)/2","misura_mm":500.0,"num_pezzi":2"#));

        // Nothing left to send
        assert_eq!(instrument.send_survey(&mut typology).unwrap(), 0);
    }

    #[test]
    fn test_caliper_distance() {
        let (mut instrument, _link) = setup();
        publish(&instrument, 12.0);
        instrument.calibrate_probe_pair();
        assert!(instrument.probe_pair().calibrated);

        publish(&instrument, 52.0);
        assert!((instrument.caliper_distance(false) - 40.0).abs() < 1e-4);
        assert!((instrument.caliper_distance(true) - 100.0).abs() < 1e-4);
        assert_eq!(instrument.probe_pair().fixed_left.usage_count, 2);
    }

    #[test]
    fn test_initial_routing_uses_configured_saw_mode() {
        let mut config = MeterConfig::default();
        config.routing.saw_mode = SawMode::Automatico;

        let mut store = MemoryStore::new();
        assert_eq!(
            initial_routing(&store, &config).unwrap().saw_mode(),
            SawMode::Automatico
        );

        store.set_u8(SAW_MODE_KEY, 0).unwrap();
        assert_eq!(
            initial_routing(&store, &config).unwrap().saw_mode(),
            SawMode::SemiAuto
        );
    }

    #[test]
    fn test_defaults_from_config() {
        let mut config = MeterConfig::default();
        config.probes.default_diameter_mm = 25.0;
        let link = Arc::new(DeviceLink::new(Arc::new(MockTransport::new()), MemoryStore::new()));
        let instrument = Instrument::new(&config, link, RoutingTable::defaults());
        assert_eq!(instrument.probe_pair().moving_right.diameter_mm, 25.0);
        assert_eq!(
            instrument.routing().read().unwrap().get(MeasureMode::Vetri).target_type,
            DeviceType::Smartphone
        );
    }
}
