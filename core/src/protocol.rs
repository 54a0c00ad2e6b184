//! Outbound JSON messages.
//!
//! Field order and number formatting are fixed by the peer apps, so every
//! message is a `Serialize` struct in wire order and every fractional value
//! is written as a pre-formatted raw number.

use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::ProtocolError;
use crate::measurement::{GlassPane, MeasurementResult};
use crate::models::{DeviceId, DeviceType, MeasureMode, SawMode};
use crate::probe::Probe;

/// Format `value` with a fixed number of decimals as a raw JSON number.
fn fixed(value: f32, decimals: usize, field: &'static str) -> Result<Box<RawValue>, ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::NonFinite { field });
    }
    Ok(RawValue::from_string(format!("{value:.decimals$}"))?)
}

#[derive(Serialize)]
struct Corrections {
    left: Box<RawValue>,
    right: Box<RawValue>,
}

#[derive(Serialize)]
struct TipInfo<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "ref")]
    reference: &'static str,
}

impl<'a> From<&'a Probe> for TipInfo<'a> {
    fn from(probe: &'a Probe) -> Self {
        Self {
            id: &probe.id,
            name: &probe.name,
            reference: probe.reference.as_str(),
        }
    }
}

#[derive(Serialize)]
struct Tips<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    left: Option<TipInfo<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right: Option<TipInfo<'a>>,
}

#[derive(Serialize)]
struct MeasurementMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    misura_mm: Box<RawValue>,
    auto_start: bool,
    mode: &'static str,
    timestamp: i64,
    encoder_raw: Box<RawValue>,
    corrections: Corrections,
    #[serde(skip_serializing_if = "Option::is_none")]
    tips: Option<Tips<'a>>,
}

/// Serialize a measurement for the peer routed to `mode`.
///
/// `timestamp` is Unix seconds. The `tips` object is present only when at
/// least one probe is mounted.
pub fn encode_measurement(
    mode: MeasureMode,
    result: &MeasurementResult,
    left: Option<&Probe>,
    right: Option<&Probe>,
    saw_mode: SawMode,
    timestamp: i64,
) -> Result<Vec<u8>, ProtocolError> {
    let tips = (left.is_some() || right.is_some()).then(|| Tips {
        left: left.map(TipInfo::from),
        right: right.map(TipInfo::from),
    });

    let message = MeasurementMessage {
        kind: mode.type_tag(),
        misura_mm: fixed(result.net_mm, 2, "misura_mm")?,
        auto_start: saw_mode.auto_start(),
        mode: saw_mode.wire_name(),
        timestamp,
        encoder_raw: fixed(result.raw_mm, 2, "encoder_raw")?,
        corrections: Corrections {
            left: fixed(result.correction_left_mm, 2, "corrections.left")?,
            right: fixed(result.correction_right_mm, 2, "corrections.right")?,
        },
        tips,
    };
    Ok(serde_json::to_vec(&message)?)
}

#[derive(Serialize)]
struct FermavetroMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    misura_mm: Box<RawValue>,
    auto_start: bool,
    mode: &'static str,
}

/// Legacy glass-stop message. Older saw firmware expects `mode` to always
/// read `semi_auto`.
pub fn encode_fermavetro(misura_mm: f32, auto_start: bool) -> Result<Vec<u8>, ProtocolError> {
    let message = FermavetroMessage {
        kind: "fermavetro",
        misura_mm: fixed(misura_mm, 2, "misura_mm")?,
        auto_start,
        mode: SawMode::SemiAuto.wire_name(),
    };
    Ok(serde_json::to_vec(&message)?)
}

#[derive(Serialize)]
struct VetroMessage {
    larghezza_raw: Box<RawValue>,
    altezza_raw: Box<RawValue>,
    larghezza_netta: Box<RawValue>,
    altezza_netta: Box<RawValue>,
    materiale: &'static str,
    quantita: u32,
    gioco: Box<RawValue>,
}

/// Legacy glass survey message; `gioco` is the total clearance.
pub fn encode_vetro(pane: &GlassPane) -> Result<Vec<u8>, ProtocolError> {
    let message = VetroMessage {
        larghezza_raw: fixed(pane.width_raw_mm, 2, "larghezza_raw")?,
        altezza_raw: fixed(pane.height_raw_mm, 2, "altezza_raw")?,
        larghezza_netta: fixed(pane.width_net_mm(), 2, "larghezza_netta")?,
        altezza_netta: fixed(pane.height_net_mm(), 2, "altezza_netta")?,
        materiale: pane.material.name(),
        quantita: pane.quantity,
        gioco: fixed(pane.material.total_clearance_mm(), 2, "gioco")?,
    };
    Ok(serde_json::to_vec(&message)?)
}

/// One computed cut from a typology survey.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyCut<'a> {
    pub typology: &'a str,
    pub element: &'a str,
    pub formula: &'a str,
    pub misura_mm: f32,
    pub pieces: u32,
    pub auto_start: bool,
    /// Milliseconds since boot.
    pub timestamp_ms: u64,
}

#[derive(Serialize)]
struct RilievoMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    dest: &'static str,
    tipologia: &'a str,
    elemento: &'a str,
    formula: &'a str,
    misura_mm: Box<RawValue>,
    num_pezzi: u32,
    auto_start: bool,
    timestamp: u64,
}

/// Legacy special-survey message addressed to the saw.
pub fn encode_rilievo(cut: &SurveyCut<'_>) -> Result<Vec<u8>, ProtocolError> {
    let message = RilievoMessage {
        kind: "rilievo_speciale",
        dest: "troncatrice",
        tipologia: cut.typology,
        elemento: cut.element,
        formula: cut.formula,
        misura_mm: fixed(cut.misura_mm, 1, "misura_mm")?,
        num_pezzi: cut.pieces,
        auto_start: cut.auto_start,
        timestamp: cut.timestamp_ms,
    };
    Ok(serde_json::to_vec(&message)?)
}

#[derive(Serialize)]
struct IdentifyAck {
    status: &'static str,
    assigned_id: u8,
    message: String,
}

/// Reply sent to a peer right after it identifies.
pub fn encode_identify_ack(
    device_id: DeviceId,
    device_type: DeviceType,
) -> Result<Vec<u8>, ProtocolError> {
    let ack = IdentifyAck {
        status: "identified",
        assigned_id: device_id.get(),
        message: format!("Device registered as {}", device_type.name()),
    };
    Ok(serde_json::to_vec(&ack)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{calculate, MeasurementInput};
    use crate::models::GlassMaterial;
    use crate::probe::{ProbeReference, ProbeShape};

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    fn flat(id: &str, name: &str, thickness: f32, reference: ProbeReference) -> Probe {
        Probe::new(id, name, ProbeShape::Flat, thickness, reference)
    }

    #[test]
    fn test_measurement_message_field_order() {
        let left = flat("P01", "Piatto 20", 20.0, ProbeReference::External);
        let result = calculate(&MeasurementInput::new(1200.0).with_left(&left));

        let json = encode_measurement(
            MeasureMode::Fermavetro,
            &result,
            Some(&left),
            None,
            SawMode::Automatico,
            1_700_000_000,
        )
        .unwrap();

        assert_eq!(
            text(json),
            r#"{"type":"fermavetro","misura_mm":1180.00,"auto_start":true,"mode":"automatico","timestamp":1700000000,"encoder_raw":1200.00,"corrections":{"left":-20.00,"right":0.00},"tips":{"left":{"id":"P01","name":"Piatto 20","ref":"EXTERNAL"}}}"#
        );
    }

    #[test]
    fn test_measurement_message_without_probes() {
        let result = calculate(&MeasurementInput::new(512.346));
        let json = text(
            encode_measurement(
                MeasureMode::RilieviSpeciali,
                &result,
                None,
                None,
                SawMode::SemiAuto,
                0,
            )
            .unwrap(),
        );
        assert!(json.starts_with(r#"{"type":"rilievi speciali","misura_mm":512.35,"auto_start":false,"mode":"semi_auto""#));
        assert!(!json.contains("tips"));
    }

    #[test]
    fn test_measurement_message_both_tips() {
        let left = flat("A", "Sx", 5.0, ProbeReference::Internal);
        let right = flat("B", "Dx", 0.0, ProbeReference::Center);
        let result = calculate(&MeasurementInput::new(100.0).with_left(&left).with_right(&right));
        let json = text(
            encode_measurement(
                MeasureMode::Calibro,
                &result,
                Some(&left),
                Some(&right),
                SawMode::SemiAuto,
                1,
            )
            .unwrap(),
        );
        assert!(json.ends_with(
            r#""tips":{"left":{"id":"A","name":"Sx","ref":"INTERNAL"},"right":{"id":"B","name":"Dx","ref":"CENTER"}}}"#
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut result = calculate(&MeasurementInput::new(1.0));
        result.net_mm = f32::NAN;
        let err = encode_measurement(MeasureMode::Astine, &result, None, None, SawMode::SemiAuto, 0)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NonFinite { field: "misura_mm" }));

        assert!(matches!(
            encode_fermavetro(f32::INFINITY, false),
            Err(ProtocolError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_fermavetro_message() {
        assert_eq!(
            text(encode_fermavetro(845.5, true).unwrap()),
            r#"{"type":"fermavetro","misura_mm":845.50,"auto_start":true,"mode":"semi_auto"}"#
        );
    }

    #[test]
    fn test_vetro_message() {
        let mut pane = GlassPane::new(1200.0, 800.0, GlassMaterial::Alluminio);
        pane.quantity = 2;
        assert_eq!(
            text(encode_vetro(&pane).unwrap()),
            r#"{"larghezza_raw":1200.00,"altezza_raw":800.00,"larghezza_netta":1188.00,"altezza_netta":788.00,"materiale":"Alluminio","quantita":2,"gioco":12.00}"#
        );
    }

    #[test]
    fn test_rilievo_message() {
        let cut = SurveyCut {
            typology: "Finestra 2 ante",
            element: "Traverso",
            formula: "(L+6)/2",
            misura_mm: 503.4,
            pieces: 4,
            auto_start: false,
            timestamp_ms: 123_456,
        };
        assert_eq!(
            text(encode_rilievo(&cut).unwrap()),
            r#"{"type":"rilievo_speciale","dest":"troncatrice","tipologia":"Finestra 2 ante","elemento":"Traverso","formula":"(L+6)/2","misura_mm":503.4,"num_pezzi":4,"auto_start":false,"timestamp":123456}"#
        );
    }

    #[test]
    fn test_strings_are_escaped() {
        let cut = SurveyCut {
            typology: "Porta \"A\"",
            element: "X",
            formula: "L",
            misura_mm: 1.0,
            pieces: 1,
            auto_start: true,
            timestamp_ms: 0,
        };
        let json = text(encode_rilievo(&cut).unwrap());
        assert!(json.contains(r#""tipologia":"Porta \"A\"""#));
    }

    #[test]
    fn test_identify_ack() {
        let ack = encode_identify_ack(DeviceId::new(1).unwrap(), DeviceType::Blitz).unwrap();
        assert_eq!(
            text(ack),
            r#"{"status":"identified","assigned_id":1,"message":"Device registered as BLITZ"}"#
        );
    }
}
