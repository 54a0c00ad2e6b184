//! Functions exported to the firmware UI and the configurator app.

use crate::error::{FormulaError, RoutingError};
use crate::formula;
use crate::measurement::{calculate, MeasurementInput, MeasurementResult};
use crate::models::{DeviceId, DeviceType};
use crate::probe::Probe;
use crate::probe_pair::{self, ProbePair};
use crate::routing::{PackedRouting, RoutingEntry, RoutingTable};
use crate::typology::{FormulaVariable, Variables};

/// Target of one routing entry in its unpacked form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct RouteInfo {
    pub device_type: u8,
    pub device_id: u8,
}

#[uniffi::export]
pub fn validate_formula(formula: String) -> bool {
    formula::validate(&formula)
}

#[uniffi::export]
pub fn evaluate_formula(
    formula: String,
    variables: Vec<FormulaVariable>,
) -> Result<f32, FormulaError> {
    formula::evaluate(&formula, &Variables(&variables))
}

#[uniffi::export]
pub fn compute_measurement(
    raw_mm: f32,
    left: Option<Probe>,
    right: Option<Probe>,
    factor: f32,
    offset_mm: f32,
) -> MeasurementResult {
    let input = MeasurementInput {
        raw_mm,
        left: left.as_ref(),
        right: right.as_ref(),
        factor,
        offset_mm,
    };
    calculate(&input)
}

#[uniffi::export]
pub fn circular_pair_distance(pair: ProbePair, encoder_mm: f32, internal: bool) -> f32 {
    probe_pair::circular_pair_distance(&pair, encoder_mm, internal)
}

/// Pack one entry's target into its persisted byte.
#[uniffi::export]
pub fn encode_routing(route: RouteInfo) -> Result<u8, RoutingError> {
    let device_type = DeviceType::from_nibble(route.device_type)
        .ok_or(RoutingError::InvalidDevice(route.device_type))?;
    let device_id = DeviceId::new(route.device_id)
        .ok_or(RoutingError::InvalidDevice(route.device_id))?;
    Ok(RoutingEntry::unicast(device_type, device_id).pack())
}

/// Unpack a persisted byte; `None` when it does not decode.
#[uniffi::export]
pub fn decode_routing(byte: u8) -> Option<RouteInfo> {
    RoutingEntry::unpack(byte).map(|entry| RouteInfo {
        device_type: entry.target_type.nibble(),
        device_id: entry.target_id.get(),
    })
}

/// Factory routing in persisted form.
#[uniffi::export]
pub fn default_routing() -> PackedRouting {
    RoutingTable::defaults().pack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeReference, ProbeShape};

    #[test]
    fn test_formula_exports() {
        assert!(validate_formula("(L+6)/2".to_string()));
        assert!(!validate_formula("(L+6".to_string()));

        let vars = vec![FormulaVariable::measured("L", 10.0)];
        assert_eq!(evaluate_formula("(L+6)/2".to_string(), vars.clone()), Ok(8.0));
        assert!(matches!(
            evaluate_formula("L+H".to_string(), vars),
            Err(FormulaError::UndeclaredVariable(name)) if name == "H"
        ));
    }

    #[test]
    fn test_compute_measurement_matches_calculator() {
        let left = Probe::new("P", "Piatto", ProbeShape::Flat, 20.0, ProbeReference::External);
        let result = compute_measurement(1200.0, Some(left), None, 1.0, 0.0);
        assert_eq!(result.net_mm, 1180.0);
        assert!(result.derivation.ends_with("1200.00 -20.00[L:EXTERNAL] = 1180.00 mm"));
    }

    #[test]
    fn test_circular_pair_distance_export() {
        let mut pair = ProbePair::default();
        pair.calibrate_zero(5.0, 0);
        assert_eq!(circular_pair_distance(pair.clone(), 25.0, false), 20.0);
        assert_eq!(circular_pair_distance(pair, 25.0, true), 80.0);
    }

    #[test]
    fn test_routing_bytes() {
        let route = RouteInfo {
            device_type: DeviceType::Pc.nibble(),
            device_id: 2,
        };
        assert_eq!(encode_routing(route).unwrap(), 0x23);
        assert_eq!(decode_routing(0x23), Some(route));

        assert!(matches!(
            encode_routing(RouteInfo {
                device_type: 9,
                device_id: 0,
            }),
            Err(RoutingError::InvalidDevice(9))
        ));
        assert!(matches!(
            encode_routing(RouteInfo {
                device_type: 1,
                device_id: 15,
            }),
            Err(RoutingError::InvalidDevice(15))
        ));
        assert_eq!(decode_routing(0x0A), None);
    }

    #[test]
    fn test_default_routing_bytes() {
        let packed = default_routing();
        assert_eq!(packed.routes, vec![0x01, 0x02, 0x01, 0x01, 0x01]);
        assert_eq!(packed.broadcast, vec![false; 5]);
        assert_eq!(packed.saw_mode, 0);
    }
}
