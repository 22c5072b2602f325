//! Canonical BACnet object-type vocabulary and the point-request/response
//! shapes used by the reader pool. The underlying `bacnet-rs` transport
//! library has its own object-type vocabulary (hyphenated, e.g.
//! `analog-value`); wrapper.rs is the only place that translates between it
//! and this canonical camelCase form (spec §4.1 "BACnet library quirks").

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BacnetObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl BacnetObjectType {
    /// Canonical camelCase form used throughout the agent and in MQTT payloads.
    pub fn as_canonical(&self) -> &'static str {
        match self {
            BacnetObjectType::AnalogInput => "analogInput",
            BacnetObjectType::AnalogOutput => "analogOutput",
            BacnetObjectType::AnalogValue => "analogValue",
            BacnetObjectType::BinaryInput => "binaryInput",
            BacnetObjectType::BinaryOutput => "binaryOutput",
            BacnetObjectType::BinaryValue => "binaryValue",
            BacnetObjectType::MultiStateInput => "multiStateInput",
            BacnetObjectType::MultiStateOutput => "multiStateOutput",
            BacnetObjectType::MultiStateValue => "multiStateValue",
        }
    }

    /// The hyphenated vocabulary the underlying BACnet library speaks
    /// (mirrors `POINT_TYPES` keys in the original `bacnet_types.py`).
    pub fn from_wire(wire: &str) -> Option<Self> {
        Some(match wire {
            "analog-input" => BacnetObjectType::AnalogInput,
            "analog-output" => BacnetObjectType::AnalogOutput,
            "analog-value" => BacnetObjectType::AnalogValue,
            "binary-input" => BacnetObjectType::BinaryInput,
            "binary-output" => BacnetObjectType::BinaryOutput,
            "binary-value" => BacnetObjectType::BinaryValue,
            "multi-state-input" => BacnetObjectType::MultiStateInput,
            "multi-state-output" => BacnetObjectType::MultiStateOutput,
            "multi-state-value" => BacnetObjectType::MultiStateValue,
            _ => return None,
        })
    }

    pub fn from_canonical(s: &str) -> Option<Self> {
        Some(match s {
            "analogInput" => BacnetObjectType::AnalogInput,
            "analogOutput" => BacnetObjectType::AnalogOutput,
            "analogValue" => BacnetObjectType::AnalogValue,
            "binaryInput" => BacnetObjectType::BinaryInput,
            "binaryOutput" => BacnetObjectType::BinaryOutput,
            "binaryValue" => BacnetObjectType::BinaryValue,
            "multiStateInput" => BacnetObjectType::MultiStateInput,
            "multiStateOutput" => BacnetObjectType::MultiStateOutput,
            "multiStateValue" => BacnetObjectType::MultiStateValue,
            _ => return None,
        })
    }
}

impl fmt::Display for BacnetObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_canonical())
    }
}

/// One object's read request within a bulk `read_multiple_points` call.
#[derive(Debug, Clone)]
pub struct PointRequest {
    pub object_type: BacnetObjectType,
    pub object_id: u32,
    pub properties: Vec<String>,
}

impl PointRequest {
    pub fn object_key(&self) -> String {
        format!("{}:{}", self.object_type, self.object_id)
    }
}

/// The full set of health/config properties the monitor considers, in the
/// same order as `monitorable_properties` in the original `monitor.py`.
/// `available_device_properties` always includes `presentValue` and adds any
/// of these that are present AND non-null in the point's descriptor.
pub const MONITORABLE_PROPERTIES: &[&str] = &[
    "statusFlags",
    "eventState",
    "outOfService",
    "reliability",
    "minPresValue",
    "maxPresValue",
    "highLimit",
    "lowLimit",
    "resolution",
    "priorityArray",
    "relinquishDefault",
    "covIncrement",
    "timeDelay",
    "timeDelayNormal",
    "notificationClass",
    "notifyType",
    "deadband",
    "limitEnable",
    "eventEnable",
    "ackedTransitions",
    "eventTimeStamps",
    "eventMessageTexts",
    "eventMessageTextsConfig",
    "eventDetectionEnable",
    "eventAlgorithmInhibitRef",
    "eventAlgorithmInhibit",
    "reliabilityEvaluationInhibit",
];

/// Determine which properties to request for an object, given the
/// "available properties" map from its persisted descriptor (spec §4.2).
/// Always includes `presentValue`; adds any monitorable property that is
/// present and non-null in `object_properties`.
pub fn available_device_properties(
    object_properties: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Vec<String> {
    let mut available = vec!["presentValue".to_string()];

    let Some(props) = object_properties else {
        return available;
    };

    for prop in MONITORABLE_PROPERTIES {
        if let Some(value) = props.get(*prop) {
            if !value.is_null() {
                available.push((*prop).to_string());
            }
        }
    }
    available
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presents_value_only_when_no_properties() {
        let got = available_device_properties(None);
        assert_eq!(got, vec!["presentValue".to_string()]);
    }

    #[test]
    fn skips_null_properties() {
        let props = json!({
            "statusFlags": null,
            "eventState": "normal",
        });
        let map = props.as_object().unwrap();
        let got = available_device_properties(Some(map));
        assert_eq!(got, vec!["presentValue".to_string(), "eventState".to_string()]);
    }

    #[test]
    fn roundtrips_canonical_and_wire_forms() {
        assert_eq!(
            BacnetObjectType::from_wire("analog-value").unwrap(),
            BacnetObjectType::AnalogValue
        );
        assert_eq!(BacnetObjectType::AnalogValue.as_canonical(), "analogValue");
        assert_eq!(
            BacnetObjectType::from_canonical("analogValue").unwrap(),
            BacnetObjectType::AnalogValue
        );
    }
}
