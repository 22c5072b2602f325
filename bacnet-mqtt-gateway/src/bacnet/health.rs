//! Conversion of raw BACnet property values into the stable JSON shapes
//! the store and MQTT payloads expect.
//!
//! Grounded in `convert_bacnet_health_value` in `bacnet_wrapper.py`: BACnet
//! enumerations come back from the transport as debug-ish class names or
//! raw integers and need to be coerced into the values the rest of the
//! agent (and the cloud platform) actually expects.

use serde_json::Value;

/// Converts a single property's raw value for the properties that need
/// special handling; everything else passes through unchanged.
pub fn convert_bacnet_health_value(prop_name: &str, value: Value) -> Value {
    match prop_name {
        "eventState" | "reliability" => stringify_enum(value),
        "outOfService" => to_bool(value),
        "statusFlags" => value,
        _ => value,
    }
}

fn stringify_enum(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s),
        Value::Number(n) => Value::String(n.to_string()),
        other => Value::String(other.to_string()),
    }
}

fn to_bool(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(b),
        Value::Number(n) => Value::Bool(n.as_i64().map(|v| v != 0).unwrap_or(false)),
        Value::String(s) => Value::Bool(s.eq_ignore_ascii_case("true") || s == "1"),
        other => other,
    }
}

/// Splits the BACnet status-flags bitstring representation
/// (`"in-alarm;fault;overridden;out-of-service"` or similar) into a list of
/// active flag names. Mirrors the uploader's status_flags handling in
/// `_serialize_point`, which itself consumes what this function produces.
pub fn status_flags_to_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_state_number_becomes_string() {
        let got = convert_bacnet_health_value("eventState", json!(0));
        assert_eq!(got, json!("0"));
    }

    #[test]
    fn out_of_service_number_becomes_bool() {
        assert_eq!(convert_bacnet_health_value("outOfService", json!(1)), json!(true));
        assert_eq!(convert_bacnet_health_value("outOfService", json!(0)), json!(false));
    }

    #[test]
    fn status_flags_pass_through_untouched() {
        let got = convert_bacnet_health_value("statusFlags", json!("in-alarm;fault"));
        assert_eq!(got, json!("in-alarm;fault"));
    }

    #[test]
    fn splits_status_flags_string() {
        let got = status_flags_to_list("in-alarm;fault;;overridden");
        assert_eq!(got, vec!["in-alarm", "fault", "overridden"]);
    }

    #[test]
    fn unrecognized_property_passes_through() {
        let got = convert_bacnet_health_value("presentValue", json!(72.5));
        assert_eq!(got, json!(72.5));
    }
}
