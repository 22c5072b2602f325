//! Topic schema compilation: fills a declarative topic template set with
//! per-device identity values.
//!
//! Grounded in `packages/mqtt_topics/topics_loader.py`: `TopicConfig` carries
//! qos/retain alongside the template string, placeholders are filled with a
//! best-effort partial substitution (an unfilled placeholder is left intact
//! rather than erroring, except for a hard failure when a *required*
//! identity field is missing), and the `data.point` topic is specifically
//! suppressed unless both optional ids are present.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

fn default_qos() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEntry {
    pub request: TopicConfig,
    pub response: TopicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSection {
    pub get_config: CommandEntry,
    pub set_value_to_point: CommandEntry,
    pub reboot: CommandEntry,
    pub start_monitoring: CommandEntry,
    pub stop_monitoring: CommandEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSection {
    pub heartbeat: TopicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    pub point: Option<TopicConfig>,
    pub point_bulk: Option<TopicConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topics {
    pub command: CommandSection,
    pub status: StatusSection,
    pub data: DataSection,
}

/// Identity values used to fill topic placeholders. Required fields cause a
/// hard error if missing; the two point-scoped ids are optional and, when
/// absent, suppress `data.point` entirely rather than publishing a
/// malformed topic string.
pub struct TopicIdentity<'a> {
    pub organization_id: &'a str,
    pub site_id: &'a str,
    pub iot_device_id: &'a str,
    pub controller_device_id: Option<&'a str>,
    pub iot_device_point_id: Option<&'a str>,
}

fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let key = &template[i + 1..i + end];
                match values.get(key) {
                    Some(v) => out.push_str(v),
                    // unresolved placeholders are left intact, mirroring the
                    // Default(dict) __missing__ behavior in the original.
                    None => out.push_str(&template[i..i + end + 1]),
                }
                i += end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn fill_config(config: &TopicConfig, values: &HashMap<&str, String>) -> TopicConfig {
    TopicConfig {
        topic: fill(&config.topic, values),
        qos: config.qos,
        retain: config.retain,
    }
}

/// Fills every topic template in `schema` with `identity`'s values.
/// Fails with `ConfigError::MissingPlaceholder` if a required identity
/// field is empty; `data.point` is forced to `None` unless both
/// `controller_device_id` and `iot_device_point_id` are supplied.
pub fn build_mqtt_topic_dict(
    schema: &Topics,
    identity: &TopicIdentity,
) -> Result<Topics, ConfigError> {
    for (name, value) in [
        ("organization_id", identity.organization_id),
        ("site_id", identity.site_id),
        ("iot_device_id", identity.iot_device_id),
    ] {
        if value.is_empty() {
            return Err(ConfigError::MissingPlaceholder(name.to_string()));
        }
    }

    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert("organization_id", identity.organization_id.to_string());
    values.insert("site_id", identity.site_id.to_string());
    values.insert("iot_device_id", identity.iot_device_id.to_string());
    if let Some(v) = identity.controller_device_id {
        values.insert("controller_device_id", v.to_string());
    }
    if let Some(v) = identity.iot_device_point_id {
        values.insert("iot_device_point_id", v.to_string());
    }

    let command = CommandSection {
        get_config: CommandEntry {
            request: fill_config(&schema.command.get_config.request, &values),
            response: fill_config(&schema.command.get_config.response, &values),
        },
        set_value_to_point: CommandEntry {
            request: fill_config(&schema.command.set_value_to_point.request, &values),
            response: fill_config(&schema.command.set_value_to_point.response, &values),
        },
        reboot: CommandEntry {
            request: fill_config(&schema.command.reboot.request, &values),
            response: fill_config(&schema.command.reboot.response, &values),
        },
        start_monitoring: CommandEntry {
            request: fill_config(&schema.command.start_monitoring.request, &values),
            response: fill_config(&schema.command.start_monitoring.response, &values),
        },
        stop_monitoring: CommandEntry {
            request: fill_config(&schema.command.stop_monitoring.request, &values),
            response: fill_config(&schema.command.stop_monitoring.response, &values),
        },
    };

    let status = StatusSection {
        heartbeat: fill_config(&schema.status.heartbeat, &values),
    };

    let has_point_ids =
        identity.controller_device_id.is_some() && identity.iot_device_point_id.is_some();
    let data = DataSection {
        point: if has_point_ids {
            schema.data.point.as_ref().map(|c| fill_config(c, &values))
        } else {
            None
        },
        point_bulk: schema.data.point_bulk.as_ref().map(|c| fill_config(c, &values)),
    };

    Ok(Topics { command, status, data })
}

/// Default topic schema, shipped as the fallback when no override file is
/// configured (mirrors `topics.json` in the original package).
pub fn default_schema() -> Topics {
    let t = |topic: &str, qos: u8, retain: bool| TopicConfig {
        topic: topic.to_string(),
        qos,
        retain,
    };
    Topics {
        command: CommandSection {
            get_config: CommandEntry {
                request: t("{organization_id}/{site_id}/{iot_device_id}/command/get_config/request", 1, false),
                response: t("{organization_id}/{site_id}/{iot_device_id}/command/get_config/response", 1, false),
            },
            set_value_to_point: CommandEntry {
                request: t("{organization_id}/{site_id}/{iot_device_id}/command/set_value_to_point/request", 1, false),
                response: t("{organization_id}/{site_id}/{iot_device_id}/command/set_value_to_point/response", 1, false),
            },
            reboot: CommandEntry {
                request: t("{organization_id}/{site_id}/{iot_device_id}/command/reboot/request", 1, false),
                response: t("{organization_id}/{site_id}/{iot_device_id}/command/reboot/response", 1, false),
            },
            start_monitoring: CommandEntry {
                request: t("{organization_id}/{site_id}/{iot_device_id}/command/start_monitoring/request", 1, false),
                response: t("{organization_id}/{site_id}/{iot_device_id}/command/start_monitoring/response", 1, false),
            },
            stop_monitoring: CommandEntry {
                request: t("{organization_id}/{site_id}/{iot_device_id}/command/stop_monitoring/request", 1, false),
                response: t("{organization_id}/{site_id}/{iot_device_id}/command/stop_monitoring/response", 1, false),
            },
        },
        status: StatusSection {
            heartbeat: t("{organization_id}/{site_id}/{iot_device_id}/status/heartbeat", 0, true),
        },
        data: DataSection {
            point: Some(t(
                "{organization_id}/{site_id}/{iot_device_id}/data/point/{controller_device_id}/{iot_device_point_id}",
                0,
                false,
            )),
            point_bulk: Some(t("{organization_id}/{site_id}/{iot_device_id}/data/point_bulk", 0, false)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_required_identity_fields() {
        let schema = default_schema();
        let identity = TopicIdentity {
            organization_id: "org1",
            site_id: "site1",
            iot_device_id: "dev1",
            controller_device_id: None,
            iot_device_point_id: None,
        };
        let topics = build_mqtt_topic_dict(&schema, &identity).unwrap();
        assert_eq!(
            topics.status.heartbeat.topic,
            "org1/site1/dev1/status/heartbeat"
        );
    }

    #[test]
    fn suppresses_point_topic_without_both_optional_ids() {
        let schema = default_schema();
        let identity = TopicIdentity {
            organization_id: "org1",
            site_id: "site1",
            iot_device_id: "dev1",
            controller_device_id: Some("ctrl1"),
            iot_device_point_id: None,
        };
        let topics = build_mqtt_topic_dict(&schema, &identity).unwrap();
        assert!(topics.data.point.is_none());
    }

    #[test]
    fn fills_point_topic_when_both_optional_ids_present() {
        let schema = default_schema();
        let identity = TopicIdentity {
            organization_id: "org1",
            site_id: "site1",
            iot_device_id: "dev1",
            controller_device_id: Some("ctrl1"),
            iot_device_point_id: Some("point1"),
        };
        let topics = build_mqtt_topic_dict(&schema, &identity).unwrap();
        assert_eq!(
            topics.data.point.unwrap().topic,
            "org1/site1/dev1/data/point/ctrl1/point1"
        );
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let schema = default_schema();
        let identity = TopicIdentity {
            organization_id: "",
            site_id: "site1",
            iot_device_id: "dev1",
            controller_device_id: None,
            iot_device_point_id: None,
        };
        assert!(build_mqtt_topic_dict(&schema, &identity).is_err());
    }
}
