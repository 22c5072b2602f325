use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// One entry in the reader list (spec §3 "Reader configuration").
/// Inactive entries are filtered out before pool construction; duplicate
/// active `(ip, port)` pairs are a hard configuration error.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BacnetReaderConfig {
    pub id: String,
    pub ip_address: IpAddr,
    pub subnet_mask: u8,
    pub bacnet_device_id: u32,
    pub port: u16,
    pub bbmd_enabled: bool,
    pub bbmd_server_ip: Option<IpAddr>,
    pub is_active: bool,
}

/// Checks the ordered reader list for duplicate active `(ip, port)` pairs.
/// The first entry wins; later duplicates are rejected outright rather than
/// silently dropped (spec §3).
pub fn active_readers(
    readers: &[BacnetReaderConfig],
) -> Result<Vec<BacnetReaderConfig>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    let mut active = Vec::new();
    for reader in readers.iter().filter(|r| r.is_active) {
        let key = (reader.ip_address, reader.port);
        if !seen.insert(key) {
            return Err(ConfigError::DuplicateReaderEndpoint {
                ip: reader.ip_address.to_string(),
                port: reader.port,
            });
        }
        active.push(reader.clone());
    }
    Ok(active)
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls_enabled: bool,
    pub ca_file: Option<String>,
    pub keepalive_secs: u64,
    pub reconnect_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 8883,
            username: None,
            password: None,
            tls_enabled: false,
            ca_file: None,
            keepalive_secs: 30,
            reconnect_delay_secs: 5,
        }
    }
}

/// Device identity: a single agent instance speaks for exactly one
/// (organization, site, device) triple (spec §1).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceIdentity {
    pub organization_id: String,
    pub site_id: String,
    pub iot_device_id: String,
    pub controller_device_id: Option<String>,
    pub iot_device_point_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Credentials(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Credentials(e.to_string()))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    pub identity: DeviceIdentity,
    pub mqtt: MqttConfig,
    pub readers: Vec<BacnetReaderConfig>,
    #[serde(default)]
    pub controllers: Vec<crate::monitor::ControllerConfig>,
    pub database_path: String,
    pub monitor_interval_secs: u64,
    pub upload_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity {
                organization_id: "org-default".to_string(),
                site_id: "site-default".to_string(),
                iot_device_id: "device-default".to_string(),
                controller_device_id: None,
                iot_device_point_id: None,
            },
            mqtt: MqttConfig::default(),
            readers: vec![BacnetReaderConfig {
                id: "reader-1".to_string(),
                ip_address: "0.0.0.0".parse().unwrap(),
                subnet_mask: 24,
                bacnet_device_id: 12345,
                port: 47808,
                bbmd_enabled: false,
                bbmd_server_ip: None,
                is_active: true,
            }],
            controllers: Vec::new(),
            database_path: "bacnet_gateway.db".to_string(),
            monitor_interval_secs: 60,
            upload_interval_secs: 30,
            cleanup_interval_secs: 300,
            heartbeat_interval_secs: 30,
        }
    }
}

impl GatewayConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self).map_err(|e| ConfigError::Load(e.to_string()))?;
        fs::write(path, yaml).map_err(|e| ConfigError::Load(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(id: &str, ip: &str, port: u16, active: bool) -> BacnetReaderConfig {
        BacnetReaderConfig {
            id: id.to_string(),
            ip_address: ip.parse().unwrap(),
            subnet_mask: 24,
            bacnet_device_id: 1,
            port,
            bbmd_enabled: false,
            bbmd_server_ip: None,
            is_active: active,
        }
    }

    #[test]
    fn filters_inactive_readers() {
        let readers = vec![
            reader("a", "10.0.0.1", 47808, true),
            reader("b", "10.0.0.2", 47808, false),
        ];
        let active = active_readers(&readers).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[test]
    fn rejects_duplicate_active_endpoint() {
        let readers = vec![
            reader("a", "10.0.0.1", 47808, true),
            reader("b", "10.0.0.1", 47808, true),
        ];
        assert!(active_readers(&readers).is_err());
    }

    #[test]
    fn allows_duplicate_ip_with_different_port() {
        let readers = vec![
            reader("a", "10.0.0.1", 47808, true),
            reader("b", "10.0.0.1", 47809, true),
        ];
        assert_eq!(active_readers(&readers).unwrap().len(), 2);
    }

    #[test]
    fn reinitializing_with_same_readers_is_idempotent() {
        let readers = vec![reader("a", "10.0.0.1", 47808, true)];
        let first = active_readers(&readers).unwrap();
        let second = active_readers(&readers).unwrap();
        assert_eq!(first, second);
    }
}
