//! Deterministic identifier derivation.
//!
//! `iot_device_point_id` must be a pure function of `(controller_id, point_id)`
//! so it is stable across process restarts (spec §3, §8).

use uuid::Uuid;

/// Mirrors `uuid.uuid5(uuid.NAMESPACE_URL, f"{controller_id}-{point_id}")`
/// from the original Python implementation (monitor.py).
pub fn iot_device_point_id(controller_id: &str, point_id: u32) -> Uuid {
    let name = format!("{controller_id}-{point_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        let a = iot_device_point_id("controller-1", 42);
        let b = iot_device_point_id("controller-1", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn varies_with_inputs() {
        let a = iot_device_point_id("controller-1", 42);
        let b = iot_device_point_id("controller-1", 43);
        let c = iot_device_point_id("controller-2", 42);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
