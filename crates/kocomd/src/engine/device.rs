use serde::Serialize;

/// Device description reported by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the physical device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    /// Device this one is reached through, e.g. a bus gateway
    pub via_device: Option<(String, String)>,
}

/// A device in the kocomd system.
///
/// A device represents a physical or logical device that contains one or more entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub entity_ids: Vec<String>,
}

impl Device {
    /// Registry key of a device: its first identifier, `domain:id`.
    pub fn registry_id(info: &DeviceInfo) -> String {
        match info.identifiers.first() {
            Some((domain, id)) => format!("{domain}:{id}"),
            None => info.name.clone(),
        }
    }

    pub fn new(info: DeviceInfo) -> Self {
        Self {
            id: Self::registry_id(&info),
            info,
            entity_ids: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity_id: String) {
        if !self.entity_ids.contains(&entity_id) {
            self.entity_ids.push(entity_id);
        }
    }

    pub fn remove_entity(&mut self, entity_id: &str) {
        self.entity_ids.retain(|id| id != entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![("kocom_wallpad".to_string(), "10.0.0.2_fan".to_string())],
            name: "Kocom fan".to_string(),
            manufacturer: None,
            model: None,
            sw_version: None,
            via_device: None,
        }
    }

    #[test]
    fn test_registry_id() {
        assert_eq!(Device::registry_id(&info()), "kocom_wallpad:10.0.0.2_fan");

        let mut anonymous = info();
        anonymous.identifiers.clear();
        assert_eq!(Device::registry_id(&anonymous), "Kocom fan");
    }

    #[test]
    fn test_add_entity_once() {
        let mut device = Device::new(info());
        device.add_entity("binary_sensor.kocom_fan_0_error".to_string());
        device.add_entity("binary_sensor.kocom_fan_0_error".to_string());
        assert_eq!(device.entity_ids.len(), 1);

        device.remove_entity("binary_sensor.kocom_fan_0_error");
        assert!(device.entity_ids.is_empty());
    }
}
