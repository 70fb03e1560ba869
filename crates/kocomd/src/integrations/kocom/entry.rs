use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use wallpad::KocomPacket;

use super::dispatcher::Subscription;
use super::gateway::Gateway;
use crate::engine::lock;
use crate::engine::Platform;

/// One configured bridge: the gateway plus everything platforms hooked onto
/// it, released together on unload.
pub struct KocomEntry {
    gateway: Arc<Gateway>,
    on_unload: Mutex<Vec<Subscription>>,
    entity_devices: Mutex<HashMap<String, (Platform, String)>>,
}

impl KocomEntry {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            on_unload: Mutex::new(Vec::new()),
            entity_devices: Mutex::new(HashMap::new()),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Keep `subscription` connected until the entry is unloaded.
    pub fn on_unload(&self, subscription: Subscription) {
        lock(&self.on_unload).push(subscription);
    }

    /// Remember which device backs `entity_id`.
    ///
    /// Returns `false` if the entity was already tracked.
    pub fn track(&self, entity_id: &str, platform: Platform, dev_id: &str) -> bool {
        let mut entity_devices = lock(&self.entity_devices);
        if entity_devices.contains_key(entity_id) {
            return false;
        }
        entity_devices.insert(entity_id.to_string(), (platform, dev_id.to_string()));
        true
    }

    pub fn entity_ids(&self) -> Vec<String> {
        lock(&self.entity_devices).keys().cloned().collect()
    }

    /// Ask the bus for the current state behind `entity_id`.
    ///
    /// Returns `false` for entities this entry does not own.
    pub fn refresh(&self, entity_id: &str) -> bool {
        let tracked = lock(&self.entity_devices).get(entity_id).cloned();
        match tracked {
            Some((_, dev_id)) => self.gateway.refresh(&dev_id),
            None => false,
        }
    }

    /// Latest packet behind a `platform` entity, if this entry owns it.
    pub fn packet(&self, entity_id: &str, platform: Platform) -> Option<KocomPacket> {
        let dev_id = match lock(&self.entity_devices).get(entity_id) {
            Some((tracked, dev_id)) if *tracked == platform => dev_id.clone(),
            _ => return None,
        };
        self.gateway.packet(&dev_id)
    }

    pub fn unload(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.on_unload));
        debug!("Releasing {} subscriptions", subscriptions.len());
        // Disconnect outside the lock, handlers may still be running.
        for subscription in subscriptions {
            subscription.disconnect();
        }
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        lock(&self.on_unload).len()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use wallpad::command::frame;

    use super::*;
    use crate::integrations::kocom::gateway::add_signal;
    use crate::integrations::kocom::KocomConfig;

    #[test]
    fn test_unload_disconnects() {
        let entry = KocomEntry::new(Arc::new(Gateway::new(&KocomConfig::new("10.0.0.5", 8899))));
        let signal = add_signal(Platform::BinarySensor);
        entry.on_unload(entry.gateway().packets().connect(signal.clone(), |_| {}));
        entry.on_unload(entry.gateway().packets().connect(signal.clone(), |_| {}));
        assert_eq!(entry.gateway().packets().handler_count(&signal), 2);

        entry.unload();
        assert_eq!(entry.subscription_count(), 0);
        assert_eq!(entry.gateway().packets().handler_count(&signal), 0);
    }

    #[test]
    fn test_refresh_unknown_entity() {
        let entry = KocomEntry::new(Arc::new(Gateway::new(&KocomConfig::new("10.0.0.5", 8899))));
        entry
            .gateway()
            .handle_frame(&frame(&hex!("30dc 00 0100 6000 00 0000000000000000")));

        assert!(!entry.refresh("binary_sensor.kocom_motion_0"));
        assert!(entry.track(
            "binary_sensor.kocom_motion_0",
            Platform::BinarySensor,
            "motion_0"
        ));
        assert!(entry.refresh("binary_sensor.kocom_motion_0"));
        assert_eq!(entry.entity_ids(), vec!["binary_sensor.kocom_motion_0"]);
    }

    #[test]
    fn test_track_once_and_lookup_by_platform() {
        let entry = KocomEntry::new(Arc::new(Gateway::new(&KocomConfig::new("10.0.0.5", 8899))));
        entry
            .gateway()
            .handle_frame(&frame(&hex!("30dc 00 0100 0e01 00 ff00000000000000")));

        assert!(entry.track("light.kocom_light_1_0", Platform::Light, "light_1_0"));
        assert!(!entry.track("light.kocom_light_1_0", Platform::Light, "light_1_0"));

        let packet = entry.packet("light.kocom_light_1_0", Platform::Light).unwrap();
        assert_eq!(packet.device_id(), "light_1_0");
        assert!(entry
            .packet("light.kocom_light_1_0", Platform::Climate)
            .is_none());
        assert!(entry.packet("light.kocom_light_1_1", Platform::Light).is_none());
    }
}
