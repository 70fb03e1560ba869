//! Binary sensor platform.
//!
//! Thermostat and ventilator error flags become problem sensors, motion
//! detectors become motion sensors. Sensors follow their device through the
//! gateway's update signal until the entry is unloaded.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use wallpad::device::ERROR_CODE;
use wallpad::device::STATE;
use wallpad::device::TIME;
use wallpad::KocomPacket;
use wallpad::PacketKind;

use super::entity::KocomEntity;
use super::entry::KocomEntry;
use super::gateway::Gateway;
use super::platform::register;
use super::platform::setup_platform;
use super::platform::PlatformEntity;
use crate::engine::AddEntities;
use crate::engine::Attributes;
use crate::engine::BinarySensorState;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::Platform;
use crate::engine::StateWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BinarySensorDeviceClass {
    Motion,
    Problem,
}

/// Behaviour of an on/off sensor on top of its [`KocomEntity`] identity.
pub trait BinarySensorEntity: PlatformEntity {
    fn device_class(&self) -> BinarySensorDeviceClass;

    fn extra_state_attributes(&self) -> &Attributes;

    /// Recompute the extra attributes from the current device snapshot.
    fn refresh_attributes(&mut self);

    fn is_on(&self) -> bool {
        self.base()
            .device()
            .get(STATE)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn state(&self) -> BinarySensorState {
        BinarySensorState {
            on: self.is_on(),
            device_class: Some(self.device_class().to_string()),
            available: self.base().available(),
            attributes: self.extra_state_attributes().clone(),
        }
    }
}

macro_rules! binary_sensor_entity {
    ($sensor:ty) => {
        impl Entity for $sensor {
            fn entity_id(&self) -> &str {
                self.base.entity_id()
            }

            fn unique_id(&self) -> &str {
                self.base.unique_id()
            }

            fn name(&self) -> &str {
                self.base.name()
            }

            fn platform(&self) -> Platform {
                Platform::BinarySensor
            }

            fn state_json(&self) -> serde_json::Value {
                serde_json::to_value(self.state()).unwrap_or_default()
            }

            fn available(&self) -> bool {
                self.base.available()
            }

            fn device_info(&self) -> Option<DeviceInfo> {
                Some(self.base.device_info())
            }
        }

        impl PlatformEntity for $sensor {
            fn base(&self) -> &KocomEntity {
                &self.base
            }

            fn base_mut(&mut self) -> &mut KocomEntity {
                &mut self.base
            }

            fn device_updated(&mut self) {
                self.refresh_attributes();
            }

            fn write_state(&self, writer: &StateWriter) {
                writer.write_binary_sensor(self.base.entity_id(), self.state());
            }
        }
    };
}

/// Error flag of a thermostat or ventilator.
pub struct ProblemSensor {
    base: KocomEntity,
    attributes: Attributes,
}

impl ProblemSensor {
    pub fn new(gateway: &Gateway, packet: &KocomPacket) -> Self {
        let mut sensor = Self {
            base: KocomEntity::new(gateway, Platform::BinarySensor, packet),
            attributes: Attributes::new(),
        };
        sensor.refresh_attributes();
        sensor
    }
}

impl BinarySensorEntity for ProblemSensor {
    fn device_class(&self) -> BinarySensorDeviceClass {
        BinarySensorDeviceClass::Problem
    }

    fn extra_state_attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn refresh_attributes(&mut self) {
        let mut attributes = self.base.base_attributes();
        attributes.insert(
            ERROR_CODE.to_string(),
            json!(self.base.device().get(ERROR_CODE)),
        );
        self.attributes = attributes;
    }
}

binary_sensor_entity!(ProblemSensor);

pub struct MotionSensor {
    base: KocomEntity,
    attributes: Attributes,
}

impl MotionSensor {
    pub fn new(gateway: &Gateway, packet: &KocomPacket) -> Self {
        let mut sensor = Self {
            base: KocomEntity::new(gateway, Platform::BinarySensor, packet),
            attributes: Attributes::new(),
        };
        sensor.refresh_attributes();
        sensor
    }
}

impl BinarySensorEntity for MotionSensor {
    fn device_class(&self) -> BinarySensorDeviceClass {
        BinarySensorDeviceClass::Motion
    }

    fn extra_state_attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn refresh_attributes(&mut self) {
        let mut attributes = self.base.base_attributes();
        attributes.insert(TIME.to_string(), json!(self.base.device().get(TIME)));
        self.attributes = attributes;
    }
}

binary_sensor_entity!(MotionSensor);

pub enum Classification {
    Problem(ProblemSensor),
    Motion(MotionSensor),
    Unrecognized,
}

/// Pick the sensor type for a packet routed to this platform.
pub fn classify(gateway: &Gateway, packet: &KocomPacket) -> Classification {
    match packet.kind() {
        PacketKind::Thermostat | PacketKind::Fan => {
            Classification::Problem(ProblemSensor::new(gateway, packet))
        }
        PacketKind::Motion => Classification::Motion(MotionSensor::new(gateway, packet)),
        _ => {
            warn!("Unrecognized binary sensor packet: {}", packet);
            Classification::Unrecognized
        }
    }
}

/// Register sensors for every known packet and for those discovered later.
pub fn setup_entry(entry: &Arc<KocomEntry>, add: AddEntities, writer: StateWriter) {
    setup_platform(entry, Platform::BinarySensor, move |entry, packet| {
        match classify(entry.gateway(), packet) {
            Classification::Problem(sensor) => register(entry, &add, &writer, sensor),
            Classification::Motion(sensor) => register(entry, &add, &writer, sensor),
            Classification::Unrecognized => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use hex_literal::hex;
    use tokio::sync::mpsc;
    use tracing::Level;
    use tracing_subscriber::layer::Context;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Layer;
    use wallpad::command::frame;
    use wallpad::PacketParser;

    use super::*;
    use crate::engine::lock;
    use crate::engine::FromIntegrationMessage;
    use crate::engine::SharedEntity;
    use crate::integrations::kocom::gateway::add_signal;
    use crate::integrations::kocom::KocomConfig;

    const THERMOSTAT_ERROR: [u8; 16] = hex!("30dc 00 0100 3601 00 1100182d15000300");
    const MOTION_IDLE: [u8; 16] = hex!("30dc 00 0100 6000 00 0000000000000000");
    const MOTION_DETECT: [u8; 16] = hex!("30dc 00 0100 6000 04 0000000000000000");

    struct WarningCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarningCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarningCounter(count.clone()));
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, count.load(Ordering::SeqCst))
    }

    fn gateway() -> Gateway {
        Gateway::new(&KocomConfig::new("10.0.0.5", 8899))
    }

    fn packet(body: &[u8], sub_id: Option<&str>) -> KocomPacket {
        PacketParser::new()
            .parse_state(&frame(body))
            .unwrap()
            .into_iter()
            .find(|p| p.device().sub_id.as_deref() == sub_id)
            .unwrap()
    }

    struct Host {
        rx: mpsc::Receiver<FromIntegrationMessage>,
    }

    impl Host {
        fn setup(entry: &Arc<KocomEntry>) -> Self {
            let (tx, rx) = mpsc::channel(64);
            setup_entry(
                entry,
                AddEntities::new("kocom", tx.clone()),
                StateWriter::new(tx),
            );
            Self { rx }
        }

        fn added(&mut self) -> Vec<SharedEntity> {
            self.drain()
                .into_iter()
                .filter_map(|msg| match msg {
                    FromIntegrationMessage::EntityDiscovered { entity, .. } => Some(entity),
                    _ => None,
                })
                .collect()
        }

        fn states(&mut self) -> Vec<(String, BinarySensorState)> {
            self.drain()
                .into_iter()
                .filter_map(|msg| match msg {
                    FromIntegrationMessage::BinarySensorStateChanged { entity_id, state } => {
                        Some((entity_id, state))
                    }
                    _ => None,
                })
                .collect()
        }

        fn drain(&mut self) -> Vec<FromIntegrationMessage> {
            let mut messages = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                messages.push(msg);
            }
            messages
        }
    }

    #[test]
    fn test_classify_thermostat_and_fan_errors() {
        let gateway = gateway();
        let thermostat = packet(&THERMOSTAT_ERROR, Some("error"));
        let fan = packet(&hex!("30dc 00 0100 4800 00 1101400000000002"), Some("error"));

        let Classification::Problem(sensor) = classify(&gateway, &thermostat) else {
            panic!("expected a problem sensor");
        };
        assert!(sensor.is_on());
        assert_eq!(sensor.device_class(), BinarySensorDeviceClass::Problem);

        let Classification::Problem(sensor) = classify(&gateway, &fan) else {
            panic!("expected a problem sensor");
        };
        assert!(sensor.is_on());
        assert_eq!(sensor.extra_state_attributes()["error_code"], json!("02"));
    }

    #[test]
    fn test_classify_motion() {
        let gateway = gateway();
        let motion = packet(&MOTION_DETECT, None);

        let Classification::Motion(sensor) = classify(&gateway, &motion) else {
            panic!("expected a motion sensor");
        };
        assert!(sensor.is_on());
        assert_eq!(sensor.device_class(), BinarySensorDeviceClass::Motion);
        assert_eq!(
            sensor.extra_state_attributes()["time"],
            json!(motion.device().get(TIME))
        );
        assert_ne!(sensor.extra_state_attributes()["time"], json!(null));
    }

    #[test]
    fn test_classify_other_kinds_warns_once() {
        let gateway = gateway();
        let light = packet(&hex!("30dc 00 0100 0e01 00 ff00000000000000"), Some("0"));

        let (classification, warnings) = count_warnings(|| classify(&gateway, &light));
        assert!(matches!(classification, Classification::Unrecognized));
        assert_eq!(warnings, 1);

        let (_, warnings) =
            count_warnings(|| classify(&gateway, &packet(&MOTION_IDLE, None)));
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_enumerates_known_packets() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        entry.gateway().handle_frame(&frame(&THERMOSTAT_ERROR));
        let mut host = Host::setup(&entry);

        let messages = host.drain();
        assert_eq!(messages.len(), 2);
        let FromIntegrationMessage::EntityDiscovered { entity_id, entity, .. } = &messages[0]
        else {
            panic!("expected a discovery first, got {:?}", messages[0]);
        };
        assert_eq!(entity_id, "binary_sensor.kocom_thermostat_1_error");
        assert_eq!(lock(entity).platform(), Platform::BinarySensor);

        let FromIntegrationMessage::BinarySensorStateChanged { state, .. } = &messages[1] else {
            panic!("expected the initial state, got {:?}", messages[1]);
        };
        insta::assert_snapshot!(serde_json::to_string_pretty(state).unwrap(), @r#"
        {
          "on": true,
          "device_class": "problem",
          "available": false,
          "attributes": {
            "device_type": "thermostat",
            "error_code": "03",
            "room_id": "1",
            "sub_id": "error"
          }
        }
        "#);
    }

    #[test]
    fn test_adds_packets_discovered_later() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        let mut host = Host::setup(&entry);
        assert!(host.added().is_empty());

        entry.gateway().handle_frame(&frame(&MOTION_IDLE));
        let added = host.added();
        assert_eq!(added.len(), 1);
        let sensor = lock(&added[0]);
        assert_eq!(sensor.entity_id(), "binary_sensor.kocom_motion_0");
        assert_eq!(sensor.state_json()["on"], json!(false));
        assert_eq!(sensor.state_json()["device_class"], json!("motion"));
    }

    #[test]
    fn test_redelivered_packet_adds_again() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        let mut host = Host::setup(&entry);
        let motion = packet(&MOTION_IDLE, None);

        entry
            .gateway()
            .packets()
            .send(&add_signal(Platform::BinarySensor), &motion);
        entry
            .gateway()
            .packets()
            .send(&add_signal(Platform::BinarySensor), &motion);

        let messages = host.drain();
        let added: Vec<_> = messages
            .iter()
            .filter_map(|msg| match msg {
                FromIntegrationMessage::EntityDiscovered { entity, .. } => Some(entity),
                _ => None,
            })
            .collect();
        assert_eq!(added.len(), 2);
        assert_eq!(
            lock(added[0]).entity_id(),
            lock(added[1]).entity_id()
        );

        // The second sensor is handed over but not wired up.
        let writes = messages
            .iter()
            .filter(|msg| matches!(msg, FromIntegrationMessage::BinarySensorStateChanged { .. }))
            .count();
        assert_eq!(writes, 1);
        assert_eq!(entry.subscription_count(), 3);

        entry.gateway().handle_frame(&frame(&MOTION_DETECT));
        assert_eq!(host.states().len(), 1);
    }

    #[test]
    fn test_connection_changes_rewrite_state() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        let mut host = Host::setup(&entry);
        entry.gateway().handle_frame(&frame(&MOTION_IDLE));
        host.drain();

        entry.gateway().handle_connection(true);
        let states = host.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, "binary_sensor.kocom_motion_0");
        assert!(!states[0].1.on);
    }

    #[test]
    fn test_updates_follow_device() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        let mut host = Host::setup(&entry);

        entry.gateway().handle_frame(&frame(&MOTION_IDLE));
        let states = host.states();
        assert_eq!(states.len(), 1);
        assert!(!states[0].1.on);

        // Same state again is not written.
        entry.gateway().handle_frame(&frame(&MOTION_IDLE));
        assert!(host.states().is_empty());

        entry.gateway().handle_frame(&frame(&MOTION_DETECT));
        let states = host.states();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].0, "binary_sensor.kocom_motion_0");
        assert!(states[0].1.on);
        assert_ne!(states[0].1.attributes["time"], json!(null));
    }

    #[test]
    fn test_unload_stops_tracking() {
        let entry = Arc::new(KocomEntry::new(Arc::new(gateway())));
        let mut host = Host::setup(&entry);
        entry.gateway().handle_frame(&frame(&MOTION_IDLE));
        host.drain();
        assert_eq!(entry.subscription_count(), 3);

        entry.unload();
        entry.gateway().handle_frame(&frame(&MOTION_DETECT));
        entry.gateway().handle_frame(&frame(&THERMOSTAT_ERROR));
        assert!(host.drain().is_empty());
    }
}
