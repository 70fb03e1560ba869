use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;
use wallpad::device::CO2;
use wallpad::device::DIRECTION;
use wallpad::device::ERROR;
use wallpad::device::FLOOR;
use wallpad::device::TEMPERATURE;
use wallpad::Device;
use wallpad::KocomPacket;
use wallpad::PacketKind;
use wallpad::PacketParser;

use super::client::KocomClient;
use super::dispatcher::Dispatcher;
use super::restore::Records;
use super::KocomConfig;
use super::DOMAIN;
use crate::engine::lock;
use crate::engine::Platform;

/// Platform a packet's device is exposed on.
pub fn platform_for(packet: &KocomPacket) -> Platform {
    let platform = match packet.kind() {
        PacketKind::Light => Platform::Light,
        PacketKind::Outlet | PacketKind::Gas | PacketKind::Ev => Platform::Switch,
        PacketKind::Thermostat | PacketKind::Ac => Platform::Climate,
        PacketKind::Fan => Platform::Fan,
        PacketKind::Iaq => Platform::Sensor,
        PacketKind::Motion => Platform::BinarySensor,
    };

    // Sub-devices of a thermostat, ventilator or elevator are read-only.
    if matches!(
        packet.kind(),
        PacketKind::Thermostat | PacketKind::Fan | PacketKind::Ev
    ) {
        if let Some(sub_id) = packet.device().sub_id.as_deref() {
            if sub_id.contains(ERROR) {
                return Platform::BinarySensor;
            }
            if [TEMPERATURE, CO2, DIRECTION, FLOOR]
                .iter()
                .any(|sensor| sub_id.contains(sensor))
            {
                return Platform::Sensor;
            }
        }
    }
    platform
}

/// Signal fired once per newly seen device of `platform`.
pub fn add_signal(platform: Platform) -> String {
    format!("{DOMAIN}_{platform}_add")
}

/// Signal fired with every decoded state of one device.
pub fn device_update_signal(host: &str, dev_id: &str) -> String {
    format!("{DOMAIN}_{host}_{dev_id}")
}

/// Signal fired when the bus connection to `host` goes up or down.
pub fn connection_signal(host: &str) -> String {
    format!("{DOMAIN}_{host}_connection")
}

/// Decodes the bus and fans packets out to entities.
///
/// The first packet of every device is kept per platform so platforms set up
/// later can enumerate what is already known.
pub struct Gateway {
    host: String,
    client: KocomClient,
    parser: Mutex<PacketParser>,
    entities: Mutex<HashMap<Platform, BTreeMap<String, KocomPacket>>>,
    latest: Mutex<BTreeMap<String, KocomPacket>>,
    packets: Dispatcher<KocomPacket>,
    devices: Dispatcher<Device>,
    connection: Dispatcher<bool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(config: &KocomConfig) -> Self {
        Self {
            host: config.host.clone(),
            client: KocomClient::new(config),
            parser: Mutex::new(PacketParser::new()),
            entities: Mutex::new(HashMap::new()),
            latest: Mutex::new(BTreeMap::new()),
            packets: Dispatcher::new(),
            devices: Dispatcher::new(),
            connection: Dispatcher::new(),
            watcher: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Add signals carry the first packet of a device.
    pub fn packets(&self) -> &Dispatcher<KocomPacket> {
        &self.packets
    }

    /// Update signals carry the device snapshot of every packet.
    pub fn devices(&self) -> &Dispatcher<Device> {
        &self.devices
    }

    /// Connection signals carry whether the bus is connected.
    pub fn connection(&self) -> &Dispatcher<bool> {
        &self.connection
    }

    pub fn get_entities(&self, platform: Platform) -> Vec<KocomPacket> {
        lock(&self.entities)
            .get(&platform)
            .map(|packets| packets.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Decode one raw frame and dispatch its packets.
    pub fn handle_frame(&self, bytes: &[u8]) {
        let parsed = lock(&self.parser).parse_state(bytes);
        match parsed {
            Ok(packets) => {
                for packet in packets {
                    self.handle_packet(packet);
                }
            }
            Err(e @ wallpad::Error::Checksum { .. }) => {
                debug!("Dropping frame {}: {}", wallpad::encode_hex(bytes), e)
            }
            Err(e) => warn!("Failed to parse frame {}: {}", wallpad::encode_hex(bytes), e),
        }
    }

    pub fn handle_packet(&self, packet: KocomPacket) {
        let platform = platform_for(&packet);
        let dev_id = packet.device_id();
        debug!("{} -> {}", packet, platform);

        lock(&self.latest).insert(dev_id.clone(), packet.clone());

        let is_new = {
            let mut entities = lock(&self.entities);
            let known = entities.entry(platform).or_default();
            if known.contains_key(&dev_id) {
                false
            } else {
                known.insert(dev_id.clone(), packet.clone());
                true
            }
        };

        if is_new {
            info!("Discovered {} device {}", platform, dev_id);
            self.packets.send(&add_signal(platform), &packet);
        }
        self.devices
            .send(&device_update_signal(&self.host, &dev_id), packet.device());
    }

    /// Replay saved frames so entities exist before the bus reports them.
    pub fn restore(&self, records: &Records) {
        for (dev_id, hex) in records {
            match wallpad::decode_hex(hex) {
                Ok(bytes) => self.handle_frame(&bytes),
                Err(e) => warn!("Skipping saved frame of {}: {}", dev_id, e),
            }
        }
        info!("Restored {} saved frames", records.len());
    }

    /// Latest frame of every device, keyed by device id.
    pub fn records(&self) -> Records {
        lock(&self.latest)
            .iter()
            .map(|(dev_id, packet)| (dev_id.clone(), packet.frame().to_hex()))
            .collect()
    }

    /// Most recent packet of `dev_id`, the base for command frames.
    pub fn packet(&self, dev_id: &str) -> Option<KocomPacket> {
        lock(&self.latest).get(dev_id).cloned()
    }

    pub fn start(self: &Arc<Self>) -> bool {
        // Subscribe before the client runs so the first connect is not missed.
        let mut status = self.client.status();
        let gateway = Arc::downgrade(self);
        let started = self.client.start(move |frame| {
            if let Some(gateway) = gateway.upgrade() {
                gateway.handle_frame(&frame);
            }
        });
        if !started {
            return false;
        }

        let gateway = Arc::downgrade(self);
        let watcher = tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let connected = *status.borrow_and_update();
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                gateway.handle_connection(connected);
            }
        });
        *lock(&self.watcher) = Some(watcher);
        true
    }

    pub fn handle_connection(&self, connected: bool) {
        if connected {
            info!("Bus at {} connected", self.host);
        } else {
            warn!("Bus at {} disconnected", self.host);
        }
        self.connection.send(&connection_signal(&self.host), &connected);
    }

    pub async fn stop(&self) {
        self.client.stop().await;
        let watcher = lock(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        lock(&self.entities).clear();
    }

    pub fn send(&self, frame: Vec<u8>) {
        self.client.send(frame);
    }

    /// Ask the device behind `dev_id` to report its state.
    ///
    /// Returns `false` if the device has not been seen.
    pub fn refresh(&self, dev_id: &str) -> bool {
        match self.packet(dev_id) {
            Some(packet) => {
                debug!("Requesting state of {}", dev_id);
                self.send(packet.make_scan());
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn status(&self) -> watch::Receiver<bool> {
        self.client.status()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use hex_literal::hex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wallpad::command::frame;
    use wallpad::encode_hex;

    use super::*;

    const THERMOSTAT: [u8; 16] = hex!("30dc 00 0100 3601 00 1100182d15000300");
    const FAN: [u8; 16] = hex!("30dc 00 0100 4800 00 1101400007500000");
    const MOTION: [u8; 16] = hex!("30dc 00 0100 6000 04 0000000000000000");
    const EV: [u8; 16] = hex!("30dc 00 0100 4401 00 0182000000000000");

    fn gateway() -> Gateway {
        Gateway::new(&KocomConfig::new("10.0.0.5", 8899))
    }

    fn ids(packets: Vec<KocomPacket>) -> Vec<String> {
        packets.iter().map(KocomPacket::device_id).collect()
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(
            add_signal(Platform::BinarySensor),
            "kocom_wallpad_binary_sensor_add"
        );
        assert_eq!(
            device_update_signal("10.0.0.5", "motion_0"),
            "kocom_wallpad_10.0.0.5_motion_0"
        );
        assert_eq!(
            connection_signal("10.0.0.5"),
            "kocom_wallpad_10.0.0.5_connection"
        );
    }

    #[test]
    fn test_platforms() {
        let gateway = gateway();
        gateway.handle_frame(&frame(&THERMOSTAT));
        gateway.handle_frame(&frame(&FAN));
        gateway.handle_frame(&frame(&MOTION));
        gateway.handle_frame(&frame(&EV));

        insta::assert_debug_snapshot!(
            (
                ids(gateway.get_entities(Platform::BinarySensor)),
                ids(gateway.get_entities(Platform::Sensor)),
                ids(gateway.get_entities(Platform::Climate)),
                ids(gateway.get_entities(Platform::Fan)),
                ids(gateway.get_entities(Platform::Switch)),
            ),
            @r#"
        (
            [
                "fan_0_error",
                "motion_0",
                "thermostat_1_error",
            ],
            [
                "ev_1_direction",
                "ev_1_floor",
                "fan_0_co2",
                "thermostat_1_hotwater temperature",
            ],
            [
                "thermostat_1",
            ],
            [
                "fan_0",
            ],
            [
                "ev_1",
            ],
        )
        "#
        );
    }

    #[test]
    fn test_add_once_update_always() {
        let gateway = gateway();
        let adds = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));

        let counter = adds.clone();
        let _add = gateway
            .packets()
            .connect(add_signal(Platform::BinarySensor), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let counter = updates.clone();
        let _update = gateway.devices().connect(
            device_update_signal("10.0.0.5", "motion_0"),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        gateway.handle_frame(&frame(&MOTION));
        gateway.handle_frame(&frame(&MOTION));
        gateway.handle_frame(&frame(&MOTION));

        assert_eq!(adds.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_latest_packet_is_kept() {
        let gateway = gateway();
        gateway.handle_frame(&frame(&MOTION));
        gateway.handle_frame(&frame(&hex!("30dc 00 0100 6000 00 0000000000000000")));

        let latest = gateway.packet("motion_0").unwrap();
        assert_eq!(
            latest.device().get(wallpad::device::STATE),
            Some(&wallpad::StateValue::Bool(false))
        );
        assert_eq!(
            gateway.records()["motion_0"],
            encode_hex(&frame(&hex!("30dc 00 0100 6000 00 0000000000000000")))
        );
        assert!(gateway.packet("motion_1").is_none());
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let gateway = gateway();
        let mut corrupt = frame(&MOTION);
        corrupt[18] ^= 0xff;
        gateway.handle_frame(&corrupt);
        gateway.handle_frame(&[0xaa, 0x55]);

        assert!(gateway.get_entities(Platform::BinarySensor).is_empty());
        assert!(gateway.records().is_empty());
    }

    #[test]
    fn test_restore_round_trip() {
        let live = gateway();
        live.handle_frame(&frame(&THERMOSTAT));
        live.handle_frame(&frame(&MOTION));
        let records = live.records();
        assert_eq!(records["motion_0"], encode_hex(&frame(&MOTION)));
        assert_eq!(records.len(), 4);

        let restored = gateway();
        restored.restore(&records);
        assert_eq!(
            ids(restored.get_entities(Platform::BinarySensor)),
            vec!["motion_0", "thermostat_1_error"]
        );
        assert_eq!(restored.records(), records);
    }

    #[tokio::test]
    async fn test_refresh_sends_scan() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let gateway = Arc::new(Gateway::new(&KocomConfig::new("127.0.0.1", port)));
        gateway.handle_frame(&frame(&THERMOSTAT));

        assert!(!gateway.refresh("thermostat_9"));
        assert!(gateway.refresh("thermostat_1_error"));
        assert!(gateway.start());

        let (mut bridge, _) = listener.accept().await.unwrap();
        let mut received = [0u8; 21];
        bridge.read_exact(&mut received).await.unwrap();
        assert_eq!(
            received.to_vec(),
            frame(&hex!("30bc 00 3601 0100 3a 0000000000000000"))
        );

        gateway.stop().await;
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_connection_changes_are_signalled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let gateway = Arc::new(Gateway::new(&KocomConfig::new("127.0.0.1", port)));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _connection = gateway
            .connection()
            .connect(connection_signal("127.0.0.1"), move |connected| {
                let _ = tx.send(*connected);
            });

        assert!(gateway.start());
        assert!(!gateway.start());
        let (bridge, _) = listener.accept().await.unwrap();
        assert_eq!(rx.recv().await, Some(true));

        drop(bridge);
        assert_eq!(rx.recv().await, Some(false));

        gateway.stop().await;
    }
}
