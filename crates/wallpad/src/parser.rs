//! Decoding frames into per-device packets.
//!
//! Several device kinds only reveal parts of themselves over time (a light
//! slot exists once it has been seen on, a ventilator has a CO2 sensor once
//! it reported a reading). That knowledge is kept per device address in the
//! parser, so one parser should see the whole stream of a bus.

use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;

use crate::device::*;
use crate::enums::Command;
use crate::enums::Direction;
use crate::enums::FanMode;
use crate::enums::FanSpeed;
use crate::enums::OpMode;
use crate::enums::PacketType;
use crate::enums::VentMode;
use crate::error::Result;
use crate::packet::Frame;
use crate::packet::KocomPacket;
use crate::packet::PacketKind;

const DEFAULT_TARGET_TEMP: u8 = 22;

#[derive(Debug, Default, Clone)]
struct LightMemory {
    slots: BTreeSet<usize>,
    levels: BTreeSet<u8>,
}

#[derive(Debug, Default, Clone)]
struct EvMemory {
    last_floor: Option<String>,
}

/// Stateful frame decoder.
#[derive(Debug, Default, Clone)]
pub struct PacketParser {
    lights: HashMap<String, LightMemory>,
    outlets: HashMap<String, BTreeSet<usize>>,
    target_temps: HashMap<String, u8>,
    co2_sensors: BTreeSet<String>,
    detect_times: HashMap<String, DateTime<Utc>>,
    evs: HashMap<String, EvMemory>,
}

impl PacketParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw frame into one packet per logical device.
    ///
    /// Scan replies and frames for device kinds without a decoder produce no
    /// packets.
    pub fn parse_state(&mut self, bytes: &[u8]) -> Result<Vec<KocomPacket>> {
        let frame = Frame::parse(bytes)?;
        self.parse_frame(frame)
    }

    pub fn parse_frame(&mut self, frame: Frame) -> Result<Vec<KocomPacket>> {
        if frame.packet_type == PacketType::Recv && frame.command == Command::Scan {
            debug!("Scan reply from {:02x?}", frame.address());
            return Ok(Vec::new());
        }

        let device_type = frame.device_type()?;
        let Some(kind) = PacketKind::from_device_type(device_type) else {
            debug!("No decoder for {} frame: {}", device_type, frame);
            return Ok(Vec::new());
        };

        let devices = match kind {
            PacketKind::Light => self.parse_light(&frame),
            PacketKind::Outlet => self.parse_outlet(&frame),
            PacketKind::Thermostat => self.parse_thermostat(&frame),
            PacketKind::Ac => parse_ac(&frame)?,
            PacketKind::Fan => self.parse_fan(&frame)?,
            PacketKind::Iaq => parse_iaq(&frame),
            PacketKind::Gas => parse_gas(&frame),
            PacketKind::Motion => self.parse_motion(&frame),
            PacketKind::Ev => self.parse_ev(&frame)?,
        };

        Ok(devices
            .into_iter()
            .map(|device| KocomPacket::new(kind, frame.clone(), device))
            .collect())
    }

    fn parse_light(&mut self, frame: &Frame) -> Vec<Device> {
        let key = memory_key(frame);
        let room_id = frame.room_id();
        let memory = self.lights.entry(key).or_default();
        let mut devices = Vec::new();

        for (slot, &value) in frame.value.iter().enumerate() {
            let is_on = value == 0xff;
            let brightness = if is_on { 0 } else { value };

            if is_on && memory.slots.insert(slot) {
                debug!(
                    "New light discovered - room: {}, slot: {}, known slots: {:?}",
                    room_id, slot, memory.slots
                );
            }

            if brightness > 0 && memory.slots.contains(&slot) && memory.levels.insert(brightness) {
                debug!(
                    "New brightness level discovered - room: {}, slot: {}, level: {}, known levels: {:?}",
                    room_id, slot, brightness, memory.levels
                );
            }

            if !memory.slots.contains(&slot) {
                continue;
            }

            let mut device = Device::new(DEVICE_LIGHT, Some(room_id.clone()))
                .with_sub_id(slot.to_string())
                .with(POWER, is_on);
            if !memory.levels.is_empty() {
                device = device
                    .with(POWER, value > 0)
                    .with(BRIGHTNESS, brightness)
                    .with(LEVEL, StateValue::Levels(memory.levels.iter().copied().collect()));
            }
            devices.push(device);
        }

        devices
    }

    fn parse_outlet(&mut self, frame: &Frame) -> Vec<Device> {
        let room_id = frame.room_id();
        let slots = self.outlets.entry(memory_key(frame)).or_default();
        let mut devices = Vec::new();

        for (slot, &value) in frame.value.iter().enumerate() {
            let is_on = value == 0xff;
            if is_on && slots.insert(slot) {
                debug!(
                    "New outlet discovered - room: {}, slot: {}, known slots: {:?}",
                    room_id, slot, slots
                );
            }
            if slots.contains(&slot) {
                devices.push(
                    Device::new(DEVICE_OUTLET, Some(room_id.clone()))
                        .with_sub_id(slot.to_string())
                        .with(POWER, is_on),
                );
            }
        }

        devices
    }

    fn parse_thermostat(&mut self, frame: &Frame) -> Vec<Device> {
        let v = frame.value;
        let room_id = frame.room_id();

        let is_on = v[0] >> 4 == 1;
        let is_away = v[1] & 0x0f == 1;
        let target_temp = v[2];
        let hotwater_temp = v[3];
        let current_temp = v[4];
        let heatwater_temp = v[5];
        let error_code = format!("{:02}", v[6]);
        let is_error = error_code != "00";

        // Idle thermostats report a placeholder target; remember the last real one.
        let last_target = self
            .target_temps
            .entry(memory_key(frame))
            .or_insert(DEFAULT_TARGET_TEMP);
        if is_on && *last_target != target_temp {
            debug!("New target temperature for room {}: {}", room_id, target_temp);
            *last_target = target_temp;
        }

        let mut devices = vec![
            Device::new(DEVICE_THERMOSTAT, Some(room_id.clone()))
                .with(POWER, is_on)
                .with(AWAY_MODE, is_away)
                .with(TARGET_TEMP, *last_target)
                .with(CURRENT_TEMP, current_temp),
            Device::new(DEVICE_THERMOSTAT, Some(room_id.clone()))
                .with_sub_id(ERROR)
                .with(STATE, is_error)
                .with(ERROR_CODE, error_code),
        ];

        if hotwater_temp > 0 {
            debug!("Hot water temperature: {}", hotwater_temp);
            devices.push(
                Device::new(DEVICE_THERMOSTAT, Some(room_id.clone()))
                    .with_sub_id(HOTWATER_TEMPERATURE)
                    .with(STATE, hotwater_temp),
            );
        }
        if heatwater_temp > 0 {
            debug!("Heat water temperature: {}", heatwater_temp);
            devices.push(
                Device::new(DEVICE_THERMOSTAT, Some(room_id))
                    .with_sub_id(HEATWATER_TEMPERATURE)
                    .with(STATE, heatwater_temp),
            );
        }

        devices
    }

    fn parse_fan(&mut self, frame: &Frame) -> Result<Vec<Device>> {
        let v = frame.value;
        let room_id = frame.room_id();

        let is_on = v[0] >> 4 == 1;
        let vent_mode = VentMode::try_from(v[1])?;
        let fan_speed = FanSpeed::try_from(v[2])?;
        let co2_ppm = u16::from(v[4]) * 100 + u16::from(v[5]);
        let error_code = format!("{:02}", v[7]);
        let is_error = error_code != "00";

        let vent_mode = match vent_mode {
            VentMode::Unknown => VentMode::Ventilation,
            other => other,
        };
        let reported_speed = match fan_speed {
            FanSpeed::Off => FanSpeed::Low,
            other => other,
        };

        let mut devices = vec![
            Device::new(DEVICE_FAN, Some(room_id.clone()))
                .with(POWER, is_on && fan_speed != FanSpeed::Off)
                .with(VENT_MODE, vent_mode.to_string())
                .with(FAN_SPEED, reported_speed.to_string()),
            Device::new(DEVICE_FAN, Some(room_id.clone()))
                .with_sub_id(ERROR)
                .with(STATE, is_error)
                .with(ERROR_CODE, error_code),
        ];

        let key = memory_key(frame);
        if co2_ppm > 0 && self.co2_sensors.insert(key.clone()) {
            debug!("Ventilator in room {} has a CO2 sensor", room_id);
        }
        if self.co2_sensors.contains(&key) {
            devices.push(
                Device::new(DEVICE_FAN, Some(room_id))
                    .with_sub_id(CO2)
                    .with(STATE, co2_ppm),
            );
        }

        Ok(devices)
    }

    fn parse_motion(&mut self, frame: &Frame) -> Vec<Device> {
        let key = memory_key(frame);
        let is_detected = frame.command == Command::Detect;
        if is_detected {
            let now = Utc::now();
            debug!("Motion detected in room {} at {}", frame.room_id(), now);
            self.detect_times.insert(key.clone(), now);
        }

        vec![Device::new(DEVICE_MOTION, Some(frame.room_id()))
            .with(STATE, is_detected)
            .with(TIME, self.detect_times.get(&key).copied())]
    }

    fn parse_ev(&mut self, frame: &Frame) -> Result<Vec<Device>> {
        let room_id = frame.room_id();
        let direction = Direction::try_from(frame.value[0])?;
        let floor = format_floor(frame.value[1]);

        let memory = self.evs.entry(memory_key(frame)).or_default();
        if floor != "00" {
            debug!("Elevator floor: {}", floor);
            memory.last_floor = Some(floor);
        }

        let mut devices = vec![
            Device::new(DEVICE_EV, Some(room_id.clone())).with(POWER, false),
            Device::new(DEVICE_EV, Some(room_id.clone()))
                .with_sub_id(DIRECTION)
                .with(STATE, direction.to_string()),
        ];
        if let Some(last_floor) = &memory.last_floor {
            devices.push(
                Device::new(DEVICE_EV, Some(room_id))
                    .with_sub_id(FLOOR)
                    .with(STATE, last_floor.as_str()),
            );
        }

        Ok(devices)
    }
}

const DEVICE_LIGHT: &str = "light";
const DEVICE_OUTLET: &str = "outlet";
const DEVICE_THERMOSTAT: &str = "thermostat";
const DEVICE_AC: &str = "ac";
const DEVICE_FAN: &str = "fan";
const DEVICE_IAQ: &str = "iaq";
const DEVICE_GAS: &str = "gas";
const DEVICE_MOTION: &str = "motion";
const DEVICE_EV: &str = "ev";

fn memory_key(frame: &Frame) -> String {
    let [device, room] = frame.address();
    format!("{device:02x}{room:02x}")
}

/// Basement floors have the high nibble set to 8.
fn format_floor(raw: u8) -> String {
    if raw >> 4 == 0x08 {
        format!("B{}", raw & 0x0f)
    } else {
        format!("{raw:02}")
    }
}

fn parse_ac(frame: &Frame) -> Result<Vec<Device>> {
    let v = frame.value;
    let op_mode = OpMode::try_from(v[1])?;
    let fan_mode = match FanMode::try_from(v[2])? {
        FanMode::Unknown => FanMode::Low,
        other => other,
    };

    Ok(vec![Device::new(DEVICE_AC, Some(frame.room_id()))
        .with(POWER, v[0] == 0x10)
        .with(OP_MODE, op_mode.to_string())
        .with(FAN_MODE, fan_mode.to_string())
        .with(CURRENT_TEMP, v[4])
        .with(TARGET_TEMP, v[5])])
}

fn parse_iaq(frame: &Frame) -> Vec<Device> {
    let v = frame.value;
    let readings: [(&str, u16); 6] = [
        (PM10, v[0].into()),
        (PM25, v[1].into()),
        (CO2, u16::from_be_bytes([v[2], v[3]])),
        (VOC, u16::from_be_bytes([v[4], v[5]])),
        (TEMPERATURE, v[6].into()),
        (HUMIDITY, v[7].into()),
    ];

    readings
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(sensor, value)| {
            Device::new(DEVICE_IAQ, Some(frame.room_id()))
                .with_sub_id(sensor)
                .with(STATE, value)
        })
        .collect()
}

fn parse_gas(frame: &Frame) -> Vec<Device> {
    vec![Device::new(DEVICE_GAS, Some(frame.room_id())).with(POWER, frame.command == Command::On)]
}
