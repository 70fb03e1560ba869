//! Command frames sent from the wallpad address to a device.
//!
//! Every builder starts from the last value bytes the device reported and
//! patches the fields it changes, so unrelated settings are echoed back
//! unchanged.

use tracing::debug;

use crate::checksum::checksum;
use crate::enums::Command;
use crate::enums::FanMode;
use crate::enums::OpMode;
use crate::packet::KocomPacket;
use crate::packet::PacketKind;
use crate::packet::PREFIX;
use crate::packet::SUFFIX;
use crate::packet::WALLPAD_ADDRESS;

const HEADER: [u8; 3] = [0x30, 0xbc, 0x00];

/// Wrap a 16 byte frame body with prefix, checksum and terminator.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.extend_from_slice(&PREFIX);
    out.extend_from_slice(body);
    out.push(checksum(body));
    out.extend_from_slice(&SUFFIX);
    out
}

impl KocomPacket {
    fn make(&self, command: Command, value: [u8; 8]) -> Vec<u8> {
        let address = self.frame().address();
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&HEADER);
        // Elevator calls are addressed from the wallpad side.
        if self.kind() == PacketKind::Ev {
            body.extend_from_slice(&WALLPAD_ADDRESS);
            body.extend_from_slice(&address);
        } else {
            body.extend_from_slice(&address);
            body.extend_from_slice(&WALLPAD_ADDRESS);
        }
        body.push(command.code());
        body.extend_from_slice(&value);
        frame(&body)
    }

    fn status(&self, patch: impl FnOnce(&mut [u8; 8])) -> Vec<u8> {
        let mut value = self.frame().value;
        patch(&mut value);
        self.make(Command::Status, value)
    }

    fn slot(&self) -> Option<usize> {
        self.device()
            .sub_id
            .as_deref()
            .and_then(|sub_id| sub_id.parse().ok())
            .filter(|slot| *slot < 8)
    }

    /// Ask the device to report its state.
    pub fn make_scan(&self) -> Vec<u8> {
        self.make(Command::Scan, [0; 8])
    }

    /// Returns `None` for kinds without a power control and for requests the
    /// bus cannot express (turning gas on, cancelling an elevator call).
    pub fn make_power(&self, power: bool) -> Option<Vec<u8>> {
        match self.kind() {
            PacketKind::Light | PacketKind::Outlet => {
                let slot = self.slot()?;
                Some(self.status(|v| v[slot] = if power { 0xff } else { 0x00 }))
            }
            PacketKind::Thermostat => Some(self.status(|v| {
                if power {
                    v[0] = 0x11;
                    v[1] = 0x00;
                } else {
                    v[0] = 0x00;
                    v[1] = 0x01;
                }
            })),
            PacketKind::Ac => Some(self.status(|v| v[0] = if power { 0x10 } else { 0x00 })),
            PacketKind::Fan => Some(self.status(|v| v[0] = if power { 0x11 } else { 0x00 })),
            PacketKind::Gas if power => {
                debug!("Gas valves can only be closed remotely");
                None
            }
            PacketKind::Gas => Some(self.make(Command::Off, self.frame().value)),
            PacketKind::Ev if !power => {
                debug!("Elevator calls cannot be cancelled");
                None
            }
            PacketKind::Ev => Some(self.make(Command::On, self.frame().value)),
            PacketKind::Iaq | PacketKind::Motion => None,
        }
    }

    pub fn make_brightness(&self, brightness: u8) -> Option<Vec<u8>> {
        if self.kind() != PacketKind::Light {
            return None;
        }
        let slot = self.slot()?;
        Some(self.status(|v| v[slot] = brightness))
    }

    pub fn make_away_mode(&self, away_mode: bool) -> Option<Vec<u8>> {
        (self.kind() == PacketKind::Thermostat).then(|| {
            self.status(|v| {
                v[0] = 0x11;
                v[1] = u8::from(away_mode);
            })
        })
    }

    pub fn make_target_temp(&self, target_temp: u8) -> Option<Vec<u8>> {
        match self.kind() {
            PacketKind::Thermostat => Some(self.status(|v| v[2] = target_temp)),
            PacketKind::Ac => Some(self.status(|v| v[5] = target_temp)),
            _ => None,
        }
    }

    pub fn make_op_mode(&self, op_mode: OpMode) -> Option<Vec<u8>> {
        (self.kind() == PacketKind::Ac).then(|| {
            self.status(|v| {
                v[0] = 0x10;
                v[1] = op_mode.code();
            })
        })
    }

    pub fn make_fan_mode(&self, fan_mode: FanMode) -> Option<Vec<u8>> {
        (self.kind() == PacketKind::Ac).then(|| self.status(|v| v[2] = fan_mode.code()))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::packet::Frame;
    use crate::parser::PacketParser;

    fn packets(body: &[u8]) -> Vec<KocomPacket> {
        PacketParser::new().parse_state(&frame(body)).unwrap()
    }

    fn body(raw: &[u8]) -> &[u8] {
        &raw[2..18]
    }

    #[test]
    fn test_frame_adds_checksum() {
        let raw = frame(&hex!("30dc 00 0100 6000 04 0000000000000000"));
        assert_eq!(raw.len(), 21);
        assert_eq!(raw[18], 0x71);
        assert!(Frame::parse(&raw).is_ok());
    }

    #[test]
    fn test_scan() {
        let packet = &packets(&hex!("30dc 00 0100 3601 00 1100182d15000000"))[0];
        assert_eq!(
            body(&packet.make_scan()),
            hex!("30bc 00 3601 0100 3a 0000000000000000")
        );
    }

    #[test]
    fn test_light_slot_commands() {
        let light = &packets(&hex!("30dc 00 0100 0e01 00 00ff000000000000"))[0];
        assert_eq!(light.device_id(), "light_1_1");

        assert_eq!(
            body(&light.make_power(false).unwrap()),
            hex!("30bc 00 0e01 0100 00 0000000000000000")
        );
        assert_eq!(
            body(&light.make_brightness(0x32).unwrap()),
            hex!("30bc 00 0e01 0100 00 0032000000000000")
        );
        assert!(light.make_target_temp(20).is_none());
    }

    #[test]
    fn test_thermostat_commands() {
        let thermostat = &packets(&hex!("30dc 00 0100 3602 00 1100160014000000"))[0];

        assert_eq!(
            body(&thermostat.make_power(false).unwrap()),
            hex!("30bc 00 3602 0100 00 0001160014000000")
        );
        assert_eq!(
            body(&thermostat.make_away_mode(true).unwrap()),
            hex!("30bc 00 3602 0100 00 1101160014000000")
        );
        assert_eq!(
            body(&thermostat.make_target_temp(25).unwrap()),
            hex!("30bc 00 3602 0100 00 1100190014000000")
        );
    }

    #[test]
    fn test_ac_and_fan_commands() {
        let ac = &packets(&hex!("30dc 00 0100 3900 00 0000000018120000"))[0];
        assert_eq!(
            body(&ac.make_op_mode(OpMode::Dry).unwrap()),
            hex!("30bc 00 3900 0100 00 1002000018120000")
        );
        assert_eq!(
            body(&ac.make_fan_mode(FanMode::High).unwrap()),
            hex!("30bc 00 3900 0100 00 0000030018120000")
        );

        let fan = &packets(&hex!("30dc 00 0100 4800 00 1101400000000000"))[0];
        assert_eq!(
            body(&fan.make_power(false).unwrap()),
            hex!("30bc 00 4800 0100 00 0001400000000000")
        );
        assert!(fan.make_away_mode(true).is_none());
    }

    #[test]
    fn test_one_way_controls() {
        let gas = &packets(&hex!("30dc 00 0100 2c00 01 0000000000000000"))[0];
        assert!(gas.make_power(true).is_none());
        assert_eq!(
            body(&gas.make_power(false).unwrap()),
            hex!("30bc 00 2c00 0100 02 0000000000000000")
        );

        let ev = &packets(&hex!("30dc 00 0100 4401 00 0000000000000000"))[0];
        assert!(ev.make_power(false).is_none());
        assert_eq!(
            body(&ev.make_power(true).unwrap()),
            hex!("30bc 00 0100 4401 01 0000000000000000")
        );
    }
}
