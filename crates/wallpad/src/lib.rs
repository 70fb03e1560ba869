//! Kocom wallpad RS485 protocol.
//!
//! Frames are split out of a byte stream with [`KocomCodec`], validated into
//! a [`Frame`] and expanded by a [`PacketParser`] into one [`KocomPacket`] per
//! logical device. Command frames are built from a packet's last reported
//! state, see the `make_*` methods on [`KocomPacket`].

pub mod checksum;
pub mod codec;
pub mod command;
pub mod device;
pub mod enums;
pub mod error;
pub mod packet;
pub mod parser;

pub use codec::KocomCodec;
pub use device::Device;
pub use device::StateValue;
pub use enums::Command;
pub use enums::DeviceType;
pub use enums::PacketType;
pub use error::Error;
pub use error::Result;
pub use packet::decode_hex;
pub use packet::encode_hex;
pub use packet::Frame;
pub use packet::KocomPacket;
pub use packet::PacketKind;
pub use parser::PacketParser;
