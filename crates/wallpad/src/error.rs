/// Errors produced while decoding or encoding wallpad frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame has {0} bytes, expected {expected}", expected = crate::packet::FRAME_LEN)]
    InvalidLength(usize),

    #[error("frame is missing the aa55 prefix or 0d0d terminator")]
    InvalidFraming,

    #[error("checksum mismatch: frame carries {provided:#04x}, computed {computed:#04x}")]
    Checksum { provided: u8, computed: u8 },

    #[error("unknown packet type nibble {0:#x}")]
    UnknownPacketType(u8),

    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),

    #[error("unknown device type byte {0:#04x}")]
    UnknownDeviceType(u8),

    #[error("invalid {field} value {value:#04x}")]
    InvalidValue { field: &'static str, value: u8 },

    #[error("invalid hex frame: {0:?}")]
    InvalidHex(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
