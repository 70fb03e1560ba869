use tokio_util::bytes::Buf;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::error::Error;
use crate::packet::FRAME_LEN;
use crate::packet::PREFIX;
use crate::packet::SUFFIX;

/// Anything longer than this without a terminator is line noise.
const MAX_PENDING: usize = 256;

/// Splits the raw byte stream of a serial bridge into `aa 55 .. 0d 0d` frames.
///
/// Frames are yielded unvalidated; checksum and header checks happen in
/// [`crate::Frame::parse`].
#[derive(Debug, Default)]
pub struct KocomCodec;

impl Decoder for KocomCodec {
    type Item = Vec<u8>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(start) = src.windows(2).position(|w| w == PREFIX) else {
                // Keep a trailing 0xaa, it may be the first half of a prefix.
                let keep = usize::from(src.last() == Some(&PREFIX[0]));
                let discard = src.len() - keep;
                if discard > 0 {
                    trace!("Discarding {} bytes without frame prefix", discard);
                }
                src.advance(discard);
                return Ok(None);
            };
            src.advance(start);

            // Frames have a fixed size, check the expected terminator position
            // first so a 0d 0d inside the payload is not mistaken for the end.
            if src.len() >= FRAME_LEN && src[FRAME_LEN - 2..FRAME_LEN] == SUFFIX {
                return Ok(Some(src.split_to(FRAME_LEN).to_vec()));
            }

            match src[PREFIX.len()..].windows(2).position(|w| w == SUFFIX) {
                // Possibly a terminator-looking payload of a frame that has
                // not fully arrived yet.
                Some(_) if src.len() < FRAME_LEN => return Ok(None),
                Some(pos) => {
                    let end = PREFIX.len() + pos + SUFFIX.len();
                    return Ok(Some(src.split_to(end).to_vec()));
                }
                None if src.len() > MAX_PENDING => {
                    trace!("Dropping unterminated frame prefix");
                    src.advance(PREFIX.len());
                }
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<Vec<u8>> for KocomCodec {
    type Error = Error;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
