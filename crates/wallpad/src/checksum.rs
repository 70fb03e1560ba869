//! Frame checksums.
//!
//! Bus frames carry a one byte additive checksum over everything between the
//! `aa 55` prefix and the checksum itself.

/// Additive checksum over a frame body (the bytes after `aa 55`).
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_checksum_matches_prefixed_sum() {
        let frame = hex!("aa55 30bc 00 0100 0e00 00 ff00000000000000 00 0d0d");
        let body = &frame[2..18];
        let prefixed = frame[..18]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b))
            .wrapping_add(1);
        assert_eq!(checksum(body), prefixed);
    }
}
