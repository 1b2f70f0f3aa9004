//! Wire constants for the server list ping exchange.
//!
//! Protocol reference: <https://wiki.vg/Server_List_Ping>

/// The handshake and status request packets, sent back to back on every
/// probe. Both are fixed: the server echoes its status regardless of the
/// hostname we claim to have dialed, so there is nothing to customize per
/// target.
pub const STATUS_PING: &[u8] = &[
    0x15, // handshake packet length
    0x00, // packet id: handshake
    0xff, 0xff, 0xff, 0xff, 0x0f, // protocol version, -1 meaning "just pinging"
    0x0b, // hostname length
    b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm',
    0xdd, 0x36, // port 25565
    0x01, // next state: status
    0x01, // status request packet length
    0x00, // packet id: status request
];

/// Slice the status document out of a response body.
///
/// The body starts with a packet id and a string length, but rather than
/// parse those we anchor on the first `{`, which cannot occur before the
/// document itself. Returns `None` when the body carries no document.
pub fn extract_status(body: &[u8]) -> Option<&[u8]> {
    let start = body.iter().position(|&b| b == b'{')?;
    Some(&body[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use coding;
    use hex_literal::hex;

    #[test]
    fn payload_bytes() {
        assert_eq!(
            STATUS_PING,
            &hex!("1500ffffffff0f0b6578616d706c652e636f6ddd36010100")[..]
        );
    }

    #[test]
    fn payload_framing() {
        // Handshake length byte covers everything up to the status request,
        // which is its own two-byte packet.
        let handshake_len = STATUS_PING[0] as usize;
        assert_eq!(STATUS_PING.len(), 1 + handshake_len + 2);
        assert_eq!(&STATUS_PING[1 + handshake_len..], [0x01, 0x00]);
        // The protocol version is varint -1.
        let mut neg_one = Vec::new();
        coding::encode(u32::MAX, &mut neg_one);
        assert_eq!(&STATUS_PING[2..7], &neg_one[..]);
        assert_eq!(&STATUS_PING[8..19], b"example.com");
    }

    #[test]
    fn extracts_document() {
        assert_eq!(extract_status(b"\x00\x10{\"version\":1}"), Some(&b"{\"version\":1}"[..]));
        assert_eq!(extract_status(b"{}"), Some(&b"{}"[..]));
    }

    #[test]
    fn no_document() {
        assert_eq!(extract_status(b""), None);
        assert_eq!(extract_status(b"\x00\x05hello"), None);
    }
}
