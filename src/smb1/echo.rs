//! SMB_COM_ECHO (0x2B): liveness probe.
//! [MS-CIFS] Section 2.2.4.39

use bytes::{BufMut, BytesMut};

/// Payload the server echoes back.
pub const ECHO_PAYLOAD: &[u8] = b"PING";

/// Build the 1-word parameter block: EchoCount = 1.
pub fn request_params() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(2);
    buf.put_u16_le(1);
    buf.to_vec()
}
