//! SMB_COM_NEGOTIATE (0x72).
//! [MS-CIFS] Section 2.2.4.52

use bytes::{BufMut, BytesMut};

/// The only dialect this client offers; the server must select it (index 0).
pub const DIALECT_NT_LM_012: &str = "NT LM 0.12";

/// Dialect marker byte preceding each dialect string in the request.
const BUFFER_FORMAT_DIALECT: u8 = 0x02;

/// Build the NEGOTIATE request data block (the parameter block is empty).
pub fn request_data() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(DIALECT_NT_LM_012.len() + 2);
    buf.put_u8(BUFFER_FORMAT_DIALECT);
    buf.put_slice(DIALECT_NT_LM_012.as_bytes());
    buf.put_u8(0);
    buf.to_vec()
}

/// Parsed NEGOTIATE response (NT LM 0.12 layout, 17 parameter words).
#[derive(Debug)]
pub struct NegotiateResponse {
    pub dialect_index: u16,
    pub security_mode: u8,
    pub max_buffer_size: u32,
    pub session_key: u32,
    pub capabilities: u32,
}

impl NegotiateResponse {
    /// Parse from the response parameter block.
    /// [MS-CIFS] 2.2.4.52.2: DialectIndex(2) + SecurityMode(1) +
    /// MaxMpxCount(2) + MaxNumberVcs(2) + MaxBufferSize(4) + MaxRawSize(4) +
    /// SessionKey(4) + Capabilities(4) + SystemTime(8) + ServerTimeZone(2) +
    /// ChallengeLength(1) = 34 bytes
    pub fn parse(params: &[u8]) -> Option<Self> {
        if params.len() < 23 {
            return None;
        }
        let dialect_index = u16::from_le_bytes([params[0], params[1]]);
        let security_mode = params[2];
        // [3..5] MaxMpxCount, [5..7] MaxNumberVcs
        let max_buffer_size = u32::from_le_bytes(params[7..11].try_into().ok()?);
        // [11..15] MaxRawSize
        let session_key = u32::from_le_bytes(params[15..19].try_into().ok()?);
        let capabilities = u32::from_le_bytes(params[19..23].try_into().ok()?);
        // The server challenge that follows is ignored: the 3DS never
        // verifies what we send back.

        Some(NegotiateResponse {
            dialect_index,
            security_mode,
            max_buffer_size,
            session_key,
            capabilities,
        })
    }
}
