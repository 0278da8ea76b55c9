//! SMB_COM_SESSION_SETUP_ANDX (0x73) and SMB_COM_LOGOFF_ANDX (0x74).
//! [MS-CIFS] Sections 2.2.4.53 and 2.2.4.54

use bytes::{BufMut, BytesMut};

use crate::smb1::ANDX_NONE;

/// Capabilities offered at session setup: CAP_UNICODE | CAP_EXTENDED_SECURITY.
pub const CLIENT_CAPABILITIES: u32 = 0x8000_0004;

/// Upper bound on the MaxBufferSize we advertise.
const CLIENT_MAX_BUFFER: u16 = 4356;

/// NativeOS / NativeLanMan trailer after the security blob.
const NATIVE_STRINGS: &[u8] = b"Unix\0Samba\0";

/// SESSION_SETUP_ANDX request with an extended-security blob.
#[derive(Debug)]
pub struct SessionSetupRequest<'a> {
    pub server_max_buffer: u32,
    pub session_key: u32,
    pub security_blob: &'a [u8],
}

impl SessionSetupRequest<'_> {
    /// Serialize the 12-word parameter block.
    /// [MS-CIFS] 2.2.4.53.1: AndXCommand(1) + AndXReserved(1) + AndXOffset(2) +
    /// MaxBufferSize(2) + MaxMpxCount(2) + VcNumber(2) + SessionKey(4) +
    /// SecurityBlobLength(2) + Reserved(4) + Capabilities(4) = 24 bytes
    pub fn serialize_params(&self, buf: &mut BytesMut) {
        buf.put_u8(ANDX_NONE); // AndXCommand
        buf.put_u8(0); // AndXReserved
        buf.put_u16_le(0); // AndXOffset
        buf.put_u16_le((self.server_max_buffer.min(CLIENT_MAX_BUFFER as u32)) as u16);
        buf.put_u16_le(2); // MaxMpxCount
        buf.put_u16_le(1); // VcNumber
        buf.put_u32_le(self.session_key); // echoed from NEGOTIATE
        buf.put_u16_le(self.security_blob.len() as u16);
        buf.put_u32_le(0); // Reserved
        buf.put_u32_le(CLIENT_CAPABILITIES);
    }

    /// Serialize the data block: security blob then NativeOS/NativeLanMan.
    pub fn serialize_data(&self, buf: &mut BytesMut) {
        buf.put_slice(self.security_blob);
        buf.put_slice(NATIVE_STRINGS);
    }
}

/// LOGOFF_ANDX request parameter block (2 words, no data).
pub fn logoff_params() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u8(ANDX_NONE);
    buf.put_u8(0);
    buf.put_u16_le(0);
    buf.to_vec()
}
